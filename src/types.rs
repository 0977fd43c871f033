use fixed::types::I32F32;

/// Points/inch.
pub(crate) const PT_PER_IN: f64 = 72.0;

/// A length in PostScript points, quantized to 1/1000 pt so that emitted
/// coordinates are deterministic and free of binary-float formatting noise.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct Pt(I32F32);

impl Pt {
    pub fn from_f64(value: f64) -> Pt {
        if !value.is_finite() {
            return Pt(I32F32::from_bits(0));
        }
        let milli = (value * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    fn from_milli_i64(milli: i64) -> Pt {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = ((milli as i128) * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }

    fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        ((scaled + adj) / denom) as i64
    }
}

impl std::fmt::Display for Pt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let milli = self.to_milli_i64();
        let sign = if milli < 0 { "-" } else { "" };
        let milli = milli.unsigned_abs();
        let whole = milli / 1000;
        let frac = milli % 1000;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let mut s = format!("{frac:03}");
        while s.ends_with('0') {
            s.pop();
        }
        write!(f, "{sign}{whole}.{s}")
    }
}

/// Format a value in points for a content stream or dictionary.
pub(crate) fn fmt_pt(value: f64) -> String {
    Pt::from_f64(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt_formats_without_trailing_zeros() {
        assert_eq!(fmt_pt(72.0), "72");
        assert_eq!(fmt_pt(33.84), "33.84");
        assert_eq!(fmt_pt(0.5), "0.5");
        assert_eq!(fmt_pt(-11.34), "-11.34");
        assert_eq!(fmt_pt(0.0), "0");
    }

    #[test]
    fn pt_quantizes_to_milli() {
        assert_eq!(fmt_pt(1071.0000004), "1071");
        assert_eq!(fmt_pt(11.9996), "12");
        assert_eq!(fmt_pt(14.875 * PT_PER_IN), "1071");
    }
}
