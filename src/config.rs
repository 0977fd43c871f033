//! Session configuration: defaults, validation, and the fixed font and
//! form tables.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// The built-in fonts every reader is required to know about. Embedding
/// fonts would need font-file parsing and licensing care; monospace core
/// fonts give the right effect for lineprinter output anyway.
pub const CORE_FONTS: [&str; 14] = [
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Symbol",
    "ZapfDingbats",
];

pub const FORM_NAMES: [&str; 5] = ["PLAIN", "GREENBAR", "BLUEBAR", "GRAYBAR", "YELLOWBAR"];

pub(crate) const RGB_BLACK: &str = "0 0 0";
pub(crate) const RGB_WHITE: &str = "1.000 1.000 1.000";
pub(crate) const RGB_HOLE_LINE: &str = "0.85 0.85 0.85";
pub(crate) const RGB_HOLE_FILL: &str = "0.90 0.90 0.90";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Plain,
    GreenBar,
    BlueBar,
    GrayBar,
    YellowBar,
    /// JPEG background supplied via `form-image`.
    Image,
}

pub(crate) struct FormColors {
    pub line: &'static str,
    pub bar: &'static str,
    pub text: &'static str,
}

impl FormKind {
    pub(crate) fn colors(self) -> FormColors {
        match self {
            // PLAIN doubles for image forms.
            FormKind::Plain | FormKind::Image => FormColors {
                line: RGB_BLACK,
                bar: RGB_BLACK,
                text: RGB_BLACK,
            },
            FormKind::GreenBar => FormColors {
                line: "0.780 0.860 0.780",
                bar: "0.880 0.960 0.880",
                text: "0.780 0.860 0.780",
            },
            FormKind::BlueBar => FormColors {
                line: "0.794 0.900 0.900",
                bar: "0.804 1.000 1.000",
                text: "0.794 0.900 0.900",
            },
            FormKind::GrayBar => FormColors {
                line: "0.700 0.700 0.700",
                bar: "0.800 0.800 0.800",
                text: "0.700 0.700 0.700",
            },
            // Yellow text is unreadable; labels use gray.
            FormKind::YellowBar => FormColors {
                line: "0.900 0.900 0.800",
                bar: "1.000 1.000 0.600",
                text: "0.700 0.700 0.700",
            },
        }
    }

    fn from_name(name: &str) -> Option<FormKind> {
        let idx = FORM_NAMES
            .iter()
            .position(|f| f.eq_ignore_ascii_case(name))?;
        Some(match idx {
            0 => FormKind::Plain,
            1 => FormKind::GreenBar,
            2 => FormKind::BlueBar,
            3 => FormKind::GrayBar,
            _ => FormKind::YellowBar,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRequire {
    /// File must be empty (or new).
    New,
    /// Extend an existing PDF produced by this library.
    Append,
    /// Replace any existing contents.
    Replace,
}

impl FileRequire {
    fn from_name(name: &str) -> Option<FileRequire> {
        if name.eq_ignore_ascii_case("NEW") {
            Some(FileRequire::New)
        } else if name.eq_ignore_ascii_case("APPEND") {
            Some(FileRequire::Append)
        } else if name.eq_ignore_ascii_case("REPLACE") {
            Some(FileRequire::Replace)
        } else {
            None
        }
    }
}

pub const DEFAULT_TITLE: &str = "Lineprinter data";

/// All tunables, with the lineprinter-shaped defaults. Linear dimensions
/// are inches.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub require: FileRequire,
    pub cpi: f64,
    pub lpi: u32,
    pub cols: u32,
    pub wid: f64,
    pub len: f64,
    pub font: String,
    pub nfont: String,
    pub lfont: String,
    /// Stored with `\`, `(`, `)` already escaped for PDF string literals.
    pub title: String,
    pub top: f64,
    pub tof: Option<u32>,
    pub bot: f64,
    pub margin: f64,
    pub lno: f64,
    pub form: FormKind,
    pub barh: f64,
    pub formfile: Option<PathBuf>,
    pub uncompressed: bool,
    pub trace_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            require: FileRequire::New,
            cpi: 10.0,
            lpi: 6,
            cols: 132,
            wid: 14.875,
            len: 11.000,
            font: "Courier".to_string(),
            nfont: "Times-Roman".to_string(),
            lfont: "Times-Bold".to_string(),
            title: DEFAULT_TITLE.to_string(),
            top: 1.000,
            tof: None,
            bot: 0.500,
            margin: 0.470,
            lno: 0.100,
            form: FormKind::GreenBar,
            barh: 0.500,
            formfile: None,
            uncompressed: false,
            trace_path: None,
        }
    }
}

fn check_font(name: &str) -> Result<()> {
    if CORE_FONTS.contains(&name) {
        Ok(())
    } else {
        Err(Error::UnknownFont)
    }
}

fn check_linear(value: f64) -> Result<f64> {
    if value < 0.0 {
        Err(Error::NegativeValue)
    } else {
        Ok(value)
    }
}

impl Config {
    pub fn set_require(&mut self, name: &str) -> Result<()> {
        self.require = FileRequire::from_name(name).ok_or(Error::BadSet)?;
        Ok(())
    }

    pub fn set_form(&mut self, name: &str) -> Result<()> {
        self.form = FormKind::from_name(name).ok_or(Error::UnknownForm)?;
        Ok(())
    }

    pub fn set_form_image(&mut self, path: PathBuf) -> Result<()> {
        // Fail early if the file can't be opened at all.
        std::fs::File::open(&path).map_err(Error::Os)?;
        self.formfile = Some(path);
        self.form = FormKind::Image;
        Ok(())
    }

    pub fn set_text_font(&mut self, name: &str) -> Result<()> {
        check_font(name)?;
        self.font = name.to_string();
        Ok(())
    }

    pub fn set_number_font(&mut self, name: &str) -> Result<()> {
        check_font(name)?;
        self.nfont = name.to_string();
        Ok(())
    }

    pub fn set_label_font(&mut self, name: &str) -> Result<()> {
        check_font(name)?;
        self.lfont = name.to_string();
        Ok(())
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        let mut escaped = String::with_capacity(title.len());
        for ch in title.chars() {
            if matches!(ch, '\\' | '(' | ')') {
                escaped.push('\\');
            }
            escaped.push(ch);
        }
        self.title = escaped;
        Ok(())
    }

    pub fn set_top_margin(&mut self, inches: f64) -> Result<()> {
        self.top = check_linear(inches)?;
        Ok(())
    }

    pub fn set_bottom_margin(&mut self, inches: f64) -> Result<()> {
        self.bot = check_linear(inches)?;
        Ok(())
    }

    pub fn set_side_margin(&mut self, inches: f64) -> Result<()> {
        let inches = check_linear(inches)?;
        // Tractor feed hardware needs at least this much.
        if inches < 0.350 {
            return Err(Error::Invalid);
        }
        self.margin = inches;
        Ok(())
    }

    pub fn set_lno_width(&mut self, inches: f64) -> Result<()> {
        let inches = check_linear(inches)?;
        if inches != 0.0 && inches < 0.1 {
            return Err(Error::Invalid);
        }
        self.lno = inches;
        Ok(())
    }

    pub fn set_bar_height(&mut self, inches: f64) -> Result<()> {
        self.barh = check_linear(inches)?;
        Ok(())
    }

    pub fn set_cpi(&mut self, cpi: f64) -> Result<()> {
        let cpi = check_linear(cpi)?;
        if !(1.0..=20.0).contains(&cpi) {
            return Err(Error::Invalid);
        }
        self.cpi = cpi;
        Ok(())
    }

    pub fn set_lpi(&mut self, lpi: u32) -> Result<()> {
        if lpi != 6 && lpi != 8 {
            return Err(Error::Invalid);
        }
        self.lpi = lpi;
        Ok(())
    }

    pub fn set_page_width(&mut self, inches: f64) -> Result<()> {
        let inches = check_linear(inches)?;
        if inches < 3.0 {
            return Err(Error::Invalid);
        }
        self.wid = inches;
        Ok(())
    }

    pub fn set_page_length(&mut self, inches: f64) -> Result<()> {
        let inches = check_linear(inches)?;
        if inches < 2.0 {
            return Err(Error::Invalid);
        }
        self.len = inches;
        Ok(())
    }

    pub fn set_cols(&mut self, cols: u32) -> Result<()> {
        self.cols = cols;
        Ok(())
    }

    pub fn set_tof_offset(&mut self, lines: u32) -> Result<()> {
        self.tof = Some(lines);
        Ok(())
    }

    pub fn set_no_lzw(&mut self, disable: bool) -> Result<()> {
        self.uncompressed = disable;
        Ok(())
    }

    pub fn set_trace_log(&mut self, path: PathBuf) -> Result<()> {
        self.trace_path = Some(path);
        Ok(())
    }

    /// Cross-option checks deferred to first output, once every value is
    /// final. Violations abort before any byte reaches the file.
    pub fn check_geometry(&self, lpp: u32, tof: u32) -> Result<()> {
        let printable_w = self.wid - 2.0 * (self.margin + self.lno);
        if self.len < 2.0
            || printable_w < 3.0
            || printable_w < self.cols as f64 / self.cpi
            || lpp < 4
            || tof > lpp
        {
            return Err(Error::InconsistentGeometry);
        }
        if self.form != FormKind::Image && self.form != FormKind::Plain {
            if self.barh < 1.0 / self.lpi as f64 {
                return Err(Error::InconsistentGeometry);
            }
        }
        Ok(())
    }
}

/// Parse a linear dimension with an optional `in`, `cm`, or `mm` suffix
/// into inches. Used by the command-line front end.
pub fn parse_linear(text: &str) -> Result<f64> {
    let text = text.trim();
    let (num, unit) = match text.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => text.split_at(idx),
        None => (text, ""),
    };
    let value: f64 = num.trim().parse().map_err(|_| Error::Invalid)?;
    match unit {
        "" | "in" => Ok(value),
        "cm" => Ok(value / 2.54),
        "mm" => Ok(value / 25.4),
        _ => Err(Error::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_standard_lineprinter() {
        let cfg = Config::default();
        assert_eq!(cfg.cpi, 10.0);
        assert_eq!(cfg.lpi, 6);
        assert_eq!(cfg.cols, 132);
        assert_eq!(cfg.wid, 14.875);
        assert_eq!(cfg.len, 11.0);
        assert_eq!(cfg.form, FormKind::GreenBar);
        assert_eq!(cfg.title, DEFAULT_TITLE);
    }

    #[test]
    fn setters_validate_ranges() {
        let mut cfg = Config::default();
        assert!(matches!(cfg.set_lpi(7), Err(Error::Invalid)));
        assert!(cfg.set_lpi(8).is_ok());
        assert!(matches!(cfg.set_cpi(0.5), Err(Error::Invalid)));
        assert!(matches!(cfg.set_side_margin(0.2), Err(Error::Invalid)));
        assert!(matches!(
            cfg.set_top_margin(-1.0),
            Err(Error::NegativeValue)
        ));
        assert!(matches!(cfg.set_lno_width(0.05), Err(Error::Invalid)));
        assert!(cfg.set_lno_width(0.0).is_ok());
        assert!(matches!(
            cfg.set_text_font("Comic Sans"),
            Err(Error::UnknownFont)
        ));
        assert!(cfg.set_text_font("Courier-Bold").is_ok());
        assert!(matches!(cfg.set_form("polkadot"), Err(Error::UnknownForm)));
        assert!(cfg.set_form("bluebar").is_ok());
        assert_eq!(cfg.form, FormKind::BlueBar);
    }

    #[test]
    fn title_is_escaped_for_pdf_strings() {
        let mut cfg = Config::default();
        cfg.set_title(r"Q3 (draft) \ final").unwrap();
        assert_eq!(cfg.title, r"Q3 \(draft\) \\ final");
    }

    #[test]
    fn geometry_checks_reject_unprintable_pages() {
        let mut cfg = Config::default();
        // 132 cols at 10 cpi needs 13.2 in; a 10 in page can't hold it.
        cfg.wid = 10.0;
        assert!(matches!(
            cfg.check_geometry(66, 6),
            Err(Error::InconsistentGeometry)
        ));
        let cfg = Config::default();
        assert!(cfg.check_geometry(66, 6).is_ok());
        // Bar height shorter than one line.
        let mut cfg = Config::default();
        cfg.barh = 0.1;
        assert!(matches!(
            cfg.check_geometry(66, 6),
            Err(Error::InconsistentGeometry)
        ));
    }

    #[test]
    fn linear_values_accept_metric_suffixes() {
        assert_eq!(parse_linear("11").unwrap(), 11.0);
        assert_eq!(parse_linear("11in").unwrap(), 11.0);
        assert_eq!(parse_linear("25.4mm").unwrap(), 1.0);
        assert_eq!(parse_linear("2.54cm").unwrap(), 1.0);
        assert!(parse_linear("11ft").is_err());
        assert!(parse_linear("").is_err());
    }
}
