//! Static page background: tractor-feed sprocket holes, the bar pattern
//! or a JPEG image, and the line-number columns. Rendered once per session
//! into a buffer that is prepended to every page's content stream.

use std::fmt::Write as _;

use image::GenericImageView;

use crate::config::{Config, FormKind, RGB_HOLE_FILL, RGB_HOLE_LINE, RGB_WHITE};
use crate::error::{Error, Result};
use crate::object::ObjectWriter;
use crate::types::{fmt_pt, PT_PER_IN};

/* Standard tractor feed dimensions; there is no reason to make these
 * user-accessible. */
const HOLE_DIA: f64 = 0.1575;
const HOLE_VSP: f64 = 0.500;
const HOLE_HPOS: f64 = 0.236;
const HOLE_VOFS: f64 = 0.250;

/// Cubic Bézier circle-quadrant constant.
const CIRCLE_K: f64 = 0.551784;

pub(crate) struct Form {
    pub content: String,
    pub image_obj: Option<u32>,
}

/// Build the per-page background. An image form also writes its XObject
/// to the file, so this must run when the file is positioned for the next
/// object.
pub(crate) fn build(cfg: &Config, writer: &mut ObjectWriter) -> Result<Form> {
    let xp = |x: f64| x * PT_PER_IN;
    let yp = |y: f64| (cfg.len - y) * PT_PER_IN;

    let tb = yp(cfg.top);
    let li = xp(cfg.margin);
    let ri = xp(cfg.wid - cfg.margin);
    let lo = li - xp(cfg.lno);
    let colors = cfg.form.colors();

    let mut out = String::new();
    let mut image_obj = None;

    // Sprocket holes run down both tractor strips on every form.
    let _ = write!(out, " q 1 w {RGB_HOLE_FILL} rg {RGB_HOLE_LINE} RG");
    let mut p = HOLE_VOFS;
    while p <= cfg.len - HOLE_VOFS {
        circle(&mut out, xp(HOLE_HPOS), yp(p), xp(HOLE_DIA / 2.0));
        circle(&mut out, xp(cfg.wid - HOLE_HPOS), yp(p), xp(HOLE_DIA / 2.0));
        p += HOLE_VSP;
    }
    out.push_str(" B Q");

    if cfg.form != FormKind::Plain {
        out.push_str(" q ");
        if cfg.form == FormKind::Image {
            image_obj = Some(image_form(cfg, &mut out, writer)?);
        } else {
            bar_form(cfg, &mut out);
        }
        out.push_str(" Q");
    }

    // Line numbers go on top of any enclosing paths.
    if cfg.lno != 0.0 {
        let label_lines_6 = ((cfg.len - (cfg.top + cfg.bot)) * 6.0) as u32;
        let label_lines_8 = ((cfg.len - (cfg.top + cfg.bot)) * 8.0) as u32;
        let size6 = PT_PER_IN as u32 / 6;
        let size8 = PT_PER_IN as u32 / 8;

        let _ = write!(
            out,
            " q 1 w BT 0 Tr {} rg /F3 {} Tf 55 Tz 1 0 0 1 {} {} Tm {} TL (6)' /F2 {} Tf",
            colors.text,
            size6,
            fmt_pt(lo),
            fmt_pt(tb + size6 as f64),
            size6,
            size6
        );
        for l in 1..=label_lines_6 {
            let _ = write!(out, " ({l:2})'");
        }

        let _ = write!(
            out,
            " /F3 {} Tf 1 0 0 1 {} {} Tm 65 Tz {} TL (8)' /F2 {} Tf",
            size8,
            fmt_pt(ri),
            fmt_pt(tb + size8 as f64),
            size8,
            size8
        );
        for l in 1..=label_lines_8 {
            let _ = write!(out, " ({l:2})'");
        }

        out.push_str(" ET Q");
    }

    Ok(Form {
        content: out,
        image_obj,
    })
}

/// The alternating color bands with their rounded enclosure, drawn
/// clockwise as one closed path.
fn bar_form(cfg: &Config, out: &mut String) {
    let xp = |x: f64| x * PT_PER_IN;
    let yp = |y: f64| (cfg.len - y) * PT_PER_IN;

    let tb = yp(cfg.top);
    let bb = yp(cfg.len - cfg.bot);
    let li = xp(cfg.margin);
    let ri = xp(cfg.wid - cfg.margin);
    let lo = li - xp(cfg.lno);
    let ro = ri + xp(cfg.lno);
    let cbr = xp(cfg.lno) / 2.0;
    let k = CIRCLE_K * cbr;
    let colors = cfg.form.colors();

    let f = fmt_pt;
    let _ = write!(
        out,
        "1 w {} RG {} rg {} {} m {} {} {} {} {} {} c {} {} l \
         {} {} {} {} {} {} c {} {} l {} {} {} {} {} {} c \
         {} {} l {} {} {} {} {} {} c h",
        colors.line,
        RGB_WHITE,
        f(lo), f(tb - cbr),
        f(lo), f(tb - cbr + k), f(lo + cbr - k), f(tb), f(lo + cbr), f(tb),
        f(ri), f(tb),
        f(ri + cbr + k), f(tb), f(ro), f(tb - cbr + k), f(ro), f(tb - cbr),
        f(ro), f(bb + cbr),
        f(ro), f(bb + cbr - k), f(ri + cbr + k), f(bb), f(ri + cbr), f(bb),
        f(li), f(bb),
        f(lo + cbr - k), f(bb), f(lo), f(bb + cbr - k), f(lo), f(bb + cbr)
    );

    if cfg.lno != 0.0 {
        // Dividers between the number columns and the text area.
        let _ = write!(
            out,
            " {} {} m {} {} l {} {} m {} {} l",
            f(li), f(tb),
            f(li), f(bb),
            f(ri), f(bb),
            f(ri), f(tb)
        );
    }
    let _ = write!(out, " B {} rg {} RG", colors.bar, colors.line);

    let bars = (((cfg.len - (cfg.top + cfg.bot)) / cfg.barh) + 0.5) as u32;
    for b in 0..bars {
        let bar_top = tb - b as f64 * (cfg.barh * PT_PER_IN);
        let bar_bot = bar_top - cfg.barh * PT_PER_IN;
        if b & 1 == 0 {
            let _ = write!(
                out,
                " {} {} {} {} re",
                f(li),
                f(bar_bot),
                f(ri - li),
                f(bar_top - bar_bot)
            );
        }
    }
    out.push_str(" B");
}

/// Validate the configured JPEG, emit it verbatim as an image XObject, and
/// reference it from the form scaled to the printable width and centered
/// vertically. Returns the XObject number.
fn image_form(cfg: &Config, out: &mut String, writer: &mut ObjectWriter) -> Result<u32> {
    use std::io::Write as _;

    let path = cfg.formfile.as_ref().ok_or(Error::Bugcheck)?;
    let bytes = std::fs::read(path).map_err(|_| Error::OtherIoError)?;

    if image::guess_format(&bytes).map_err(|_| Error::BadJpeg)? != image::ImageFormat::Jpeg {
        return Err(Error::BadJpeg);
    }
    let decoded = image::load_from_memory(&bytes).map_err(|_| Error::BadJpeg)?;
    let (img_wid, img_hgt) = decoded.dimensions();
    if img_wid == 0 || img_hgt == 0 {
        return Err(Error::BadJpeg);
    }

    let obj = writer.add_object()?;
    write!(
        writer.file,
        "{} 0 obj\n<< /Type /XObject /Subtype /Image /Width {} /Height {} \
         /Length {} /Filter /DCTDecode /BitsPerComponent 8 /ColorSpace /DeviceRGB >>\nstream\n",
        obj,
        img_wid,
        img_hgt,
        bytes.len()
    )?;
    writer.file.write_all(&bytes)?;
    writer.file.write_all(b"\nendstream\nendobj\n\n")?;

    let pw = cfg.wid - 2.0 * (cfg.margin + cfg.lno);
    let scale = pw / img_wid as f64;
    let sh = img_hgt as f64 * scale * PT_PER_IN;
    let vpos = (cfg.len * PT_PER_IN - sh) / 2.0;
    let _ = write!(
        out,
        " {} 0 0 {} {} {} cm /form Do",
        fmt_pt(pw * PT_PER_IN),
        fmt_pt(sh),
        fmt_pt((cfg.margin + cfg.lno) * PT_PER_IN),
        fmt_pt(vpos)
    );

    Ok(obj)
}

/// Four Bézier quadrants approximating a circle of radius `r`.
fn circle(out: &mut String, x: f64, y: f64, r: f64) {
    let k = CIRCLE_K * r;
    let f = fmt_pt;
    let _ = write!(
        out,
        " {} {} m {} {} {} {} {} {} c {} {} {} {} {} {} c \
         {} {} {} {} {} {} c {} {} {} {} {} {} c",
        f(x - r), f(y),
        f(x - r), f(y + k), f(x - k), f(y + r), f(x), f(y + r),
        f(x + k), f(y + r), f(x + r), f(y + k), f(x + r), f(y),
        f(x + r), f(y - k), f(x + k), f(y - r), f(x), f(y - r),
        f(x - k), f(y - r), f(x - r), f(y - k), f(x - r), f(y)
    );
}
