//! The logical page: an array of line buffers accumulated between form
//! feeds, and the renderer that turns them into a content-stream text
//! block.

use std::fmt::Write as _;

use crate::config::{Config, RGB_BLACK};
use crate::error::{Error, Result};
use crate::escapes::CH_CR;
use crate::types::{fmt_pt, PT_PER_IN};

#[derive(Debug)]
pub(crate) struct PageLayout {
    /// Line buffers, index 0 = line 1. Buffers are retained and reused
    /// across pages; a cleared line renders as a bare line advance.
    lines: Vec<Vec<u16>>,
    /// Current 1-based line, 0 when nothing has printed on this page.
    pub line: u32,
    /// Pages completed this session.
    pub page: u32,
    /// Vertical pitch at the top of the current page.
    start_lpi: u32,
    /// Pitch switches on the current page: (first line at the new pitch,
    /// new LPI), in line order.
    pitch_breaks: Vec<(u32, u32)>,
}

impl PageLayout {
    pub fn new(lpi: u32) -> Self {
        Self {
            lines: Vec::new(),
            line: 0,
            page: 0,
            start_lpi: lpi,
            pitch_breaks: Vec::new(),
        }
    }

    /// Append characters to the current line. Lines beyond the physical
    /// page are legal; a TOF offset lets them carry into the next page.
    pub fn append(&mut self, text: &[u16]) -> Result<()> {
        if self.line == 0 {
            return Err(Error::Bugcheck);
        }
        let idx = (self.line - 1) as usize;
        if idx >= self.lines.len() {
            self.lines.resize_with(idx + 1, Vec::new);
        }
        self.lines[idx].extend_from_slice(text);
        Ok(())
    }

    /// Record a vertical pitch change taking effect at the current line.
    pub fn set_pitch(&mut self, lpi: u32) {
        let at = self.line.max(1);
        if let Some(last) = self.pitch_breaks.last_mut() {
            if last.0 == at {
                last.1 = lpi;
                return;
            }
        }
        if self.pitch_breaks.is_empty() && self.line == 0 {
            // Nothing on the page yet; the whole page takes the new pitch.
            self.start_lpi = lpi;
            return;
        }
        self.pitch_breaks.push((at, lpi));
    }

    /// Pitch in effect after everything recorded so far.
    pub fn current_lpi(&self) -> u32 {
        self.pitch_breaks
            .last()
            .map(|&(_, lpi)| lpi)
            .unwrap_or(self.start_lpi)
    }

    /// Render the text block for this page into `out`. Rendered lines are
    /// cleared; lines past the physical page are left for the carry-over
    /// swap.
    pub fn render_text(&mut self, cfg: &Config, lpp: u32, out: &mut Vec<u8>) {
        let lm = cfg.margin * PT_PER_IN
            + ((cfg.wid - cfg.margin * 2.0) - cfg.cols as f64 / cfg.cpi) / 2.0 * PT_PER_IN;
        let size = PT_PER_IN as u32 / self.start_lpi;
        let top = (cfg.len * PT_PER_IN) as u32 + 2;

        let mut text = String::new();
        let _ = write!(
            text,
            " q 0 Tr {RGB_BLACK} rg BT /F1 {size} Tf 1 0 0 1 {} 0 Tm  {size} TL 0 Tc 100 Tz 0 {top} Td",
            fmt_pt(lm)
        );
        out.extend_from_slice(text.as_bytes());

        let limit = self.line.min(lpp).min(self.lines.len() as u32);
        let mut breaks = self.pitch_breaks.iter().peekable();
        for l in 0..limit {
            if let Some(&&(at, lpi)) = breaks.peek() {
                if at == l + 1 {
                    breaks.next();
                    let size = PT_PER_IN as u32 / lpi;
                    out.extend_from_slice(format!(" /F1 {size} Tf {size} TL").as_bytes());
                }
            }
            match self.lines.get_mut(l as usize) {
                Some(chars) if !chars.is_empty() => {
                    out.extend_from_slice(b" T* (");
                    for col in 0..chars.len() {
                        let ch = chars[col];
                        if ch == u16::from(b'\\') || ch == u16::from(b'(') || ch == u16::from(b')')
                        {
                            out.push(b'\\');
                        } else if ch == CH_CR {
                            // Overstrike: reset to the line start, but only
                            // when something other than CR or blank follows.
                            let rest = &chars[col + 1..];
                            if rest.iter().any(|&c| c != CH_CR && c != u16::from(b' ')) {
                                out.extend_from_slice(b")Tj 0 0 Td (");
                            }
                            continue;
                        }
                        out.push(ch as u8);
                    }
                    out.extend_from_slice(b")Tj");
                    chars.clear();
                }
                _ => out.extend_from_slice(b" T*"),
            }
        }
        out.extend_from_slice(b" ET Q");
    }

    /// Complete the page: bump the page count and swap any carried-over
    /// lines into the top of the new page. Returns with `line` set to
    /// `tof + 1` when carried content exists, 0 otherwise.
    pub fn finish_page(&mut self, lpp: u32, tof: u32) {
        self.page += 1;
        self.line = 0;

        self.start_lpi = self.current_lpi();
        self.pitch_breaks.clear();

        for l in 0..tof as usize {
            let el = lpp as usize + l;
            if el >= self.lines.len() {
                break;
            }
            self.lines.swap(l, el);
            if !self.lines[l].is_empty() {
                self.line = tof + 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(layout: &mut PageLayout, cfg: &Config, lpp: u32) -> String {
        let mut out = Vec::new();
        layout.render_text(cfg, lpp, &mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    fn wide(s: &str) -> Vec<u16> {
        s.bytes().map(u16::from).collect()
    }

    #[test]
    fn text_block_header_centers_the_columns() {
        let cfg = Config::default();
        let mut layout = PageLayout::new(6);
        layout.line = 7;
        layout.append(&wide("HELLO")).unwrap();
        let out = render(&mut layout, &cfg, 66);
        // 13.935 in of inter-margin space minus 13.2 in of text, split.
        assert!(out.starts_with(
            " q 0 Tr 0 0 0 rg BT /F1 12 Tf 1 0 0 1 60.3 0 Tm  12 TL 0 Tc 100 Tz 0 794 Td"
        ));
        assert!(out.ends_with(" ET Q"));
    }

    #[test]
    fn lines_advance_with_t_star_and_text_shows_once() {
        let cfg = Config::default();
        let mut layout = PageLayout::new(6);
        layout.line = 2;
        layout.append(&wide("A")).unwrap();
        layout.line = 3;
        layout.append(&wide("B")).unwrap();
        let out = render(&mut layout, &cfg, 66);
        assert!(out.contains(" T* T* (A)Tj T* (B)Tj ET Q"));
    }

    #[test]
    fn specials_are_escaped() {
        let cfg = Config::default();
        let mut layout = PageLayout::new(6);
        layout.line = 1;
        layout.append(&wide(r"(x) \ y")).unwrap();
        let out = render(&mut layout, &cfg, 66);
        assert!(out.contains(r" T* (\(x\) \\ y)Tj"));
    }

    #[test]
    fn carriage_return_overstrikes_when_data_follows() {
        let cfg = Config::default();
        let mut layout = PageLayout::new(6);
        layout.line = 1;
        let mut chars = wide("ABC");
        chars.push(CH_CR);
        chars.extend(wide("XYZ"));
        layout.append(&chars).unwrap();
        let out = render(&mut layout, &cfg, 66);
        assert!(out.contains("(ABC)Tj 0 0 Td (XYZ)Tj"));
    }

    #[test]
    fn trailing_carriage_return_is_dropped() {
        let cfg = Config::default();
        let mut layout = PageLayout::new(6);
        layout.line = 1;
        let mut chars = wide("END");
        chars.push(CH_CR);
        chars.push(u16::from(b' '));
        layout.append(&chars).unwrap();
        let out = render(&mut layout, &cfg, 66);
        assert!(out.contains("(END )Tj"));
        assert!(!out.contains("0 0 Td"));
    }

    #[test]
    fn pitch_break_switches_font_and_leading_mid_page() {
        let cfg = Config::default();
        let mut layout = PageLayout::new(6);
        layout.line = 1;
        layout.append(&wide("X")).unwrap();
        layout.line = 2;
        layout.set_pitch(8);
        layout.append(&wide("Y")).unwrap();
        let out = render(&mut layout, &cfg, 66);
        assert!(out.contains("/F1 12 Tf"));
        assert!(out.contains(" T* (X)Tj /F1 9 Tf 9 TL T* (Y)Tj"));
    }

    #[test]
    fn pitch_before_any_output_rebases_the_page() {
        let mut layout = PageLayout::new(6);
        layout.set_pitch(8);
        assert_eq!(layout.current_lpi(), 8);
        layout.line = 1;
        layout.append(&wide("Z")).unwrap();
        let cfg = Config::default();
        let out = render(&mut layout, &cfg, 88);
        assert!(out.contains("/F1 9 Tf"));
        assert!(!out.contains("12 Tf"));
    }

    #[test]
    fn finish_page_swaps_overflow_lines_to_the_top() {
        let mut layout = PageLayout::new(6);
        // lpp 66, tof 6: line 67 is the first line of the next page.
        layout.line = 67;
        layout.append(&wide("CARRY")).unwrap();
        layout.finish_page(66, 6);
        assert_eq!(layout.page, 1);
        assert_eq!(layout.line, 7);
        let cfg = Config::default();
        let out = render(&mut layout, &cfg, 66);
        assert!(out.contains(" T* (CARRY)Tj"));
    }

    #[test]
    fn finish_page_without_carryover_resets_line() {
        let mut layout = PageLayout::new(6);
        layout.line = 10;
        layout.append(&wide("LAST")).unwrap();
        let mut out = Vec::new();
        layout.render_text(&Config::default(), 66, &mut out);
        layout.finish_page(66, 6);
        assert_eq!(layout.line, 0);
        assert_eq!(layout.page, 1);
    }

    #[test]
    fn append_without_a_current_line_is_a_bugcheck() {
        let mut layout = PageLayout::new(6);
        assert!(matches!(
            layout.append(&wide("X")),
            Err(Error::Bugcheck)
        ));
    }
}
