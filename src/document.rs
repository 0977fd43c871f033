//! The session context and its public operations.
//!
//! A [`Pdf`] owns the output file, every working buffer, and the rolling
//! document fingerprint. Nothing touches the file until the first data
//! arrives, so configuration problems abort before a byte is written.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use chrono::Local;
use sha1::{Digest, Sha1};

use crate::append;
use crate::config::{Config, FileRequire, DEFAULT_TITLE};
use crate::error::{Error, Result};
use crate::escapes::{ControlParser, CH_FF, CH_LF, EV_PITCH_6, EV_PITCH_8};
use crate::form;
use crate::lzw;
use crate::object::ObjectWriter;
use crate::page::PageLayout;
use crate::trace::Trace;
use crate::types::{fmt_pt, PT_PER_IN};

#[derive(Debug)]
pub struct Pdf {
    cfg: Config,
    writer: ObjectWriter,
    parser: ControlParser,
    parse_buf: Vec<u16>,
    layout: PageLayout,
    sha: Sha1,
    page_buf: Vec<u8>,
    form_content: String,
    form_obj: Option<u32>,
    trace: Option<Trace>,

    active: bool,
    init: bool,
    written: bool,
    resumed: bool,
    updating: bool,
    last_error: Option<i32>,

    lpp: u32,
    tof: u32,
    /// Object number of the first content stream this session writes.
    pbase: u32,

    /// First `/ID` element of the file being appended to.
    oid: Option<String>,
    /// Original creation date carried into the new Info object.
    ctime: Option<String>,
    prev_count: u32,
    /// Previous session's anchor object number, 0 when starting fresh.
    prev_anchor: u32,
    anchor_pos: u64,
    anchor_prefix: String,
    anchor_suffix: String,
    /// Where the 10-digit `/Parent` placeholder sits, for backpatching.
    anchor_parent_pos: u64,
    /// File position saved by the last checkpoint, 0 before any.
    checkpoint_pos: u64,
}

impl Pdf {
    /// Create or open a `.pdf` output file. The file is opened read-write
    /// without truncation; nothing is written until the first print.
    pub fn open(path: impl AsRef<Path>) -> Result<Pdf> {
        let path = path.as_ref();
        check_extension(path)?;
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(Error::Os)?;
        Ok(Pdf {
            cfg: Config::default(),
            writer: ObjectWriter::new(file),
            parser: ControlParser::new(),
            parse_buf: Vec::new(),
            layout: PageLayout::new(6),
            sha: Sha1::new(),
            page_buf: Vec::new(),
            form_content: String::new(),
            form_obj: None,
            trace: None,
            active: false,
            init: false,
            written: false,
            resumed: false,
            updating: false,
            last_error: None,
            lpp: 0,
            tof: 0,
            pbase: 1,
            oid: None,
            ctime: None,
            prev_count: 0,
            prev_anchor: 0,
            anchor_pos: 0,
            anchor_prefix: String::new(),
            anchor_suffix: String::new(),
            anchor_parent_pos: 0,
            checkpoint_pos: 0,
        })
    }

    /// Submit print data. The bytes may split lines, pages, and escape
    /// sequences anywhere; state carries across calls.
    pub fn print(&mut self, data: &[u8]) -> Result<()> {
        let r = self.print_inner(data);
        self.record(r)
    }

    fn print_inner(&mut self, data: &[u8]) -> Result<()> {
        if !self.written {
            self.lpp = (self.cfg.len * self.cfg.lpi as f64) as u32;
            self.tof = self
                .cfg
                .tof
                .unwrap_or((self.cfg.top * self.cfg.lpi as f64) as u32);
            self.cfg.check_geometry(self.lpp, self.tof)?;

            // Configuration is frozen from here on.
            self.active = true;

            if !self.init {
                if let Some(path) = self.cfg.trace_path.clone() {
                    self.trace = Some(Trace::new(path).map_err(Error::Os)?);
                }
                self.init_file()?;
                self.init = true;
                self.layout = PageLayout::new(self.cfg.lpi);
            }

            self.parse_buf.clear();
            let initial = !self.resumed;
            let swallowed = self
                .parser
                .parse(data, &mut self.sha, &mut self.parse_buf, initial);
            self.resumed = false;

            // Nothing survived parsing and nothing was swallowed: leave
            // the file untouched so an append of zero data is a no-op.
            // A stripped FF counts as data, otherwise the next call would
            // strip another one.
            if self.parse_buf.is_empty() && !swallowed {
                return Ok(());
            }

            self.write_header()?;
            if self.form_content.is_empty() {
                let built = form::build(&self.cfg, &mut self.writer)?;
                self.form_content = built.content;
                if let Some(obj) = built.image_obj {
                    self.form_obj = Some(obj);
                    self.pbase = obj + 1;
                }
            }
        } else {
            self.parse_buf.clear();
            self.parser
                .parse(data, &mut self.sha, &mut self.parse_buf, false);
        }

        if let Some(code) = self.last_error {
            return Err(Error::from_code(code));
        }

        let events = std::mem::take(&mut self.parse_buf);
        let mut pending: Vec<u16> = Vec::with_capacity(128);
        for &c in &events {
            if c == CH_FF {
                if self.layout.line == 0 {
                    self.layout.line = self.tof + 1;
                }
                self.flush_pending(&mut pending)?;
                self.flush_page()?;
                continue;
            }
            if self.layout.line > self.lpp + self.tof {
                self.flush_pending(&mut pending)?;
                self.flush_page()?;
            }
            match c {
                CH_LF => {
                    if self.layout.line == 0 {
                        self.layout.line = self.tof + 1;
                    }
                    self.flush_pending(&mut pending)?;
                    self.layout.line += 1;
                }
                EV_PITCH_6 => {
                    self.flush_pending(&mut pending)?;
                    self.layout.set_pitch(6);
                }
                EV_PITCH_8 => {
                    self.flush_pending(&mut pending)?;
                    self.layout.set_pitch(8);
                }
                _ => {
                    if self.layout.line == 0 {
                        self.layout.line = self.tof + 1;
                    }
                    pending.push(c);
                }
            }
        }
        self.flush_pending(&mut pending)?;

        let mut events = events;
        events.clear();
        self.parse_buf = events;
        Ok(())
    }

    fn flush_pending(&mut self, pending: &mut Vec<u16>) -> Result<()> {
        if !pending.is_empty() {
            self.layout.append(pending)?;
            pending.clear();
        }
        Ok(())
    }

    /// Current 1-based position: page counts every previous session, the
    /// line is relative to the top-of-form.
    pub fn position(&self) -> (u32, u32) {
        let mut page = self.layout.page + 1 + self.prev_count;
        let line = self.layout.line;
        let line = if line == 0 {
            1
        } else if line > self.lpp && self.lpp != 0 {
            page += 1;
            (line - self.lpp).saturating_sub(self.tof).max(1)
        } else {
            line.saturating_sub(self.tof).max(1)
        };
        (page, line)
    }

    /// Write the trailer so the file on disk is a complete PDF, keeping
    /// the session open. The next print resumes over the trailer.
    pub fn checkpoint(&mut self) -> Result<()> {
        let r = self.checkpoint_inner();
        self.record(r)
    }

    fn checkpoint_inner(&mut self) -> Result<()> {
        if !self.written {
            return Ok(());
        }
        let line = self.layout.line;
        let objects = self.writer.count();
        let sha = self.sha.clone();
        // A partial page stays in memory; only complete pages reach the
        // checkpointed file.
        self.layout.line = 0;
        self.checkpoint_pos = self.writer.file.stream_position()?;

        let r = self.close_session(true);

        self.sha = sha;
        self.writer.file.seek(SeekFrom::Start(self.checkpoint_pos))?;
        self.writer.set_count(objects);
        self.layout.line = line;
        self.writer.file.flush()?;
        self.written = false;
        self.resumed = true;

        if let Some(trace) = self.trace.as_mut() {
            trace.event("checkpoint", &[("offset", self.checkpoint_pos)]);
            trace.flush();
        }
        r
    }

    /// Checkpoint, then copy the file's bytes to `path`.
    pub fn snapshot(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let r = self.snapshot_inner(path.as_ref());
        self.record(r)
    }

    fn snapshot_inner(&mut self, path: &Path) -> Result<()> {
        self.checkpoint_inner()?;
        let fpos = self.writer.file.stream_position()?;
        let mut out = File::create(path).map_err(Error::Os)?;
        // The handle switches from writing to reading; reposition
        // explicitly before each phase.
        self.writer.file.seek(SeekFrom::Start(0))?;
        std::io::copy(&mut self.writer.file, &mut out).map_err(|_| Error::OtherIoError)?;
        out.flush().map_err(|_| Error::OtherIoError)?;
        self.writer.file.seek(SeekFrom::Start(fpos))?;
        Ok(())
    }

    /// Finalize the document and release the context.
    pub fn close(mut self) -> Result<()> {
        self.close_session(false)
    }

    fn close_session(&mut self, checkpoint: bool) -> Result<()> {
        // A checkpoint can leave a partial page pending with the headers
        // unwritten; they are caught up here.
        if self.layout.line != 0 && !self.written && self.init {
            self.write_header()?;
            if self.form_content.is_empty() {
                let built = form::build(&self.cfg, &mut self.writer)?;
                self.form_content = built.content;
                if let Some(obj) = built.image_obj {
                    self.form_obj = Some(obj);
                    self.pbase = obj + 1;
                }
            }
        }

        if !self.written {
            return Ok(());
        }

        if self.layout.line != 0 {
            self.flush_page()?;
        }

        let page_count = self.layout.page;
        let plist = self.writer.add_object()?;
        let anchor = plist + 1 + 1 + page_count;
        {
            let f = &mut self.writer.file;
            write!(f, "{plist} 0 obj\n << /Type /Pages /Kids [")?;
            for p in 0..page_count {
                write!(f, " {} 0 R", plist + 2 + p)?;
            }
            write!(
                f,
                "] /Count {page_count} /Parent {anchor:010} 0 R >>\nendobj\n\n"
            )?;
        }

        let fonts = self.writer.add_object()?;
        write!(
            self.writer.file,
            "{fonts} 0 obj\n << /F1 << /Type /Font /Subtype /Type1 /BaseFont /{} >> \
             /F2 << /Type /Font /Subtype /Type1 /BaseFont /{} >> \
             /F3 << /Type /Font /Subtype /Type1 /BaseFont /{} >> >>\nendobj\n\n",
            self.cfg.font, self.cfg.nfont, self.cfg.lfont
        )?;

        for p in 0..page_count {
            let obj = self.writer.add_object()?;
            let f = &mut self.writer.file;
            write!(
                f,
                "{obj} 0 obj\n << /Type /Page /Parent {plist} 0 R /Resources << /Font {fonts} 0 R \
                 /ProcSet [/PDF /Text /ImageC /ImageI /ImageB]"
            )?;
            if let Some(form_obj) = self.form_obj {
                write!(f, " /XObject << /form {form_obj} 0 R >>")?;
            }
            write!(
                f,
                " >> /MediaBox [0 0 {} {}] /Contents {} 0 R >>\nendobj\n\n",
                fmt_pt(self.cfg.wid * PT_PER_IN),
                fmt_pt(self.cfg.len * PT_PER_IN),
                self.pbase + p
            )?;
        }

        // The anchor links every previous session's page tree under one
        // root, so appending never rewrites old pages.
        let aobj = self.writer.add_object()?;
        if aobj != anchor {
            return Err(Error::Bugcheck);
        }
        {
            let f = &mut self.writer.file;
            write!(f, "{aobj} 0 obj\n << /Type /Pages /Kids [")?;
            if self.prev_anchor != 0 {
                write!(f, "{} 0 R ", self.prev_anchor)?;
            }
            write!(
                f,
                "{plist} 0 R] /Count {} >>\nendobj\n\n",
                page_count + self.prev_count
            )?;
        }

        let cat = self.writer.add_object()?;
        {
            let f = &mut self.writer.file;
            write!(
                f,
                "{cat} 0 obj\n  << /Type /Catalog /Pages {aobj} 0 R /PageLayout /SinglePage \
                 /ViewerPreferences << "
            )?;
            if self.cfg.wid > self.cfg.len {
                write!(f, " /Duplex /DuplexFlipLongEdge")?;
            } else {
                write!(f, " /Duplex /DuplexFlipShortEdge")?;
            }
            if self.cfg.title != DEFAULT_TITLE {
                write!(f, " /DisplayDocTitle true")?;
            }
            write!(f, " /PickTrayByPDFSize true >> >>\nendobj\n\n")?;
        }

        let now = Local::now().format("%Y%m%d%H%M%S").to_string();
        let creation = if self.updating {
            self.ctime.clone().unwrap_or_else(|| now.clone())
        } else {
            now.clone()
        };
        let iobj = self.writer.add_object()?;
        let info = format!(
            "{iobj} 0 obj\n  << /Title ({}) /Creator (Midnight Engineering) \
             /Subject (Preserving the history of computing) /Producer (LPTPDF Version 1.0) \
             /CreationDate (D:{creation}) /ModDate (D:{now}) >>\nendobj\n\n",
            self.cfg.title
        );
        self.sha.update(info.as_bytes());
        self.writer.file.write_all(info.as_bytes())?;

        let xref_pos = self.writer.write_xref()?;

        let digest = self.sha.clone().finalize();
        let id: String = digest.iter().map(|b| format!("{b:02X}")).collect();
        let id0 = self.oid.clone().unwrap_or_else(|| id.clone());
        write!(
            self.writer.file,
            "trailer\n << /Root {cat} 0 R /Size {} /Info {iobj} 0 R /ID [<{id0}> <{id}>] >>\n\
             startxref\n{xref_pos}\n%%EOF\n",
            self.writer.count() + 1
        )?;

        // An appended session can end up shorter than the file it
        // replaced the tail of; cut it at the new EOF.
        let end = self.writer.file.stream_position()?;
        self.writer.file.set_len(end).map_err(|_| Error::IoError)?;

        if self.anchor_parent_pos != 0 {
            self.writer
                .file
                .seek(SeekFrom::Start(self.anchor_parent_pos))?;
            write!(self.writer.file, "{aobj:010}")?;
            self.writer.file.seek(SeekFrom::Start(end))?;
        }

        self.writer.file.flush().map_err(|_| Error::IoError)?;

        if let Some(trace) = self.trace.as_mut() {
            trace.increment("sessions", 1);
            trace.event(
                "close",
                &[
                    ("pages", u64::from(page_count)),
                    ("objects", u64::from(self.writer.count())),
                    ("bytes", end),
                ],
            );
            if !checkpoint {
                trace.emit_summary("close");
            }
            trace.flush();
        }
        Ok(())
    }

    /// First contact with the file contents: honor the file requirement
    /// and read the append seam when there is one.
    fn init_file(&mut self) -> Result<()> {
        self.sha = Sha1::new();

        if self.cfg.require == FileRequire::Append {
            if let Some(seam) = append::read_seam(&mut self.writer.file)? {
                // The old ID is folded into the new fingerprint so the
                // second /ID element changes on every append.
                self.sha.update(seam.oid.as_bytes());
                self.oid = Some(seam.oid);
                self.ctime = Some(seam.ctime);
                self.prev_count = seam.prev_count;
                self.prev_anchor = seam.anchor_obj;
                self.anchor_pos = seam.anchor_pos;
                self.anchor_prefix = seam.anchor_prefix;
                self.anchor_suffix = seam.anchor_suffix;
                self.pbase = seam.root_obj;
                self.writer.preload(seam.xref);
                self.writer.set_count(seam.root_obj - 1);
                self.updating = true;
                if let Some(trace) = self.trace.as_mut() {
                    trace.event(
                        "append",
                        &[
                            ("prev_pages", u64::from(self.prev_count)),
                            ("anchor", u64::from(self.prev_anchor)),
                        ],
                    );
                }
                return Ok(());
            }
        } else {
            let end = self.writer.file.seek(SeekFrom::End(0))?;
            if end != 0 {
                if self.cfg.require == FileRequire::New {
                    return Err(Error::NotEmpty);
                }
                self.writer.file.set_len(0).map_err(|_| Error::IoError)?;
            }
        }

        self.writer.file.seek(SeekFrom::Start(0))?;
        self.pbase = 1;
        Ok(())
    }

    /// Write the file header (new file), or rewrite the previous anchor
    /// into a linkable `Pages` node (append).
    fn write_header(&mut self) -> Result<()> {
        if !self.updating {
            if self.checkpoint_pos == 0 {
                self.writer
                    .file
                    .write_all(b"%PDF-1.4\n%\xC2\xA5\xC2\xB1\xC3\xAB\n")?;
            }
            self.written = true;
            return Ok(());
        }

        let f = &mut self.writer.file;
        f.seek(SeekFrom::Start(self.anchor_pos))?;
        write!(
            f,
            "{} 0 obj\n{} /Parent ",
            self.prev_anchor, self.anchor_prefix
        )?;

        // From here the file is no longer a valid PDF until close; a
        // 10-digit hole is left for the new anchor's number.
        self.anchor_parent_pos = f.stream_position()?;
        write!(f, "{:10} 0 R {}\nendobj\n\n", "", self.anchor_suffix)?;

        if self.checkpoint_pos != 0 {
            f.seek(SeekFrom::Start(self.checkpoint_pos))?;
        }
        self.written = true;
        Ok(())
    }

    /// Render, optionally compress, and emit the current page's content
    /// stream, then roll the layout into the next page.
    fn flush_page(&mut self) -> Result<()> {
        let obj = self.writer.add_object()?;

        self.page_buf.clear();
        self.page_buf.extend_from_slice(self.form_content.as_bytes());
        self.layout
            .render_text(&self.cfg, self.lpp, &mut self.page_buf);
        let raw_len = self.page_buf.len();

        let encoded = encode_stream(&self.page_buf, self.cfg.uncompressed);
        let f = &mut self.writer.file;
        let compressed_len = match &encoded {
            StreamEncoding::Raw => {
                write!(f, "{obj} 0 obj\n<< /Length {raw_len} >>\nstream\n")?;
                f.write_all(&self.page_buf)?;
                0
            }
            StreamEncoding::Lzw(data) => {
                write!(
                    f,
                    "{obj} 0 obj\n  << /Length {} /DL {raw_len} /Filter /LZWDecode \
                     /DecodeParms << /EarlyChange 0 >> >>\nstream\n",
                    data.len()
                )?;
                f.write_all(data)?;
                data.len()
            }
        };
        f.write_all(b"\nendstream\nendobj\n\n")?;

        self.layout.finish_page(self.lpp, self.tof);

        if let Some(trace) = self.trace.as_mut() {
            trace.increment("pages", 1);
            trace.event(
                "page",
                &[
                    ("page", u64::from(self.layout.page)),
                    ("bytes", raw_len as u64),
                    ("compressed", compressed_len as u64),
                ],
            );
        }
        Ok(())
    }

    fn record<T>(&mut self, r: Result<T>) -> Result<T> {
        if let Err(err) = &r {
            self.last_error = Some(err.code());
        }
        r
    }

    /// Last error recorded on this context, 0 if none. Sticky until
    /// cleared.
    pub fn last_error(&self) -> i32 {
        self.last_error.unwrap_or(0)
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Print the last error to stderr with an optional prefix.
    pub fn perror(&self, prefix: &str) {
        if !prefix.is_empty() {
            eprintln!("{}: {}", prefix, crate::error::strerror(self.last_error()));
        } else {
            eprintln!("{}", crate::error::strerror(self.last_error()));
        }
    }

    fn set_guard(&mut self) -> Result<()> {
        if self.active {
            let r = Err(Error::Active);
            self.record(r)
        } else {
            Ok(())
        }
    }

    pub fn set_file_require(&mut self, name: &str) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_require(name);
        self.record(r)
    }

    pub fn set_form(&mut self, name: &str) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_form(name);
        self.record(r)
    }

    pub fn set_form_image(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_form_image(path.as_ref().to_path_buf());
        self.record(r)
    }

    pub fn set_text_font(&mut self, name: &str) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_text_font(name);
        self.record(r)
    }

    pub fn set_number_font(&mut self, name: &str) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_number_font(name);
        self.record(r)
    }

    pub fn set_label_font(&mut self, name: &str) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_label_font(name);
        self.record(r)
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_title(title);
        self.record(r)
    }

    pub fn set_top_margin(&mut self, inches: f64) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_top_margin(inches);
        self.record(r)
    }

    pub fn set_bottom_margin(&mut self, inches: f64) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_bottom_margin(inches);
        self.record(r)
    }

    pub fn set_side_margin(&mut self, inches: f64) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_side_margin(inches);
        self.record(r)
    }

    pub fn set_lno_width(&mut self, inches: f64) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_lno_width(inches);
        self.record(r)
    }

    pub fn set_bar_height(&mut self, inches: f64) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_bar_height(inches);
        self.record(r)
    }

    pub fn set_cpi(&mut self, cpi: f64) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_cpi(cpi);
        self.record(r)
    }

    pub fn set_lpi(&mut self, lpi: u32) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_lpi(lpi);
        self.record(r)
    }

    pub fn set_page_width(&mut self, inches: f64) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_page_width(inches);
        self.record(r)
    }

    pub fn set_page_length(&mut self, inches: f64) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_page_length(inches);
        self.record(r)
    }

    pub fn set_cols(&mut self, cols: u32) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_cols(cols);
        self.record(r)
    }

    pub fn set_tof_offset(&mut self, lines: u32) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_tof_offset(lines);
        self.record(r)
    }

    pub fn set_no_lzw(&mut self, disable: bool) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_no_lzw(disable);
        self.record(r)
    }

    pub fn set_trace_log(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.set_guard()?;
        let r = self.cfg.set_trace_log(path.as_ref().to_path_buf());
        self.record(r)
    }
}

enum StreamEncoding {
    Raw,
    Lzw(Vec<u8>),
}

/// Compress unless disabled, and fall back to the raw bytes whenever the
/// encoder fails to actually shrink the stream.
fn encode_stream(raw: &[u8], uncompressed: bool) -> StreamEncoding {
    if uncompressed {
        return StreamEncoding::Raw;
    }
    let compressed = lzw::compress(raw);
    if compressed.len() >= raw.len() {
        StreamEncoding::Raw
    } else {
        StreamEncoding::Lzw(compressed)
    }
}

/// A usable output name has no extension or a case-consistent `.pdf`.
fn check_extension(path: &Path) -> Result<()> {
    let name = path.to_str().ok_or(Error::BadFilename)?;
    let Some(dot) = name.rfind('.') else {
        return Ok(());
    };
    let ext = &name[dot + 1..];
    let want = if ext.starts_with(|c: char| c.is_ascii_lowercase()) {
        "pdf"
    } else {
        "PDF"
    };
    if ext == want {
        Ok(())
    } else {
        Err(Error::BadFilename)
    }
}

/// Quick header check: does the file begin with `%PDF-1.<digits>`?
///
/// Accepts any file this library produced, and any other 1.x PDF.
pub fn is_pdf_file(path: impl AsRef<Path>) -> Result<()> {
    use std::io::Read;

    let mut file = File::open(path).map_err(Error::Os)?;
    let mut buf = [0u8; 100];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).map_err(Error::Os)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let line = &buf[..filled];
    if !line.starts_with(b"%PDF-1.") {
        return Err(Error::NotPdf);
    }
    let mut i = 7;
    while i < line.len() && line[i].is_ascii_digit() {
        i += 1;
    }
    if i > 7 && i < line.len() && line[i] == b'\n' {
        Ok(())
    } else {
        Err(Error::NotPdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "lpt2pdf_doc_{}_{}_{}.pdf",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    fn file_text(path: &Path) -> String {
        String::from_utf8_lossy(&std::fs::read(path).expect("read output")).into_owned()
    }

    fn first_id(text: &str) -> String {
        let at = text.find("/ID [<").expect("trailer ID") + 6;
        text[at..at + 40].to_string()
    }

    fn second_id(text: &str) -> String {
        let at = text.find("/ID [<").expect("trailer ID") + 6;
        let rest = &text[at + 40..];
        let at2 = rest.find('<').expect("second ID") + 1;
        rest[at2..at2 + 40].to_string()
    }

    fn creation_date(text: &str) -> String {
        let at = text.find("/CreationDate (D:").expect("creation date") + 17;
        let end = text[at..].find(')').expect("date close");
        text[at..at + end].to_string()
    }

    #[test]
    fn minimal_document_has_expected_structure() {
        let path = temp_path("minimal");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.print(b"HELLO\n").unwrap();
        assert_eq!(pdf.position(), (1, 2));
        pdf.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4\n"));
        let text = String::from_utf8_lossy(&bytes);
        // Freelist plus content, page list, fonts, page, anchor, catalog,
        // and info.
        assert!(text.contains("xref\n0 8\n"));
        assert!(text.contains("/Title (Lineprinter data)"));
        assert!(text.contains("/Producer (LPTPDF Version 1.0)"));
        assert!(text.contains("/BaseFont /Courier"));
        assert!(text.ends_with("%%EOF\n"));

        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        is_pdf_file(&path).unwrap();
    }

    #[test]
    fn every_xref_entry_points_at_its_object() {
        let path = temp_path("xref");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.print(b"PAGE ONE\x0cPAGE TWO\x0c").unwrap();
        pdf.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        let at = text.rfind("\nxref\n").unwrap() + 1;
        let mut lines = text[at..].lines();
        lines.next();
        let (_, count) = lines.next().unwrap().split_once(' ').unwrap();
        let count: usize = count.parse().unwrap();
        lines.next(); // freelist
        for obj in 1..count {
            let entry = lines.next().unwrap();
            let offset: usize = entry[..10].parse().unwrap();
            let head = format!("{obj} 0 obj\n");
            assert_eq!(
                &bytes[offset..offset + head.len()],
                head.as_bytes(),
                "object {obj}"
            );
        }
    }

    #[test]
    fn form_feed_completes_pages() {
        let path = temp_path("formfeed");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.print(b"A\nB\x0cC\n").unwrap();
        assert_eq!(pdf.position(), (2, 2));
        pdf.close().unwrap();

        let doc = lopdf::Document::load_mem(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn leading_form_feed_is_swallowed_once() {
        let path = temp_path("leadff");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.print(b"\x0cONLY\n").unwrap();
        pdf.close().unwrap();
        let doc = lopdf::Document::load_mem(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn text_survives_uncompressed_extraction() {
        let path = temp_path("fidelity");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_no_lzw(true).unwrap();
        pdf.print(b"HELLO WORLD\n").unwrap();
        pdf.close().unwrap();

        let doc = lopdf::Document::load_mem(&std::fs::read(&path).unwrap()).unwrap();
        let (_, &page_id) = doc.get_pages().iter().next().unwrap();
        let content = doc.get_page_content(page_id).unwrap();
        let content = String::from_utf8_lossy(&content);
        assert!(content.contains("(HELLO WORLD)Tj"));
    }

    #[test]
    fn overstrike_renders_an_overlay() {
        let path = temp_path("overstrike");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_no_lzw(true).unwrap();
        pdf.print(b"ABC\rXYZ\n").unwrap();
        pdf.close().unwrap();

        let text = file_text(&path);
        assert!(text.contains("(ABC)Tj 0 0 Td (XYZ)Tj"));
    }

    #[test]
    fn csi_pitch_change_lands_on_the_same_page() {
        let path = temp_path("pitch");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_no_lzw(true).unwrap();
        pdf.print(b"X\n").unwrap();
        pdf.print(&[0x9B, b'2', b'z']).unwrap();
        pdf.print(b"Y\n").unwrap();
        pdf.close().unwrap();

        let text = file_text(&path);
        assert!(text.contains("(X)Tj /F1 9 Tf 9 TL T* (Y)Tj"));
        let doc = lopdf::Document::load_mem(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn page_streams_compress_when_beneficial() {
        let path = temp_path("lzwon");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.print(b"HELLO\n").unwrap();
        pdf.close().unwrap();

        let text = file_text(&path);
        assert!(text.contains("/Filter /LZWDecode"));
        assert!(text.contains("/DecodeParms << /EarlyChange 0 >>"));
    }

    #[test]
    fn tiny_streams_stay_raw() {
        // A 9-bit code per byte cannot shrink short input, so the raw
        // branch must win.
        let data = b"XQZPWKJVYJ4R7TN2M5F8";
        assert!(matches!(
            encode_stream(data, false),
            StreamEncoding::Raw
        ));
        match encode_stream(&vec![b'='; 4096], false) {
            StreamEncoding::Lzw(c) => assert!(c.len() < 4096),
            StreamEncoding::Raw => panic!("repetitive stream should compress"),
        }
        assert!(matches!(
            encode_stream(&vec![b'='; 4096], true),
            StreamEncoding::Raw
        ));
    }

    #[test]
    fn append_extends_and_preserves_identity() {
        let path = temp_path("append");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.print(b"A\n").unwrap();
        pdf.close().unwrap();
        let text1 = file_text(&path);
        let id1 = first_id(&text1);
        let created1 = creation_date(&text1);

        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_file_require("APPEND").unwrap();
        pdf.print(b"B\n").unwrap();
        assert_eq!(pdf.position(), (2, 2));
        pdf.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);

        let text2 = String::from_utf8_lossy(&bytes);
        assert_eq!(first_id(&text2), id1);
        assert_ne!(second_id(&text2), id1);
        assert_eq!(creation_date(&text2), created1);
    }

    #[test]
    fn append_without_data_changes_nothing() {
        let path = temp_path("appendnoop");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.print(b"STABLE\n").unwrap();
        pdf.close().unwrap();
        let before = std::fs::read(&path).unwrap();

        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_file_require("APPEND").unwrap();
        pdf.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn three_sessions_chain_their_anchors() {
        let path = temp_path("append3");
        for data in [&b"ONE\n"[..], b"TWO\n", b"THREE\n"] {
            let mut pdf = Pdf::open(&path).unwrap();
            pdf.set_file_require("APPEND").unwrap();
            pdf.print(data).unwrap();
            pdf.close().unwrap();
        }
        let doc = lopdf::Document::load_mem(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn checkpoint_leaves_a_valid_standalone_pdf() {
        let path = temp_path("checkpoint");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.print(b"FIRST\x0c").unwrap();
        pdf.checkpoint().unwrap();

        let doc = lopdf::Document::load_mem(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        is_pdf_file(&path).unwrap();

        pdf.print(b"SECOND\x0c").unwrap();
        pdf.close().unwrap();
        let doc = lopdf::Document::load_mem(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn snapshot_copies_a_consistent_file_and_writing_continues() {
        let path = temp_path("snapsrc");
        let snap = temp_path("snapdst");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.print(b"KEEP\x0c").unwrap();
        pdf.snapshot(&snap).unwrap();

        let doc = lopdf::Document::load_mem(&std::fs::read(&snap).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        pdf.print(b"MORE\x0c").unwrap();
        pdf.close().unwrap();
        let doc = lopdf::Document::load_mem(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn new_refuses_an_existing_file() {
        let path = temp_path("refuse");
        std::fs::write(&path, b"leftovers").unwrap();
        let mut pdf = Pdf::open(&path).unwrap();
        let err = pdf.print(b"X\n").unwrap_err();
        assert!(matches!(err, Error::NotEmpty));
        assert_eq!(pdf.last_error(), Error::NotEmpty.code());
        pdf.clear_error();
        assert_eq!(pdf.last_error(), 0);
    }

    #[test]
    fn replace_truncates_an_existing_file() {
        let path = temp_path("replace");
        std::fs::write(&path, b"old junk that is not a pdf").unwrap();
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_file_require("REPLACE").unwrap();
        pdf.print(b"NEW\n").unwrap();
        pdf.close().unwrap();
        assert!(std::fs::read(&path).unwrap().starts_with(b"%PDF-1.4\n"));
    }

    #[test]
    fn append_rejects_foreign_files() {
        let path = temp_path("foreign");
        std::fs::write(&path, b"%PDF-1.4\nnot really ours\n").unwrap();
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_file_require("APPEND").unwrap();
        assert!(matches!(pdf.print(b"X\n").unwrap_err(), Error::NoAppend));

        let path = temp_path("nonpdf");
        std::fs::write(&path, b"plain text\n").unwrap();
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_file_require("APPEND").unwrap();
        assert!(matches!(pdf.print(b"X\n").unwrap_err(), Error::NotPdf));
    }

    #[test]
    fn filenames_must_end_in_pdf_case_consistently() {
        let dir = std::env::temp_dir();
        assert!(Pdf::open(dir.join("lpt2pdf_ext.txt")).is_err());
        assert!(matches!(
            Pdf::open(dir.join("lpt2pdf_ext.Pdf")).unwrap_err(),
            Error::BadFilename
        ));
        let upper = dir.join(format!("LPT2PDF_EXT_{}.PDF", std::process::id()));
        assert!(Pdf::open(&upper).is_ok());
        let bare = dir.join(format!("lpt2pdf_ext_bare_{}", std::process::id()));
        assert!(Pdf::open(&bare).is_ok());
    }

    #[test]
    fn configuration_freezes_once_printing_starts() {
        let path = temp_path("active");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_lpi(8).unwrap();
        pdf.print(b"GO\n").unwrap();
        assert!(matches!(pdf.set_lpi(6).unwrap_err(), Error::Active));
        assert!(matches!(
            pdf.set_title("late").unwrap_err(),
            Error::Active
        ));
        pdf.close().unwrap();
    }

    #[test]
    fn custom_title_is_embedded_and_flagged() {
        let path = temp_path("title");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_title("Payroll (1978)").unwrap();
        pdf.print(b"X\n").unwrap();
        pdf.close().unwrap();
        let text = file_text(&path);
        assert!(text.contains(r"/Title (Payroll \(1978\))"));
        assert!(text.contains("/DisplayDocTitle true"));
    }

    #[test]
    fn is_pdf_file_checks_only_the_header() {
        let path = temp_path("hdr");
        std::fs::write(&path, b"%PDF-1.7\nanything\n").unwrap();
        assert!(is_pdf_file(&path).is_ok());
        std::fs::write(&path, b"%PS-Adobe\n").unwrap();
        assert!(matches!(is_pdf_file(&path).unwrap_err(), Error::NotPdf));
    }

    #[test]
    fn trace_log_records_pages_and_close() {
        let path = temp_path("traced");
        let log = std::env::temp_dir().join(format!(
            "lpt2pdf_trace_out_{}_{}.log",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_trace_log(&log).unwrap();
        pdf.print(b"T\x0c").unwrap();
        pdf.close().unwrap();

        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("\"type\":\"page\""));
        assert!(text.contains("\"type\":\"close\""));
        assert!(text.contains("\"type\":\"trace.summary\""));
    }

    #[test]
    fn tof_offset_carries_overflow_lines_to_the_next_page() {
        let path = temp_path("carry");
        let mut pdf = Pdf::open(&path).unwrap();
        pdf.set_no_lzw(true).unwrap();
        // 66 lines per page, TOF at 6: line 67 lands on page 2's top.
        let mut data = Vec::new();
        for _ in 0..60 {
            data.extend_from_slice(b"\n");
        }
        data.extend_from_slice(b"CARRIED");
        pdf.print(&data).unwrap();
        pdf.print(b"\n\x0c").unwrap();
        pdf.close().unwrap();

        let doc = lopdf::Document::load_mem(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        let pages: Vec<_> = doc.get_pages().into_values().collect();
        let second = doc.get_page_content(pages[1]).unwrap();
        assert!(String::from_utf8_lossy(&second).contains("(CARRIED)Tj"));
    }
}
