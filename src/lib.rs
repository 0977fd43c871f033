//! lpt2pdf turns ASCII lineprinter output into PDF files whose pages look
//! like classic continuous-feed stationery: tractor-feed sprocket holes,
//! alternating color bars, line-number columns, and the data overlaid in a
//! core PDF font.
//!
//! The engine writes incrementally and can reopen its own files to append
//! more pages, or checkpoint mid-session so the file on disk is always a
//! valid PDF. See [`Pdf`] for the session API.
//!
//! ```no_run
//! use lpt2pdf::Pdf;
//!
//! let mut pdf = Pdf::open("spool.pdf")?;
//! pdf.set_title("Nightly batch")?;
//! pdf.print(b"DAILY REPORT\n\x0c")?;
//! pdf.close()?;
//! # Ok::<(), lpt2pdf::Error>(())
//! ```

mod append;
mod config;
mod document;
mod error;
mod escapes;
mod form;
mod lzw;
mod object;
mod page;
mod trace;
mod types;

pub use config::{parse_linear, FileRequire, FormKind, CORE_FONTS, DEFAULT_TITLE, FORM_NAMES};
pub use document::{is_pdf_file, Pdf};
pub use error::{strerror, Error, Result, ERROR_BASE};

/// The fourteen fonts every conforming PDF reader supplies.
pub fn font_list() -> &'static [&'static str] {
    &CORE_FONTS
}

/// Names of the built-in form backgrounds.
pub fn form_list() -> &'static [&'static str] {
    &FORM_NAMES
}
