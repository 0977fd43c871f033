use std::fmt;
use std::io;

/// First code reserved for the library's own errors. Codes below the base
/// belong to the host OS and are reported with the OS message.
pub const ERROR_BASE: i32 = 1000;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The handle passed to an API call is not a live context.
    BadHandle,
    /// The output name is missing or does not end in `.pdf`.
    BadFilename,
    /// The context's file was never opened.
    NotOpen,
    /// An error code that is neither ours nor a known OS errno.
    BadErrno,
    /// NEW was requested but the file has content.
    NotEmpty,
    /// The file does not start with a PDF header.
    NotPdf,
    /// The file is a PDF, but not one this library can extend.
    NoAppend,
    /// The file was not produced by this library.
    NotProduced,
    /// Output has started; configuration is frozen.
    Active,
    /// Unknown configuration option.
    BadSet,
    /// Option value out of range.
    Invalid,
    /// Negative value for a linear dimension.
    NegativeValue,
    /// Font name is not one of the PDF core fonts.
    UnknownFont,
    /// Form name is not in the form list.
    UnknownForm,
    /// Page geometry leaves no usable print area.
    InconsistentGeometry,
    /// Read/write failure on the output file.
    IoError,
    /// Read/write failure on a secondary file (image, snapshot).
    OtherIoError,
    /// JPEG form image could not be parsed.
    BadJpeg,
    /// Internal invariant violated.
    Bugcheck,
    /// OS-level failure, reported with the host error message.
    Os(io::Error),
}

impl Error {
    /// Stable numeric identity. `Os` errors report the raw errno, which is
    /// always below [`ERROR_BASE`].
    pub fn code(&self) -> i32 {
        match self {
            Error::BadHandle => ERROR_BASE,
            Error::BadFilename => ERROR_BASE + 1,
            Error::NotOpen => ERROR_BASE + 2,
            Error::BadErrno => ERROR_BASE + 3,
            Error::NotEmpty => ERROR_BASE + 4,
            Error::NotPdf => ERROR_BASE + 5,
            Error::NoAppend => ERROR_BASE + 6,
            Error::NotProduced => ERROR_BASE + 7,
            Error::Active => ERROR_BASE + 8,
            Error::BadSet => ERROR_BASE + 9,
            Error::Invalid => ERROR_BASE + 10,
            Error::NegativeValue => ERROR_BASE + 11,
            Error::UnknownFont => ERROR_BASE + 12,
            Error::UnknownForm => ERROR_BASE + 13,
            Error::InconsistentGeometry => ERROR_BASE + 14,
            Error::IoError => ERROR_BASE + 15,
            Error::OtherIoError => ERROR_BASE + 16,
            Error::BadJpeg => ERROR_BASE + 17,
            Error::Bugcheck => ERROR_BASE + 18,
            Error::Os(err) => err.raw_os_error().unwrap_or(0),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Error::Os(err) => err.to_string(),
            other => strerror(other.code()),
        }
    }

    /// Rebuild the error for a stored numeric code. Unknown codes above
    /// the base come back as `BadErrno`, mirroring `strerror`.
    pub(crate) fn from_code(code: i32) -> Error {
        if code < ERROR_BASE {
            return Error::Os(io::Error::from_raw_os_error(code));
        }
        match code - ERROR_BASE {
            0 => Error::BadHandle,
            1 => Error::BadFilename,
            2 => Error::NotOpen,
            4 => Error::NotEmpty,
            5 => Error::NotPdf,
            6 => Error::NoAppend,
            7 => Error::NotProduced,
            8 => Error::Active,
            9 => Error::BadSet,
            10 => Error::Invalid,
            11 => Error::NegativeValue,
            12 => Error::UnknownFont,
            13 => Error::UnknownForm,
            14 => Error::InconsistentGeometry,
            15 => Error::IoError,
            16 => Error::OtherIoError,
            17 => Error::BadJpeg,
            18 => Error::Bugcheck,
            _ => Error::BadErrno,
        }
    }
}

/// Text for a numeric error code. Codes below [`ERROR_BASE`] fall back to
/// the host OS message.
pub fn strerror(code: i32) -> String {
    if code == 0 {
        return "Success".to_string();
    }
    if code < ERROR_BASE {
        return io::Error::from_raw_os_error(code).to_string();
    }
    let text = match code - ERROR_BASE {
        0 => "Not a valid PDF handle",
        1 => "Filename must end in .pdf",
        2 => "File is not open",
        3 => "Unknown error code",
        4 => "File exists and is not empty",
        5 => "File is not a PDF file",
        6 => "PDF file cannot be appended to",
        7 => "PDF file was not produced by this library",
        8 => "Parameters cannot be changed after printing starts",
        9 => "Unknown set parameter",
        10 => "Parameter value is invalid",
        11 => "Linear dimensions cannot be negative",
        12 => "Font is not a PDF core font",
        13 => "Unknown form name",
        14 => "Page geometry is inconsistent",
        15 => "I/O error on PDF file",
        16 => "I/O error on secondary file",
        17 => "Form image is not a usable JPEG",
        18 => "Internal error (bugcheck)",
        _ => "Unknown error code",
    };
    text.to_string()
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Os(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Os(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_above_base() {
        assert_eq!(Error::BadFilename.code(), ERROR_BASE + 1);
        assert_eq!(Error::Bugcheck.code(), ERROR_BASE + 18);
        assert!(Error::NoAppend.code() > ERROR_BASE);
    }

    #[test]
    fn strerror_covers_success_and_unknown() {
        assert_eq!(strerror(0), "Success");
        assert_eq!(strerror(ERROR_BASE + 999), "Unknown error code");
        assert_eq!(Error::Active.message(), strerror(Error::Active.code()));
    }
}
