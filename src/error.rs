use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// The input is not a usable DOCX package.
    InvalidDocx(String),
    Xml(roxmltree::Error),
    Zip(zip::result::ZipError),
    InvalidImage { marker: String, reason: String },
    InvalidOption(String),
}

impl Error {
    /// True for failures caused by the caller's input rather than by the
    /// environment (disk, archive writer).
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidDocx(_)
                | Error::Xml(_)
                | Error::InvalidImage { .. }
                | Error::InvalidOption(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::InvalidDocx(msg) => write!(f, "invalid DOCX: {msg}"),
            Error::Xml(e) => write!(f, "malformed XML part: {e}"),
            Error::Zip(e) => write!(f, "archive error: {e}"),
            Error::InvalidImage { marker, reason } => {
                write!(f, "invalid image for marker {marker}: {reason}")
            }
            Error::InvalidOption(msg) => write!(f, "invalid option: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Xml(e) => Some(e),
            Error::Zip(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::Xml(e)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Zip(e)
    }
}
