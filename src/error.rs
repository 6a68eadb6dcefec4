use std::fmt;
use std::io;

/// Crate-wide error type.
#[derive(Debug)]
pub enum Error {
    /// Truncated or inconsistent binary input, or a malformed sizes file.
    MalformedInput(String),
    /// Underlying file open/read/write failure.
    Io(io::Error),
    /// A chromosome or species lookup missed.
    UnknownName(String),
    /// An invariant of the projection engine was violated. This never
    /// triggers on well-formed input and indicates a bug.
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedInput(msg) => write!(f, "malformed input: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::UnknownName(name) => write!(f, "unknown name: {}", name),
            Error::Internal(msg) => write!(f, "internal invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
