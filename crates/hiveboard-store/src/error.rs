use std::fmt;

/// Result type for hiveboard-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the storage layer
#[derive(Debug)]
pub enum Error {
    /// IO operation failed (persistence read/write)
    Io(std::io::Error),

    /// Table file did not deserialize
    Serde(serde_json::Error),

    /// Uniqueness violation (e.g. project slug already taken)
    Conflict(String),

    /// The implicit default project cannot be deleted
    CannotDeleteDefault,

    /// Row lookup failed
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Serde(err) => write!(f, "Serialization error: {}", err),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::CannotDeleteDefault => write!(f, "The default project cannot be deleted"),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Serde(err) => Some(err),
            Error::Conflict(_) | Error::CannotDeleteDefault | Error::NotFound(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}
