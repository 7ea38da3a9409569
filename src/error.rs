// SPDX-License-Identifier: MPL-2.0
use std::fmt;

/// Errors produced by the conversion pipeline.
///
/// `Aborted` is deliberately its own variant so callers can suppress
/// error notifications when the user cancelled the operation themselves.
#[derive(Debug, Clone)]
pub enum Error {
    /// The source format could not be inferred, no backend supports the
    /// requested (source, target) pair, or no engine template exists for
    /// the target. Never retried.
    UnsupportedFormat(String),

    /// The cancellation token fired while the operation was in flight.
    Aborted,

    /// A backend failed while executing: decode error, engine command
    /// failure, or an empty output.
    Backend(String),

    /// A temporary resource could not be acquired (raster surface,
    /// worker, engine process, temp directory).
    Resource(String),

    /// Underlying I/O failure.
    Io(String),

    /// Configuration could not be read or written.
    Config(String),
}

impl Error {
    /// Returns true when the error represents deliberate cancellation.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// Returns true for unsupported-format contract violations.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedFormat(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedFormat(msg) => write!(f, "Unsupported format: {msg}"),
            Error::Aborted => write!(f, "Aborted by user"),
            Error::Backend(msg) => write!(f, "Backend error: {msg}"),
            Error::Resource(msg) => write!(f, "Resource error: {msg}"),
            Error::Io(msg) => write!(f, "I/O Error: {msg}"),
            Error::Config(msg) => write!(f, "Config Error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
