use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("invalid hint: {0}")]
    InvalidHint(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("resource busy: {0}")]
    ResourceBusy(String),

    #[error("io failure: {0}")]
    Io(#[from] io::Error),

    #[error("ring is empty")]
    Empty,
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// These codes are stable and can be used by clients for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            Error::InvalidHint(_) => "INVALID_HINT",
            Error::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
            Error::ResourceBusy(_) => "RESOURCE_BUSY",
            Error::Io(_) => "IO_FAILURE",
            Error::Empty => "EMPTY",
        }
    }

    /// Returns true if retrying the same call without changes could succeed.
    ///
    /// IO failures are transient by nature; every other variant reflects a
    /// precondition the caller violated and will violate again on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(Error::CapacityExceeded("x".into()).code(), "CAPACITY_EXCEEDED");
        assert_eq!(Error::InvalidHint("x".into()).code(), "INVALID_HINT");
        assert_eq!(Error::IntegrityViolation("x".into()).code(), "INTEGRITY_VIOLATION");
        assert_eq!(Error::ResourceBusy("x".into()).code(), "RESOURCE_BUSY");
        assert_eq!(Error::Empty.code(), "EMPTY");
    }

    #[test]
    fn only_io_errors_are_retryable() {
        assert!(!Error::CapacityExceeded("x".into()).is_retryable());
        assert!(!Error::InvalidHint("x".into()).is_retryable());
        assert!(!Error::Empty.is_retryable());
        let io_err = Error::Io(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(io_err.is_retryable());
    }
}
