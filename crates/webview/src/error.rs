//! Error types for the webview host
//!
//! Flat hierarchy. Unknown session ids are not errors at all: callers race
//! with asynchronous teardown, so those paths are silent no-ops.

use thiserror::Error;

use crate::engine::EngineError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Affine thread is no longer running")]
    DispatcherGone,

    #[error("Blocking call issued from the affine thread")]
    AffineReentry,

    #[error("Engine not initialized")]
    NotInitialized,

    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Storage error for profile {profile}: {source}")]
    Storage {
        profile: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Script error: {0}")]
    Script(String),

    #[error("Script call cancelled")]
    Cancelled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_and_messages() {
        let err: Error = url::Url::parse("http://bad host/").unwrap_err().into();
        assert!(matches!(err, Error::InvalidUrl(_)));
        assert!(err.to_string().starts_with("Invalid URL: "));

        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.to_string(), "IO error: gone");

        let err = Error::Script("boom".to_string());
        assert_eq!(err.to_string(), "Script error: boom");
    }
}
