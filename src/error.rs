//! Error types for wiring, running and restarting graphs.

use thiserror::Error;

/// Errors raised while wiring a graph against its drivers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A driver refused to start (or the real driver behind a wrapper did).
    #[error("driver `{name}` failed: {reason}")]
    Driver { name: String, reason: String },

    /// `main` asked for a source no driver provides.
    #[error("no source named `{0}`")]
    MissingSource(String),

    /// `main` asked for a source with the wrong type.
    #[error("source `{name}` is not a `{expected}`")]
    SourceType { name: String, expected: &'static str },

    /// `main` returned a sink whose stream type does not match the driver.
    #[error("sink `{name}` is not a stream of `{expected}`")]
    SinkType { name: String, expected: &'static str },

    /// Application-level failure reported by `main` itself.
    #[error("main failed: {0}")]
    Main(String),
}

impl Error {
    /// Build a driver failure.
    pub fn driver(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Driver {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Build an application failure.
    pub fn main(reason: impl Into<String>) -> Self {
        Self::Main(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::driver("DOM", "no container matches `.missing`");
        assert_eq!(
            err.to_string(),
            "driver `DOM` failed: no container matches `.missing`"
        );

        let err = Error::SourceType { name: "DOM".into(), expected: "u32" };
        assert_eq!(err.to_string(), "source `DOM` is not a `u32`");
    }
}
