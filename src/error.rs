//! error: error kinds surfaced by the store coordinator.
//!
//! - Closed: the handle was closed (or its engine failed irrecoverably during reset).
//! - Underlying: an engine call failed; the original anyhow chain is kept as source.
//! - InvalidArgument: malformed input, logged at warn before it is returned.

use log::warn;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store has been closed")]
    Closed,

    #[error("{context}")]
    Underlying {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid arguments: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Wrap an engine error with the name of the operation that produced it.
    pub fn underlying<C: Into<String>>(context: C, source: anyhow::Error) -> Self {
        StoreError::Underlying {
            context: context.into(),
            source,
        }
    }

    /// Build an InvalidArgument error and log it.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        let msg = msg.into();
        warn!("call store function with invalid arguments - {}", msg);
        StoreError::InvalidArgument(msg)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, StoreError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn underlying_keeps_context_and_source() {
        let err = StoreError::underlying("store commit", anyhow!("disk full"));
        assert_eq!(err.to_string(), "store commit");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));
        assert!(!err.is_closed());

        // Chain reporters print the engine message once.
        let report = format!("{:#}", anyhow::Error::new(err));
        assert_eq!(report, "store commit: disk full");
    }

    #[test]
    fn closed_is_recognised() {
        assert!(StoreError::Closed.is_closed());
        assert!(!StoreError::invalid_argument("empty key").is_closed());
    }
}
