//! The single failure kind reported by [`Runner::start`](crate::runner::Runner::start).
//!
//! Callers treat every "cannot start" condition the same way, so build failures,
//! unreadable manifests, missing artifacts and launch failures all surface as
//! [`ProjectCannotStart`]. They differ only in message text and cause chain.

use std::error::Error as StdError;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A project could not be built or launched.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProjectCannotStart {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ProjectCannotStart {
    /// Failure with no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Failure wrapping the error that caused it.
    pub fn with_cause(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(cause.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn display_is_message_only() {
        let err = ProjectCannotStart::with_cause("Build returned error", anyhow!("exit 1"));
        assert_eq!(err.to_string(), "Build returned error");
        assert_eq!(err.cause().map(ToString::to_string).as_deref(), Some("exit 1"));
    }

    #[test]
    fn cause_chain_is_visible_through_anyhow() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "mvn not found");
        let err = anyhow::Error::new(ProjectCannotStart::with_cause(
            "Error while building /tmp/app",
            io,
        ));
        assert_eq!(
            format!("{err:#}"),
            "Error while building /tmp/app: mvn not found"
        );
    }

    #[test]
    fn new_has_no_cause() {
        let err = ProjectCannotStart::new("Could not find the jar file at /tmp/app.jar");
        assert!(err.source().is_none());
    }
}
