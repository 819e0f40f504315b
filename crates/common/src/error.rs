//! Error types shared across Projector crates.

/// Failure of a single call across the remote channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("transport to the remote service was lost")]
    TransportLost,

    #[error("remote exception: {0}")]
    Exception(String),

    #[error("remote object no longer exists")]
    DeadObject,
}

/// Result of a raw remote call.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Top-level error type for Projector operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectorError {
    /// Authorization refused; retrying needs fresh user consent.
    #[error("Authorization denied: {message}")]
    Denied { message: String },

    #[error("Invalid display configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Remote call {service}.{operation} failed: {source}")]
    Remote {
        service: String,
        operation: &'static str,
        #[source]
        source: RemoteError,
    },

    #[error("Session already released")]
    AlreadyReleased,

    #[error("Capability token is already bound to session {session}")]
    TokenConflict { session: u64 },

    #[error("Capability token has been stopped")]
    TokenStopped,

    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Remote service unavailable: {service}")]
    Unavailable { service: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ProjectorError.
pub type ProjectorResult<T> = Result<T, ProjectorError>;

impl ProjectorError {
    pub fn denied(msg: impl Into<String>) -> Self {
        Self::Denied {
            message: msg.into(),
        }
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: msg.into(),
        }
    }

    pub fn unavailable(service: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// The underlying remote failure, if this error came from the channel.
    pub fn remote_cause(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Only transport loss qualifies; the layer itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self.remote_cause(), Some(RemoteError::TransportLost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_names_service_and_operation() {
        let err = ProjectorError::Remote {
            service: "display".to_string(),
            operation: "createVirtualDisplay",
            source: RemoteError::DeadObject,
        };
        assert_eq!(
            err.to_string(),
            "Remote call display.createVirtualDisplay failed: remote object no longer exists"
        );
        assert_eq!(err.remote_cause(), Some(&RemoteError::DeadObject));
    }

    #[test]
    fn only_transport_loss_is_retryable() {
        let lost = ProjectorError::Remote {
            service: "appops".to_string(),
            operation: "setMode",
            source: RemoteError::TransportLost,
        };
        assert!(lost.is_retryable());
        assert!(!ProjectorError::denied("no consent").is_retryable());
        assert!(!ProjectorError::AlreadyReleased.is_retryable());
    }
}
