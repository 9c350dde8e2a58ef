use thiserror::Error;

/// Core error type for the pattern-learning support engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The embedding or extraction provider failed or timed out.
    ///
    /// Callers treat this as "semantic search disabled for this call" and
    /// degrade to keyword matching instead of aborting the request.
    #[error("provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    /// The pattern store failed. Not locally recoverable; the caller must
    /// escalate the conversation to a human queue.
    #[error("pattern store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// Delivering an auto-executed response failed downstream.
    #[error("message delivery failed after {attempts} attempt(s): {reason}")]
    DeliveryFailed { attempts: u32, reason: String },

    /// An action tag in the policy dispatch table did not parse.
    ///
    /// Raised at configuration load so an unrecognized action type fails
    /// fast instead of silently no-opping at runtime.
    #[error("unrecognized action tag '{tag}' for pattern type '{pattern_type}'")]
    InvalidActionTag { tag: String, pattern_type: String },

    /// An execution record referenced by an operator action does not exist.
    #[error("execution record '{id}' not found")]
    UnknownExecution { id: String },

    /// A pattern referenced by id does not exist.
    #[error("pattern '{id}' not found")]
    UnknownPattern { id: String },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// Conversion implementations for common error types
impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::ProviderUnavailable {
                reason: "request timed out".to_string(),
            }
        } else if err.is_connect() {
            EngineError::ProviderUnavailable {
                reason: format!("connection failed: {err}"),
            }
        } else if let Some(status) = err.status() {
            EngineError::ProviderUnavailable {
                reason: format!("HTTP {status}: {err}"),
            }
        } else {
            EngineError::ProviderUnavailable {
                reason: err.to_string(),
            }
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::StoreUnavailable {
            reason: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::StoreUnavailable {
            reason: format!("blocking task failed: {err}"),
        }
    }
}

impl EngineError {
    /// Create a provider-unavailable error.
    #[must_use]
    pub fn provider(reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a store-unavailable error.
    #[must_use]
    pub fn store(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Whether this error should disable the semantic path for the current
    /// call rather than fail it.
    #[must_use]
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_is_degradable() {
        let err = EngineError::provider("timeout");
        assert!(err.is_degradable());
        assert!(err.to_string().contains("provider unavailable"));
    }

    #[test]
    fn test_store_error_is_not_degradable() {
        let err = EngineError::store("disk full");
        assert!(!err.is_degradable());
    }

    #[test]
    fn test_invalid_action_tag_display() {
        let err = EngineError::InvalidActionTag {
            tag: "launch_rocket".to_string(),
            pattern_type: "tech".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("launch_rocket"));
        assert!(msg.contains("tech"));
    }
}
