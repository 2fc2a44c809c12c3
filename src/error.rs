use thiserror::Error;

/// Failure taxonomy exposed by the client core.
///
/// Three variants cover every expected failure mode. `Validation` marks
/// caller or configuration misuse and is never retried. `Timeout` marks an
/// exceeded deadline or a cancelled call and is always retried by the default
/// classifier. `Internal` covers everything else (HTTP failures, transport
/// exceptions, malformed responses) and is retried only when its message
/// matches the transient-failure classifier in [`crate::retry`].
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Invalid request payload or configuration, such as a missing API key.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Deadline exceeded or the call was cancelled mid-flight.
    #[error("timed out: {message}")]
    Timeout { message: String },
    /// Provider, transport, or parsing failure.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl LlmError {
    /// Creates an [`LlmError::Validation`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use valet_llm::error::LlmError;
    ///
    /// let err = LlmError::validation("model is required");
    /// assert!(matches!(err, LlmError::Validation { .. }));
    /// ```
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an [`LlmError::Timeout`] from a textual description.
    pub fn timeout<T: Into<String>>(message: T) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an [`LlmError::Internal`] from a textual description.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the underlying message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message }
            | Self::Timeout { message }
            | Self::Internal { message } => message,
        }
    }

    /// Returns `true` for the deadline/cancellation variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
