use thiserror::Error;

/// Error taxonomy for the AAv3 core, per the propagation policy in spec.md §7.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("LLM call exceeded timeout of {timeout_sec}s")]
    LlmTimeout { timeout_sec: u64 },

    #[error("LLM transport error: {0}")]
    LlmTransport(String),

    #[error("LLM authentication failed: {0}")]
    LlmAuth(String),

    #[error("agent output could not be parsed as the expected shape: {reason}")]
    MalformedAgentOutput { reason: String, raw_excerpt: String },

    #[error("filesystem error writing '{path}': {reason}")]
    FilesystemError { path: String, reason: String },

    #[error("test adapter '{adapter}' failed to launch: {reason}")]
    SubprocessFailure { adapter: String, reason: String },

    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("session cancelled")]
    Cancelled,
}

impl AppError {
    /// The stable string used in `verdict.json`'s `errors[].kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LlmTimeout { .. } => "LLMTimeout",
            Self::LlmTransport(_) => "LLMTransport",
            Self::LlmAuth(_) => "LLMAuth",
            Self::MalformedAgentOutput { .. } => "MalformedAgentOutput",
            Self::FilesystemError { .. } => "FilesystemError",
            Self::SubprocessFailure { .. } => "SubprocessFailure",
            Self::ConfigError(_) => "ConfigError",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Whether the Orchestrator's phase loop should retry this error once
    /// before treating the session as failed (spec.md §4.7, §7).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LlmTimeout { .. } | Self::LlmTransport(_) | Self::MalformedAgentOutput { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_timeout_message() {
        let err = AppError::LlmTimeout { timeout_sec: 900 };
        assert_eq!(err.to_string(), "LLM call exceeded timeout of 900s");
        assert_eq!(err.kind(), "LLMTimeout");
    }

    #[test]
    fn retryable_kinds() {
        assert!(AppError::LlmTimeout { timeout_sec: 1 }.is_retryable());
        assert!(AppError::LlmTransport("boom".into()).is_retryable());
        assert!(
            AppError::MalformedAgentOutput {
                reason: "no braces".into(),
                raw_excerpt: String::new()
            }
            .is_retryable()
        );
        assert!(!AppError::LlmAuth("no key".into()).is_retryable());
        assert!(
            !AppError::FilesystemError {
                path: "x".into(),
                reason: "denied".into()
            }
            .is_retryable()
        );
        assert!(!AppError::ConfigError("bad threshold".into()).is_retryable());
        assert!(!AppError::Cancelled.is_retryable());
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppError>();
    }
}
