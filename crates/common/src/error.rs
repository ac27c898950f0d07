/// StudyMint error types
#[derive(Debug, thiserror::Error)]
pub enum StudyMintError {
    /// Token budget cannot admit the content (or the chunk budget itself)
    #[error("Invalid token budget: needs at least {required}, got {budget}")]
    InvalidBudget {
        /// Smallest budget that would work
        required: usize,
        /// Budget that was requested
        budget: usize,
    },

    /// Every configured provider exhausted its attempts
    #[error("LLM service unavailable: {last_error}")]
    ProviderUnavailable {
        /// Last underlying failure, for diagnostics
        last_error: String,
    },

    /// Request was cancelled by the caller
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StudyMintError {
    /// Create invalid budget error
    pub fn invalid_budget(required: usize, budget: usize) -> Self {
        Self::InvalidBudget { required, budget }
    }

    /// Create provider unavailable error
    pub fn provider_unavailable<S: Into<String>>(last_error: S) -> Self {
        Self::ProviderUnavailable {
            last_error: last_error.into(),
        }
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the failure came from the caller's request rather than a fault
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

// HTTP status mapping for whatever web layer sits in front of the pipeline
impl StudyMintError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidBudget { .. } => 400,
            Self::ProviderUnavailable { .. } => 503,
            Self::Cancelled => 408,
            Self::InvalidInput(_) => 400,
            Self::Config(_) => 500,
            Self::Io(_) => 500,
            Self::Json(_) => 400,
            Self::Other(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(StudyMintError::invalid_budget(12, 4).status_code(), 400);
        assert_eq!(StudyMintError::provider_unavailable("boom").status_code(), 503);
        assert_eq!(StudyMintError::Cancelled.status_code(), 408);
        assert!(StudyMintError::invalid_input("empty").is_client_error());
        assert!(!StudyMintError::config("missing").is_client_error());
    }

    #[test]
    fn test_every_variant_has_a_status() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "notes.txt");
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let cases = [
            (StudyMintError::invalid_budget(3, 2), 400),
            (StudyMintError::provider_unavailable("openai: down"), 503),
            (StudyMintError::Cancelled, 408),
            (StudyMintError::config("bad"), 500),
            (StudyMintError::invalid_input("empty"), 400),
            (StudyMintError::from(io), 500),
            (StudyMintError::from(json), 400),
            (StudyMintError::from(anyhow::anyhow!("other")), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }

    #[test]
    fn test_provider_unavailable_carries_last_error() {
        let err = StudyMintError::provider_unavailable("Rate limit exceeded");
        assert_eq!(
            err.to_string(),
            "LLM service unavailable: Rate limit exceeded"
        );
    }
}
