use thiserror::Error;

/// Error types for the harvest engine
#[derive(Error, Debug)]
pub enum HarvestError {
    // Selector errors
    #[error("Invalid selector syntax: {selector}")]
    InvalidSelector { selector: String },

    #[error("Selector matched no elements: {selector}")]
    EmptyResult { selector: String },

    // Extraction errors
    #[error("Source extraction failed: {source_id} - {message}")]
    SourceExtraction { source_id: String, message: String },

    // Session lifecycle errors
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session not completed: {session_id}")]
    SessionNotCompleted { session_id: String },

    #[error("Cannot complete session without results: {session_id}")]
    NoResults { session_id: String },

    // Consolidation errors
    #[error("Consolidation failed: {message}")]
    Consolidation { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl HarvestError {
    /// Create an invalid-selector error
    pub fn invalid_selector(selector: impl Into<String>) -> Self {
        Self::InvalidSelector { selector: selector.into() }
    }

    /// Create an empty-result error
    pub fn empty_result(selector: impl Into<String>) -> Self {
        Self::EmptyResult { selector: selector.into() }
    }

    /// Create a source-extraction error
    pub fn source_extraction(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceExtraction {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Create a session-not-found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound { session_id: session_id.into() }
    }

    /// Create a consolidation error
    pub fn consolidation(message: impl Into<String>) -> Self {
        Self::Consolidation { message: message.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check whether the engine can keep going after this error.
    ///
    /// Selector- and source-level failures are absorbed into lower confidence
    /// or recorded error strings; session misuse and consolidation failures
    /// surface to the caller.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidSelector { .. }
            | Self::EmptyResult { .. }
            | Self::SourceExtraction { .. } => true,

            Self::SessionNotFound { .. }
            | Self::SessionNotCompleted { .. }
            | Self::NoResults { .. }
            | Self::Consolidation { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => false,
        }
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidSelector { .. } | Self::EmptyResult { .. } => "selector",
            Self::SourceExtraction { .. } => "extraction",
            Self::SessionNotFound { .. }
            | Self::SessionNotCompleted { .. }
            | Self::NoResults { .. } => "session",
            Self::Consolidation { .. } => "consolidation",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for the harvest engine
pub type HarvestResult<T> = std::result::Result<T, HarvestError>;

impl From<anyhow::Error> for HarvestError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal { message: err.to_string() }
    }
}
