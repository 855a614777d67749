use thiserror::Error;

/// Main error type for the BPM detector
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised by the media source (metadata lookup, download, transcode)
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Not a music link: {url}")]
    NotMusic { url: String },

    #[error("Metadata lookup failed: {reason}")]
    MetadataFailed { reason: String },

    #[error("{reason}")]
    DownloadFailed { reason: String },

    #[error("Required tool '{tool}' is unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },
}

/// Audio loading and analysis errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Resampling failed: {reason}")]
    ResampleFailed { reason: String },

    #[error("Audio analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using DetectorError
pub type Result<T> = std::result::Result<T, DetectorError>;

/// Failure classes surfaced to callers of the detection service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The link does not point at music; the caller can fix this
    InvalidContent,
    /// Fetching or transcoding the media failed
    DownloadFailure,
    /// Decoding or estimating on the downloaded waveform failed
    AnalysisFailure,
    /// Anything else
    Unhandled,
}

impl FailureKind {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidContent)
    }
}

impl DetectorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Classify this error for the transport boundary
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Source(SourceError::NotMusic { .. }) => FailureKind::InvalidContent,
            Self::Source(_) => FailureKind::DownloadFailure,
            Self::Audio(_) => FailureKind::AnalysisFailure,
            _ => FailureKind::Unhandled,
        }
    }

    /// Get a user-facing message suitable for an error response body
    pub fn user_message(&self) -> String {
        match self {
            Self::Source(SourceError::NotMusic { .. }) => {
                "Cannot process: this is not a music link".to_string()
            }
            Self::Source(source) => format!("Error downloading audio: {}", source),
            other => {
                let message = other.to_string();
                if message.is_empty() {
                    "Internal Server Error".to_string()
                } else {
                    format!("Error: {}", message)
                }
            }
        }
    }
}
