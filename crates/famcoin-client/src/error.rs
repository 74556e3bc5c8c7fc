//! Error types for the famcoin client.

/// Message shown when the API cannot be reached at all.
pub const MSG_NO_CONNECTION: &str = "No internet connection";

/// Message shown when a request exceeds the configured timeout.
pub const MSG_TIMEOUT: &str = "Connection timed out";

/// Fallback message when the server gave no explanation.
pub const MSG_UNKNOWN: &str = "Unknown error. Please try again.";

/// Client errors.
///
/// Errors are `Clone` so a single failed fetch can be handed to every caller
/// sharing the same in-flight request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// The API could not be reached.
    #[error("network error: {message}")]
    Network { message: String },

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Credential missing, invalid or expired.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Server rejected the request (validation or business rule).
    #[error("server error (HTTP {status}): {}", message.as_deref().unwrap_or("no message"))]
    Api {
        status: u16,
        message: Option<String>,
    },

    /// Local pre-check: the wallet cannot cover the reward.
    #[error("insufficient balance: reward costs {cost}, wallet holds {balance}")]
    InsufficientBalance { balance: i64, cost: i64 },

    /// Response body could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Credential store failure.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Cache entry held a value of another type.
    #[error("cache error: {message}")]
    Cache { message: String },
}

impl ClientError {
    /// Human-readable message for display.
    ///
    /// Server-reported messages are passed through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api {
                message: Some(message),
                ..
            } => message.clone(),
            Self::Network { .. } => MSG_NO_CONNECTION.to_string(),
            Self::Timeout => MSG_TIMEOUT.to_string(),
            Self::InsufficientBalance { .. } => {
                "You don't have enough coins for this reward".to_string()
            }
            Self::Unauthorized { .. } => "Your session has expired. Please sign in again.".to_string(),
            _ => MSG_UNKNOWN.to_string(),
        }
    }

    /// Whether the error is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the caller should be treated as signed out.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
