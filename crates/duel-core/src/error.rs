use thiserror::Error;

/// Application-wide error types.
///
/// Lower layers return an `AppError` to their caller; the refresh pipeline
/// decides which ones end a cycle and which ones are logged and skipped, and
/// the HTTP layer maps them to status codes.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```no_run
/// use duel_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::ConfigError("API is not set".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Covers connection failures, query errors and constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// A persistence step failed. Carries the step and table for diagnosis.
    #[error("Failed to {step} ({table}): {source}")]
    PersistenceError {
        step: &'static str,
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// HTTP request failed or returned a non-success status.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A required configuration value is missing or malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A sync watermark could not be parsed as RFC 3339.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A refresh cycle was requested while another one is still running.
    #[error("A refresh cycle is already in progress")]
    RefreshInProgress,

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a message suitable for logs read by an operator.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Check PG_HOST and PG_PORT.".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. The card API may be slow or unreachable.".to_string()
                } else if msg.contains("connect") {
                    format!("Cannot connect to card API: {}\n   Check the API URL.", msg)
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::ConfigError(msg) => {
                format!("Configuration error: {}\n   Check your environment or .env file.", msg)
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!("Request timed out after {} seconds.\n   The server may be overloaded. Try again later.", secs)
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use duel_core::error::AppError;
    ///
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::InvalidTimestamp("yesterday".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::RateLimitExceeded
                | AppError::ClientError(_)
        )
    }

    /// Returns true when the error stems from bad caller input rather than
    /// from the server.
    pub fn is_client_input(&self) -> bool {
        matches!(self, AppError::InvalidTimestamp(_))
    }
}
