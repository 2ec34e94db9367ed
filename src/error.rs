use thiserror::Error;

/// Errors returned by the exchange gateway.
///
/// The transient/fatal split drives the retry policy: transient errors are
/// retried with bounded exponential backoff, fatal errors stop the control
/// loop (credentials are assumed invalid, or order state is ambiguous).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Parse(String),
}

impl GatewayError {
    /// Transient errors are retried under the bounded-backoff policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_)
                | GatewayError::Server { .. }
                | GatewayError::RateLimited(_)
                | GatewayError::Parse(_)
        )
    }

    /// Rate-limit errors get a mandatory minimum backoff floor.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited(_))
    }

    /// Fatal errors halt the control loop and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            GatewayError::Network(err.to_string())
        } else if err.is_decode() {
            GatewayError::Parse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}
