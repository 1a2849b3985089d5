//! Client error types with retryability classification.

use snafu::Snafu;

/// Result type alias for client operations.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// JSON-RPC error code conventionally used for rate limiting.
const RPC_RATE_LIMITED: i64 = -32005;

/// Errors from the chain and subgraph clients.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    /// The HTTP transport failed (connect, timeout, TLS).
    #[snafu(display("transport error calling {endpoint}: {message}"))]
    Transport {
        /// Endpoint that failed.
        endpoint: String,
        /// Error description.
        message: String,
    },

    /// The upstream answered with a non-success HTTP status.
    #[snafu(display("{endpoint} answered HTTP {status}"))]
    Http {
        /// Endpoint that answered.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// The chain node returned a JSON-RPC error object.
    #[snafu(display("rpc error {code}: {message}"))]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the node.
        message: String,
    },

    /// The subgraph returned GraphQL-level errors.
    #[snafu(display("subgraph query failed: {message}"))]
    Subgraph {
        /// First reported GraphQL error.
        message: String,
    },

    /// A response could not be decoded into the expected shape.
    #[snafu(display("failed to decode {what}: {message}"))]
    Decode {
        /// What was being decoded.
        what: String,
        /// Decode failure description.
        message: String,
    },

    /// Retry attempts exhausted on a retryable error.
    #[snafu(display("retry exhausted after {attempts} attempts: {last_error}"))]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error message before giving up.
        last_error: String,
    },
}

impl ClientError {
    /// Whether the error is transient and worth retrying with backoff.
    ///
    /// Retryable: transport failures, HTTP 429/503, and the JSON-RPC
    /// rate-limit code. Application-level errors (reverts, decode failures,
    /// GraphQL errors) are not — retrying them cannot change the outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Http { status, .. } => matches!(status, 429 | 503),
            Self::Rpc { code, message } => {
                *code == RPC_RATE_LIMITED || message.to_ascii_lowercase().contains("rate limit")
            },
            Self::Subgraph { .. } | Self::Decode { .. } | Self::RetryExhausted { .. } => false,
        }
    }
}
