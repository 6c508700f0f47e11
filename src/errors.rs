use thiserror::Error;

/// Failure modes of the transfer indexer.
///
/// Item-level variants (`RpcData`, `EnrichmentUnavailable`) are logged and
/// swallowed by the component that produced them. Batch-level variants
/// propagate to the per-chain loop, which backs off and retries the window.
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Connectivity loss, timeouts and node-side failures
    #[error("RPC request failed: {message}")]
    RpcTransient { message: String },

    /// The node refused a log query because the block range was too wide
    #[error("RPC block range too large: {message}")]
    RpcRangeTooLarge { message: String },

    /// Malformed or unsupported payloads returned by the node
    #[error("Invalid RPC data in {field}: {message}")]
    RpcData { field: String, message: String },

    /// A label or price source could not be reached
    #[error("Enrichment source {source_name} unavailable: {message}")]
    EnrichmentUnavailable {
        source_name: String,
        message: String,
    },

    /// The store rejected or could not complete an operation
    #[error("Persistence failed during {operation}: {message}")]
    Persistence { operation: String, message: String },

    /// Invalid configuration, fatal for the chain it belongs to
    #[error("Configuration error: {parameter} - {message}")]
    Configuration { parameter: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl IndexerError {
    pub fn rpc_transient(message: impl Into<String>) -> Self {
        Self::RpcTransient {
            message: message.into(),
        }
    }

    pub fn rpc_range_too_large(message: impl Into<String>) -> Self {
        Self::RpcRangeTooLarge {
            message: message.into(),
        }
    }

    pub fn rpc_data(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RpcData {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn enrichment(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EnrichmentUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn persistence(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn configuration(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the chain loop should back off and retry the same window.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcTransient { .. } | Self::RpcRangeTooLarge { .. } | Self::Persistence { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;

impl From<sqlx::Error> for IndexerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => Self::persistence("query", db_err.to_string()),
            sqlx::Error::PoolClosed => Self::persistence("connect", "Connection pool closed"),
            sqlx::Error::PoolTimedOut => Self::persistence("connect", "Connection pool timed out"),
            _ => Self::persistence("query", format!("SQLx error: {err}")),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for IndexerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::persistence("migrate", err.to_string())
    }
}

/// Transport errors default to the RPC taxonomy; enrichment clients map
/// their own failures explicitly.
impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::rpc_transient(format!("Request timed out: {err}"))
        } else if err.is_connect() {
            Self::rpc_transient(format!("Connection error: {err}"))
        } else if err.is_decode() {
            Self::rpc_data("response", err.to_string())
        } else {
            Self::rpc_transient(format!("Request error: {err}"))
        }
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(err: serde_json::Error) -> Self {
        Self::rpc_data("json", err.to_string())
    }
}
