use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Graph API error: {0}")]
    GraphApi(#[from] GraphApiError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Monitoring interval of {requested_secs}s is below the {minimum_secs}s minimum")]
    InvalidInterval {
        requested_secs: u64,
        minimum_secs: u64,
    },

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphApiError {
    #[error("Access token invalid or expired: {message}")]
    Unauthorized { message: String },

    #[error("Insufficient permission: {message}")]
    Forbidden { message: String },

    #[error("Object not found: {object}")]
    NotFound { object: String },

    #[error("Rate limit exceeded (retry after {retry_after:?} seconds)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Private reply rejected (code {code}): {message}")]
    PrivateReplyRejected { code: i64, message: String },

    #[error("Request rejected with status {status_code} (code {code:?}): {message}")]
    BadRequest {
        status_code: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Corrupt record in {table}: {details}")]
    CorruptRecord { table: String, details: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Monitoring is not configured")]
    NotConfigured,

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl From<sqlx::Error> for CoreError {
    fn from(error: sqlx::Error) -> Self {
        CoreError::Database(DatabaseError::Sql(error))
    }
}
