use crate::error::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Coarse classification used when recording `last_error` and deciding how
/// loudly to log a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    ConfigInvalid,
    GatewayUnauthorized,
    GatewayForbidden,
    GatewayNotFound,
    GatewayRateLimited,
    GatewayTransient,
    PrivateReplyRejected,
    Internal,
}

impl ErrorClass {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorClass::ConfigInvalid => "CONFIG_INVALID",
            ErrorClass::GatewayUnauthorized => "GATEWAY_UNAUTHORIZED",
            ErrorClass::GatewayForbidden => "GATEWAY_FORBIDDEN",
            ErrorClass::GatewayNotFound => "GATEWAY_NOT_FOUND",
            ErrorClass::GatewayRateLimited => "GATEWAY_RATE_LIMITED",
            ErrorClass::GatewayTransient => "GATEWAY_TRANSIENT",
            ErrorClass::PrivateReplyRejected => "PRIVATE_REPLY_REJECTED",
            ErrorClass::Internal => "INTERNAL",
        }
    }

    /// Failures that are part of normal operation and only deserve a warning.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ErrorClass::PrivateReplyRejected | ErrorClass::GatewayRateLimited
        )
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn classify(&self) -> ErrorClass;
    fn is_transient(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;

    fn error_code(&self) -> &'static str {
        self.classify().code()
    }
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::GraphApi(e) => {
                error!("Graph API error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn classify(&self) -> ErrorClass {
        match self {
            CoreError::GraphApi(e) => e.classify(),
            CoreError::Config(_) | CoreError::InvalidInterval { .. } => ErrorClass::ConfigInvalid,
            CoreError::Network(e) if e.is_timeout() || e.is_connect() => {
                ErrorClass::GatewayTransient
            }
            CoreError::Network(e) => match e.status().map(|s| s.as_u16()) {
                Some(401) => ErrorClass::GatewayUnauthorized,
                Some(403) => ErrorClass::GatewayForbidden,
                Some(404) => ErrorClass::GatewayNotFound,
                Some(429) => ErrorClass::GatewayRateLimited,
                _ => ErrorClass::GatewayTransient,
            },
            CoreError::Timeout { .. } => ErrorClass::GatewayTransient,
            _ => ErrorClass::Internal,
        }
    }

    fn is_transient(&self) -> bool {
        matches!(
            self.classify(),
            ErrorClass::GatewayTransient | ErrorClass::GatewayRateLimited
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::GraphApi(e) => e.retry_after(),
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::GraphApi(e) => e.user_friendly_message(),
            CoreError::Config(e) => match e {
                ConfigError::MissingField { field } => {
                    format!("Facebook configuration is incomplete: '{}' is required.", field)
                }
                ConfigError::NotConfigured => {
                    "Facebook configuration is missing. Save a page id and access token first."
                        .to_string()
                }
                ConfigError::InvalidValue { field, .. } => {
                    format!("Invalid value for configuration field '{}'.", field)
                }
                ConfigError::FileNotFound { path } => {
                    format!("Settings file '{}' not found.", path)
                }
                ConfigError::Parse(_) => "Settings file could not be parsed.".to_string(),
            },
            CoreError::InvalidInterval { minimum_secs, .. } => format!(
                "Monitoring interval must be at least {} seconds.",
                minimum_secs
            ),
            CoreError::Database(_) => {
                "Local storage error occurred. Monitoring will retry next interval.".to_string()
            }
            CoreError::Network(_) | CoreError::Timeout { .. } => {
                "Network failure while contacting Facebook; will retry next interval.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            _ => "An unexpected error occurred. Monitoring will retry next interval.".to_string(),
        }
    }
}

impl ErrorExt for GraphApiError {
    fn log_error(&self) -> &Self {
        error!("GraphApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("GraphApiError (warning): {}", self);
        self
    }

    fn classify(&self) -> ErrorClass {
        match self {
            GraphApiError::Unauthorized { .. } => ErrorClass::GatewayUnauthorized,
            GraphApiError::Forbidden { .. } => ErrorClass::GatewayForbidden,
            GraphApiError::NotFound { .. } => ErrorClass::GatewayNotFound,
            GraphApiError::RateLimited { .. } => ErrorClass::GatewayRateLimited,
            GraphApiError::ServerError { .. }
            | GraphApiError::RequestTimeout
            | GraphApiError::ConnectionFailed { .. } => ErrorClass::GatewayTransient,
            GraphApiError::PrivateReplyRejected { .. } => ErrorClass::PrivateReplyRejected,
            GraphApiError::BadRequest { .. } | GraphApiError::InvalidResponse { .. } => {
                ErrorClass::Internal
            }
        }
    }

    fn is_transient(&self) -> bool {
        matches!(
            self.classify(),
            ErrorClass::GatewayTransient | ErrorClass::GatewayRateLimited
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            GraphApiError::RateLimited {
                retry_after: Some(seconds),
            } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            GraphApiError::Unauthorized { .. } => {
                "Facebook credentials expired or invalid. Please re-authenticate and update the access token."
                    .to_string()
            }
            GraphApiError::Forbidden { .. } => {
                "Insufficient permission for the Facebook page. Check the token's granted permissions."
                    .to_string()
            }
            GraphApiError::NotFound { object } => {
                format!("Facebook object '{}' no longer exists.", object)
            }
            GraphApiError::RateLimited { .. } => {
                "Rate limited by Facebook; will retry at the next interval.".to_string()
            }
            GraphApiError::ServerError { status_code } => format!(
                "Facebook upstream failure (HTTP {}); will retry at the next interval.",
                status_code
            ),
            GraphApiError::RequestTimeout | GraphApiError::ConnectionFailed { .. } => {
                "Network failure while contacting Facebook; will retry at the next interval."
                    .to_string()
            }
            GraphApiError::PrivateReplyRejected { message, .. } => {
                format!("Private reply not delivered: {}", message)
            }
            GraphApiError::BadRequest { message, .. } => {
                format!("Facebook rejected the request: {}", message)
            }
            GraphApiError::InvalidResponse { .. } => {
                "Facebook returned an unexpected response.".to_string()
            }
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
            if let Some(retry_after) = error.retry_after() {
                info!("Upstream asked to retry after {:?}", retry_after);
            }
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }

    /// Logs at a level matching the error's class: expected failures warn,
    /// everything else is reported as an error.
    pub fn report(&self, error: &CoreError) {
        if error.classify().is_expected() {
            self.report_warning(error);
        } else {
            self.report_error(error);
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
