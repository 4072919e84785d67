//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use qualisync_config::ConfigError;
use qualisync_core::CoreError;

/// Exit codes per the CLI spec.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach backend at {url}")]
    #[diagnostic(
        code(qualisync::connection_failed),
        help(
            "Check that the backend is reachable.\n\
             URL: {url}\n\
             Try: qualisync status --insecure"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed")]
    #[diagnostic(
        code(qualisync::auth_failed),
        help(
            "Verify the anon key and access token for profile '{profile}'.\n\
             Tokens expire: obtain a fresh one from your auth provider."
        )
    )]
    AuthFailed { profile: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(qualisync::no_credentials),
        help(
            "Configure credentials with: qualisync config init\n\
             Or set QUALISYNC_ANON_KEY and QUALISYNC_ACCESS_TOKEN."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("Unknown collection '{name}'")]
    #[diagnostic(
        code(qualisync::unknown_collection),
        help("Run: qualisync status to see all collection names")
    )]
    UnknownCollection { name: String },

    #[error("Unknown metric '{name}'")]
    #[diagnostic(
        code(qualisync::unknown_metric),
        help("Run: qualisync metric --all to see all metric identifiers")
    )]
    UnknownMetric { name: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(qualisync::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(qualisync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(qualisync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: qualisync config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(qualisync::no_config),
        help(
            "Create one with: qualisync config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(qualisync::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(qualisync::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::UnknownCollection { .. } | Self::UnknownMetric { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SessionRequired | CoreError::AuthenticationFailed { .. } => {
                CliError::AuthFailed {
                    profile: "current".into(),
                }
            }

            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::Metric { metric, message } => CliError::ApiError {
                code: metric,
                message,
            },

            CoreError::Api { message, code, status: _ } => CliError::ApiError {
                code: code.unwrap_or_default(),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },

            ConfigError::ProfileNotFound { profile, available } => CliError::ProfileNotFound {
                name: profile,
                available,
            },

            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },

            ConfigError::Io(e) => CliError::Io(e),

            ConfigError::Serialization(e) => CliError::Validation {
                field: "config".into(),
                reason: e.to_string(),
            },

            ConfigError::Figment(e) => CliError::Validation {
                field: "config".into(),
                reason: e.to_string(),
            },
        }
    }
}
