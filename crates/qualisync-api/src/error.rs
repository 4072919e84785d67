use thiserror::Error;

/// Top-level error type for the `qualisync-api` crate.
///
/// Covers every failure mode across both API surfaces: the REST query
/// interface and the websocket change feed. `qualisync-core` maps these
/// into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Rejected credentials (bad anon key, expired access token).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── REST API ────────────────────────────────────────────────────
    /// Structured error from the REST layer (parsed from the
    /// `{message, code, details, hint}` error body).
    #[error("API error (HTTP {status}): {message}")]
    Api {
        message: String,
        code: Option<String>,
        status: u16,
    },

    // ── Change feed ─────────────────────────────────────────────────
    /// Websocket connection failed.
    #[error("Change feed connection failed: {0}")]
    FeedConnect(String),

    /// Websocket closed unexpectedly.
    #[error("Change feed closed (code {code}): {reason}")]
    FeedClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the caller is not allowed
    /// to perform the operation (row-level policy, missing grant).
    ///
    /// Audit-trail writers treat this as an expected, silent no-op.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Api { code, status, .. } => {
                matches!(status, 401 | 403)
                    || matches!(code.as_deref(), Some("42501" | "PGRST301" | "PGRST302"))
            }
            _ => false,
        }
    }

    /// Returns `true` if the target relation does not exist on the
    /// backend (partially-migrated schema). Soft failure for loaders.
    pub fn is_missing_relation(&self) -> bool {
        matches!(
            self,
            Self::Api { code, .. } if matches!(code.as_deref(), Some("42P01" | "PGRST205"))
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::FeedConnect(_) => true,
            Self::Api { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_violation_is_permission_denied() {
        let err = Error::Api {
            message: "permission denied for table audit_log_entries".into(),
            code: Some("42501".into()),
            status: 403,
        };
        assert!(err.is_permission_denied());
    }

    #[test]
    fn missing_relation_is_not_permission_denied() {
        let err = Error::Api {
            message: "relation \"stock_risk_controls\" does not exist".into(),
            code: Some("42P01".into()),
            status: 404,
        };
        assert!(err.is_missing_relation());
        assert!(!err.is_permission_denied());
    }

    #[test]
    fn server_overload_is_transient() {
        let err = Error::Api {
            message: "upstream unavailable".into(),
            code: None,
            status: 503,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn timeout_is_transient() {
        assert!(Error::Timeout { timeout_secs: 20 }.is_transient());
    }
}
