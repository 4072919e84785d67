// ── Runtime service configuration ──
//
// These types describe *how* to reach the backend and who the session
// acts as. They carry credential data and connection tuning, but never
// touch disk. The CLI constructs them from its profile layer.

use std::time::Duration;

use qualisync_api::RecordId;
use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default)]
pub enum TlsVerification {
    /// System CA store (strict). Default for hosted backends.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-hosted dev stacks).
    DangerAcceptInvalid,
}

/// Configuration for one backend project.
///
/// Built by the CLI (or an embedding application), passed to
/// `DataService` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Backend base URL (e.g., `https://project-ref.example.co`).
    pub base_url: Url,
    /// Project anon key, sent as the `apikey` header.
    pub anon_key: SecretString,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// HTTP request timeout (transport level).
    pub timeout: Duration,
    /// Per-collection fetch deadline inside a load wave. A fetch that
    /// outlives this becomes a soft failure instead of stalling the wave.
    pub fetch_timeout: Duration,
    /// Subscribe to the change feed after the initial load starts.
    pub realtime_enabled: bool,
    /// Override for the change-feed endpoint. Derived from `base_url`
    /// when absent.
    pub realtime_url: Option<Url>,
}

impl ServiceConfig {
    /// The websocket endpoint the change feed connects to.
    ///
    /// `https://host/…` becomes `wss://host/realtime/v1/stream`
    /// (`http` becomes `ws`) unless an explicit override is set.
    pub fn feed_url(&self) -> Result<Url, crate::error::CoreError> {
        if let Some(url) = &self.realtime_url {
            return Ok(url.clone());
        }

        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(crate::error::CoreError::Config {
                    message: format!("cannot derive feed URL from scheme '{other}'"),
                });
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| crate::error::CoreError::Config {
                message: "cannot derive feed URL from base URL".into(),
            })?;
        url.set_path("/realtime/v1/stream");
        Ok(url)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            // Local dev stack default; hosted projects override.
            base_url: "http://127.0.0.1:54321".parse().unwrap_or_else(|_| {
                unreachable!("static default URL is valid")
            }),
            anon_key: SecretString::from(String::new()),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(20),
            realtime_enabled: true,
            realtime_url: None,
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// The person a session acts as, used for audit-trail attribution.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: RecordId,
    pub full_name: String,
}

/// An authenticated session handle.
///
/// Produced by the external auth provider; the service only reacts to
/// sessions appearing ([`DataService::start`](crate::DataService::start))
/// and disappearing ([`DataService::end_session`](crate::DataService::end_session)).
#[derive(Debug, Clone)]
pub struct Session {
    /// Access token sent as the bearer credential on every request.
    pub access_token: SecretString,
    /// Identity attached to audit-trail appends.
    pub actor: Actor,
}
