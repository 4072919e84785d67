//! Configuration for the qualisync CLI and embedding applications.
//!
//! TOML profiles, credential resolution (keyring + env + plaintext),
//! and translation to `qualisync_core::ServiceConfig` / `Session`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use qualisync_core::{Actor, RecordId, ServiceConfig, Session, TlsVerification};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found (available: {available})")]
    ProfileNotFound { profile: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// HTTP request timeout in seconds (transport level).
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Per-collection fetch deadline in seconds inside a load wave.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: u64,

    /// Subscribe to the change feed once a session is attached.
    #[serde(default = "default_realtime")]
    pub realtime: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            fetch_timeout: default_fetch_timeout(),
            realtime: default_realtime(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_fetch_timeout() -> u64 {
    20
}
fn default_realtime() -> bool {
    true
}

/// A named backend profile.
#[derive(Debug, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g., "https://project-ref.example.co").
    pub backend: String,

    /// Project anon key (plaintext -- prefer keyring or env var).
    pub anon_key: Option<String>,

    /// Environment variable name containing the anon key.
    pub anon_key_env: Option<String>,

    /// Session access token (plaintext -- prefer keyring or env var).
    pub access_token: Option<String>,

    /// Environment variable name containing the access token.
    pub access_token_env: Option<String>,

    /// Display name attached to audit-trail appends.
    pub actor: Option<String>,

    /// Backend identifier of the actor (uuid or integer as text).
    pub actor_id: Option<String>,

    /// Override the change-feed endpoint derived from `backend`.
    pub realtime_url: Option<String>,

    /// Disable the change feed for this profile.
    pub realtime: Option<bool>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept self-signed TLS certificates.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Override the per-collection fetch deadline (seconds).
    pub fetch_timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "qualisync", "qualisync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("qualisync");
    p
}

// ── Config loading / saving ─────────────────────────────────────────

/// Load the full Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from an explicit path + environment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("QUALISYNC_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the project anon key: profile env var, keyring, plaintext.
pub fn resolve_anon_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.anon_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(entry) = keyring::Entry::new("qualisync", &format!("{profile_name}/anon-key")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    if let Some(ref key) = profile.anon_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve the session access token through the same chain.
pub fn resolve_access_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.access_token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(entry) = keyring::Entry::new("qualisync", &format!("{profile_name}/access-token")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    if let Some(ref token) = profile.access_token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation to core types ───────────────────────────────────────

/// Build a `ServiceConfig` from a profile, folding in global defaults.
pub fn profile_to_service_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ServiceConfig, ConfigError> {
    let base_url: url::Url = profile.backend.parse().map_err(|_| ConfigError::Validation {
        field: "backend".into(),
        reason: format!("invalid URL: {}", profile.backend),
    })?;

    let realtime_url = profile
        .realtime_url
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|_| ConfigError::Validation {
            field: "realtime_url".into(),
            reason: format!("invalid URL: {:?}", profile.realtime_url),
        })?;

    let anon_key = resolve_anon_key(profile, profile_name)?;

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(ServiceConfig {
        base_url,
        anon_key,
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        fetch_timeout: Duration::from_secs(profile.fetch_timeout.unwrap_or(defaults.fetch_timeout)),
        realtime_enabled: profile.realtime.unwrap_or(defaults.realtime),
        realtime_url,
    })
}

/// Build the `Session` the profile acts as.
///
/// The actor identity is attribution metadata for audit appends, not an
/// authentication input -- absent fields fall back to a CLI placeholder.
pub fn profile_to_session(profile: &Profile, profile_name: &str) -> Result<Session, ConfigError> {
    let access_token = resolve_access_token(profile, profile_name)?;

    let full_name = profile
        .actor
        .clone()
        .unwrap_or_else(|| "qualisync-cli".into());
    let id = profile
        .actor_id
        .as_deref()
        .map_or_else(|| RecordId::Text(full_name.clone()), RecordId::from);

    Ok(Session {
        access_token,
        actor: Actor { id, full_name },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn profile(backend: &str) -> Profile {
        Profile {
            backend: backend.into(),
            anon_key: Some("plain-anon-key".into()),
            anon_key_env: None,
            access_token: Some("plain-token".into()),
            access_token_env: None,
            actor: Some("Ayşe Demir".into()),
            actor_id: Some("550e8400-e29b-41d4-a716-446655440000".into()),
            realtime_url: None,
            realtime: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            fetch_timeout: Some(5),
        }
    }

    #[test]
    fn config_round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert("plant".into(), profile("https://qms.example.co"));
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.default_profile.as_deref(), Some("default"));
        assert_eq!(loaded.profiles["plant"].backend, "https://qms.example.co");
        assert_eq!(loaded.profiles["plant"].fetch_timeout, Some(5));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert!(loaded.profiles.is_empty());
        assert_eq!(loaded.defaults.timeout, 30);
        assert!(loaded.defaults.realtime);
    }

    #[test]
    fn profile_translates_to_service_config() {
        let cfg = profile_to_service_config(
            &profile("https://qms.example.co"),
            "plant",
            &Defaults::default(),
        )
        .unwrap();

        assert_eq!(cfg.base_url.as_str(), "https://qms.example.co/");
        assert_eq!(cfg.anon_key.expose_secret(), "plain-anon-key");
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(5));
        assert!(cfg.realtime_enabled);
    }

    #[test]
    fn invalid_backend_url_is_rejected() {
        let err = profile_to_service_config(&profile("not a url"), "plant", &Defaults::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn session_carries_actor_attribution() {
        let session = profile_to_session(&profile("https://qms.example.co"), "plant").unwrap();
        assert_eq!(session.access_token.expose_secret(), "plain-token");
        assert_eq!(session.actor.full_name, "Ayşe Demir");
        assert!(matches!(session.actor.id, RecordId::Uuid(_)));
    }

    #[test]
    fn missing_credentials_are_reported_per_profile() {
        let mut p = profile("https://qms.example.co");
        p.anon_key = None;
        p.anon_key_env = Some("QUALISYNC_TEST_UNSET_VAR".into());

        let err = resolve_anon_key(&p, "plant").unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }
}
