//! CLI-side configuration resolution.
//!
//! Bridges the shared profile layer in `qualisync-config` with the
//! global CLI flags: profile selection, flag/env overrides, and the
//! flags-only path for environments without a config file.

use std::time::Duration;

use secrecy::SecretString;

use qualisync_config as shared;
use qualisync_config::Config;
use qualisync_core::{Actor, RecordId, ServiceConfig, Session, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The profile name in effect: flag/env, then the configured default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Resolve the service configuration and session for this invocation.
pub fn build_session(global: &GlobalOpts) -> Result<(ServiceConfig, Session), CliError> {
    let cfg = shared::load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        let mut service = shared::profile_to_service_config(profile, &profile_name, &cfg.defaults)?;
        let mut session = shared::profile_to_session(profile, &profile_name)?;
        apply_overrides(&mut service, &mut session, global)?;
        return Ok((service, session));
    }

    // A profile was explicitly requested but does not exist.
    if global.profile.is_some() {
        let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available.join(", "),
        });
    }

    // No profile -- build from flags / env vars alone.
    from_flags(global, &profile_name)
}

fn from_flags(global: &GlobalOpts, profile_name: &str) -> Result<(ServiceConfig, Session), CliError> {
    let backend = global.backend.as_deref().ok_or_else(|| CliError::NoConfig {
        path: shared::config_path().display().to_string(),
    })?;

    let base_url: url::Url = backend.parse().map_err(|_| CliError::Validation {
        field: "backend".into(),
        reason: format!("invalid URL: {backend}"),
    })?;

    let anon_key = global
        .anon_key
        .clone()
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.to_owned(),
        })?;
    let access_token = global
        .access_token
        .clone()
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.to_owned(),
        })?;

    let tls = if global.insecure {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::SystemDefaults
    };

    let service = ServiceConfig {
        base_url,
        anon_key: SecretString::from(anon_key),
        tls,
        timeout: Duration::from_secs(global.timeout.unwrap_or(30)),
        ..ServiceConfig::default()
    };

    let full_name = global.actor.clone().unwrap_or_else(|| "qualisync-cli".into());
    let session = Session {
        access_token: SecretString::from(access_token),
        actor: Actor {
            id: RecordId::Text(full_name.clone()),
            full_name,
        },
    };

    Ok((service, session))
}

/// Fold CLI flags over a profile-derived configuration.
fn apply_overrides(
    service: &mut ServiceConfig,
    session: &mut Session,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let Some(backend) = &global.backend {
        service.base_url = backend.parse().map_err(|_| CliError::Validation {
            field: "backend".into(),
            reason: format!("invalid URL: {backend}"),
        })?;
    }
    if let Some(anon_key) = &global.anon_key {
        service.anon_key = SecretString::from(anon_key.clone());
    }
    if let Some(token) = &global.access_token {
        session.access_token = SecretString::from(token.clone());
    }
    if let Some(actor) = &global.actor {
        session.actor.full_name.clone_from(actor);
    }
    if global.insecure {
        service.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.timeout {
        service.timeout = Duration::from_secs(timeout);
    }
    Ok(())
}
