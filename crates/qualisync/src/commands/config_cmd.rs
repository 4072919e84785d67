//! Config subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use qualisync_config::{self as shared, Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::active_profile_name;
use crate::error::CliError;
use crate::output;

#[derive(Tabled, Serialize)]
struct ProfileRow {
    name: String,
    backend: String,
    actor: String,
    realtime: bool,
    default: bool,
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),
        ConfigCommand::Show => show(global),
        ConfigCommand::Profiles => profiles(global),
        ConfigCommand::Use { name } => use_profile(&name, global),
    }
}

/// Write a starter config with a commented sample profile.
fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let path = shared::config_path();
    if path.exists() {
        return Err(CliError::Validation {
            field: "config".into(),
            reason: format!("config already exists at {}", path.display()),
        });
    }

    let mut cfg = Config::default();
    cfg.profiles.insert(
        "default".into(),
        Profile {
            backend: global
                .backend
                .clone()
                .unwrap_or_else(|| "https://project-ref.example.co".into()),
            anon_key: global.anon_key.clone(),
            anon_key_env: Some("QUALISYNC_ANON_KEY".into()),
            access_token: None,
            access_token_env: Some("QUALISYNC_ACCESS_TOKEN".into()),
            actor: global.actor.clone(),
            actor_id: None,
            realtime_url: None,
            realtime: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            fetch_timeout: None,
        },
    );
    shared::save_config(&cfg)?;

    if !global.quiet {
        eprintln!("Config written to {}", path.display());
        eprintln!("Edit the 'default' profile, then run: qualisync status");
    }
    Ok(())
}

/// Print the resolved configuration (credentials redacted).
fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = shared::load_config_or_default();

    if !global.quiet {
        eprintln!("Config path: {}", shared::config_path().display());
        eprintln!("Active profile: {}", active_profile_name(global, &cfg));
    }

    let rendered = match global.output {
        OutputFormat::Json => output::render_json(&serde_json::json!({
            "default_profile": cfg.default_profile,
            "defaults": {
                "output": cfg.defaults.output,
                "timeout": cfg.defaults.timeout,
                "fetch_timeout": cfg.defaults.fetch_timeout,
                "realtime": cfg.defaults.realtime,
            },
            "profiles": profile_rows(&cfg),
        })),
        OutputFormat::Table | OutputFormat::Plain => output::render_table(&profile_rows(&cfg)),
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn profiles(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = shared::load_config_or_default();
    let rows = profile_rows(&cfg);

    let rendered = match global.output {
        OutputFormat::Json => output::render_json(&rows),
        OutputFormat::Table => output::render_table(&rows),
        OutputFormat::Plain => rows
            .iter()
            .map(|r| r.name.clone())
            .collect::<Vec<_>>()
            .join("\n"),
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn use_profile(name: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = shared::load_config_or_default();
    if !cfg.profiles.contains_key(name) {
        let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name: name.to_owned(),
            available: available.join(", "),
        });
    }

    cfg.default_profile = Some(name.to_owned());
    shared::save_config(&cfg)?;
    if !global.quiet {
        eprintln!("Default profile set to '{name}'");
    }
    Ok(())
}

fn profile_rows(cfg: &Config) -> Vec<ProfileRow> {
    let mut rows: Vec<ProfileRow> = cfg
        .profiles
        .iter()
        .map(|(name, profile)| ProfileRow {
            name: name.clone(),
            backend: profile.backend.clone(),
            actor: profile.actor.clone().unwrap_or_default(),
            realtime: profile.realtime.unwrap_or(cfg.defaults.realtime),
            default: cfg.default_profile.as_deref() == Some(name),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}
