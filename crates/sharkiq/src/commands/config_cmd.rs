//! Config subcommand handlers.

use dialoguer::{Input, Select};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use sharkiq_config::{Config, Profile};
use sharkiq_core::Region;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util::prompt_err;

const SECRET_FIELDS: &[&str] = &["password", "app_secret", "refresh_token"];
const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Config as a JSON value with every secret field masked.
fn redacted(cfg: &Config) -> Result<Value, CliError> {
    let mut value = serde_json::to_value(cfg)?;
    if let Some(profiles) = value.get_mut("profiles").and_then(Value::as_object_mut) {
        for profile in profiles.values_mut().filter_map(Value::as_object_mut) {
            for field in SECRET_FIELDS {
                if let Some(slot) = profile.get_mut(*field).filter(|v| !v.is_null()) {
                    *slot = Value::String(MASK.into());
                }
            }
        }
    }
    Ok(value)
}

/// Format config for display, masking sensitive fields.
fn format_config_redacted(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "refresh_interval = {}", cfg.defaults.refresh_interval);
    let _ = writeln!(
        out,
        "device_code_max_wait = {}",
        cfg.defaults.device_code_max_wait
    );

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "region = \"{}\"", p.region);
        let strings = [
            ("username", &p.username),
            ("password_env", &p.password_env),
            ("client_id", &p.client_id),
            ("scope", &p.scope),
            ("audience", &p.audience),
            ("realm", &p.realm),
            ("redirect_uri", &p.redirect_uri),
            ("app_id", &p.app_id),
            ("app_secret_env", &p.app_secret_env),
            ("state_validation", &p.state_validation),
            ("broker_url", &p.broker_url),
            ("user_service_url", &p.user_service_url),
            ("device_service_url", &p.device_service_url),
        ];
        for (key, value) in strings {
            if let Some(v) = value {
                let _ = writeln!(out, "{key} = \"{v}\"");
            }
        }
        for (key, value) in [
            ("password", &p.password),
            ("app_secret", &p.app_secret),
            ("refresh_token", &p.refresh_token),
        ] {
            if value.is_some() {
                let _ = writeln!(out, "{key} = \"{MASK}\"");
            }
        }
        if p.store_refresh_token_plaintext {
            let _ = writeln!(out, "store_refresh_token_plaintext = true");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(interval) = p.refresh_interval {
            let _ = writeln!(out, "refresh_interval = {interval}");
        }
    }

    out
}

/// Prompt for a non-empty line.
fn prompt_required(label: &str) -> Result<String, CliError> {
    let value: String = Input::new()
        .with_prompt(label)
        .interact_text()
        .map_err(prompt_err)?;
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Err(CliError::Validation {
            field: label.to_lowercase().replace(' ', "_"),
            reason: "cannot be empty".into(),
        });
    }
    Ok(value)
}

/// Prompt for an optional line; empty means unset.
fn prompt_optional(label: &str) -> Result<Option<String>, CliError> {
    let value: String = Input::new()
        .with_prompt(label)
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_owned()))
}

/// Read a secret and store it in the keyring or return it for plaintext config.
///
/// Returns `Some(secret)` if the user chose plaintext, `None` if stored in keyring.
fn prompt_secret(
    profile_name: &str,
    keyring_key: &str,
    label: &str,
) -> Result<Option<String>, CliError> {
    let secret = rpassword::prompt_password(format!("{label}: ")).map_err(prompt_err)?;
    if secret.is_empty() {
        return Err(CliError::Validation {
            field: keyring_key.into(),
            reason: format!("{label} cannot be empty"),
        });
    }

    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt(format!("Where to store the {}?", label.to_lowercase()))
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        sharkiq_config::store_secret(profile_name, keyring_key, &SecretString::from(secret))?;
        eprintln!("   ✓ {label} stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(secret))
    }
}

// ── Profiles listing ────────────────────────────────────────────────

#[derive(Serialize)]
struct ProfileSummary {
    name: String,
    region: Region,
    username: Option<String>,
    default: bool,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Account")]
    username: String,
    #[tabled(rename = "Default")]
    default: String,
}

impl From<&ProfileSummary> for ProfileRow {
    fn from(p: &ProfileSummary) -> Self {
        Self {
            name: p.name.clone(),
            region: p.region.to_string(),
            username: p.username.clone().unwrap_or_default(),
            default: if p.default { "*".into() } else { String::new() },
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        ConfigCommand::Show => {
            let cfg = sharkiq_config::load_config()?;
            let out = output::render_single(
                &global.output,
                &redacted(&cfg)?,
                |_| format_config_redacted(&cfg),
                |_| "config".into(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = sharkiq_config::load_config()?;
            let default = cfg.default_profile.as_deref();
            let profiles: Vec<ProfileSummary> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileSummary {
                    name: name.clone(),
                    region: p.region,
                    username: p.username.clone(),
                    default: Some(name.as_str()) == default,
                })
                .collect();
            let out = output::render_list(
                &global.output,
                &profiles,
                |p| ProfileRow::from(p),
                |p| p.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

/// Interactive wizard: create or replace one profile.
fn init() -> Result<(), CliError> {
    let config_path = sharkiq_config::config_path();
    eprintln!("SharkIQ CLI configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = sharkiq_config::load_config()?;

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let regions = [Region::NorthAmerica, Region::Europe];
    let labels = ["North America", "Europe"];
    let selection = Select::new()
        .with_prompt("Account region")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let username = prompt_required("Account e-mail")?;
    let password = prompt_secret(&profile_name, "password", "Password")?;

    eprintln!("\n   Client credentials for the identity broker and device cloud.\n");
    let client_id = prompt_required("Broker client id")?;
    let app_id = prompt_required("Device cloud app id")?;
    let app_secret = prompt_secret(&profile_name, "app-secret", "App secret")?;
    let redirect_uri = prompt_optional("Redirect URI for browser verification (optional)")?;

    let profile = Profile {
        region: regions[selection],
        username: Some(username),
        password,
        client_id: Some(client_id),
        app_id: Some(app_id),
        app_secret,
        redirect_uri,
        ..Profile::default()
    };

    if cfg.profiles.insert(profile_name.clone(), profile).is_some() {
        eprintln!("\n   Replaced existing profile '{profile_name}'");
    }
    if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(profile_name.clone());
    }

    sharkiq_config::save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", config_path.display());
    eprintln!("  Profile: {profile_name}");
    eprintln!("\n  Test it: sharkiq login --profile {profile_name}");

    Ok(())
}
