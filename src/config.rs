use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::domain::email::ExpirationPolicy;
use crate::mail::api::DEFAULT_API_BASE;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub db_path: Option<String>,
    pub poll_interval_secs: u64,
    /// Policy for `generate` without flags; 0 means never expire.
    pub default_policy_hours: f64,
    /// Terminal emulator used when a notification is clicked, with any
    /// flags it needs before the command, e.g. `"gnome-terminal --"`.
    pub terminal: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            db_path: None,
            poll_interval_secs: 60,
            default_policy_hours: 24.0,
            terminal: None,
        }
    }
}

impl Config {
    pub fn default_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::from_default_hours(self.default_policy_hours)
    }

    pub fn terminal(&self) -> Option<String> {
        std::env::var("MAIL_DISPENSER_TERMINAL")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.terminal.clone())
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("mail_dispenser"))
}

/// A file inside the config dir, creating the dir on first use.
fn config_file(name: &str) -> Result<PathBuf> {
    let dir = config_dir()?;
    fs::create_dir_all(&dir)?;
    Ok(dir.join(name))
}

pub fn config_path() -> Result<PathBuf> {
    config_file("config.toml")
}

pub fn default_db_path() -> Result<PathBuf> {
    config_file("storage.db")
}

pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = Config::default();
        fs::write(&path, toml::to_string_pretty(&cfg)?)?;
        info!("wrote default config to {}", path.display());
        return Ok(cfg);
    }
    let s = fs::read_to_string(path)?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    match &cfg.db_path {
        Some(p) if !p.trim().is_empty() => Ok(PathBuf::from(p)),
        _ => default_db_path(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let cfg: Config = toml::from_str("poll_interval_secs = 15\n").expect("parse");
        assert_eq!(cfg.poll_interval_secs, 15);
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.default_policy(), ExpirationPolicy::Hours(24.0));
    }

    #[test]
    fn zero_default_hours_means_never() {
        let cfg: Config = toml::from_str("default_policy_hours = 0.0\n").expect("parse");
        assert_eq!(cfg.default_policy(), ExpirationPolicy::Never);
    }
}
