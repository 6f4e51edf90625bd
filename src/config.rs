//! Configuration management for lightning-issues
//!
//! Stores settings in ~/.config/lightning-issues/config.json. The API key
//! never goes in this file: it comes from the environment or the keychain.

use crate::keyring;
use crate::suggest::llm::client::{ClientSettings, GEMINI_BASE_URL};
use crate::suggest::llm::Model;
use crate::util::{preserve_corrupt, write_atomic};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "lightning-issues";
const CONFIG_FILE: &str = "config.json";
const HISTORY_FILE: &str = "history.json";

/// Overrides the directory holding `config.json`.
pub const CONFIG_DIR_ENV: &str = "LIGHTNING_CONFIG_DIR";

/// Environment variables checked for an API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: Model,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Extra attempts after a rate-limited, 5xx or transport failure
    pub max_retries: u32,
    /// Defaults to the platform data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Model::default(),
            api_base_url: GEMINI_BASE_URL.to_string(),
            request_timeout_secs: 120,
            max_retries: 2,
            history_path: None,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
            _ => dirs::config_dir().map(|p| p.join(APP_DIR)),
        }
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                let backup = preserve_corrupt(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %err,
                    "config file was corrupted; loaded defaults"
                );
                Self::default()
            }
        }
    }

    /// Save config to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path().context("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).context("Failed to create config directory")?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!(error = %e, "failed to set config directory permissions");
                }
            }
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        write_atomic(path, &content).context("Failed to write config")
    }

    /// Where the history snapshot lives.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_path
            .clone()
            .or_else(|| dirs::data_dir().map(|p| p.join(APP_DIR).join(HISTORY_FILE)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Client settings for this config and the given key.
    pub fn client_settings(&self, api_key: Option<String>) -> ClientSettings {
        ClientSettings {
            api_key,
            model: self.model,
            base_url: self.api_base_url.clone(),
            timeout: self.request_timeout(),
        }
    }

    /// Get the Gemini API key (from environment or keychain)
    pub fn resolve_api_key() -> Option<String> {
        resolve_api_key_with(|name| std::env::var(name).ok(), || {
            keyring::get_api_key().unwrap_or_else(|err| {
                keyring::warn_keychain_error_once("the API key", &err);
                None
            })
        })
    }

    /// Store the API key in the keychain and confirm it reads back.
    pub fn set_api_key(key: &str) -> anyhow::Result<()> {
        keyring::set_api_key(key).map_err(|err| {
            anyhow::anyhow!(
                "Failed to store API key in system keychain: {}. \
                 You can set the GEMINI_API_KEY environment variable instead.",
                err
            )
        })?;

        match keyring::get_api_key() {
            Ok(Some(stored)) if stored == key => Ok(()),
            Ok(_) => Err(anyhow::anyhow!(
                "API key verification failed: key was not persisted to keychain. \
                 You can set the GEMINI_API_KEY environment variable instead."
            )),
            Err(err) => Err(anyhow::anyhow!(
                "API key verification failed: couldn't read back from keychain ({}). \
                 You can set the GEMINI_API_KEY environment variable instead.",
                err
            )),
        }
    }

    /// Gemini keys from AI Studio start with "AIza"
    pub fn validate_api_key_format(key: &str) -> bool {
        key.starts_with("AIza")
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("~/.config/{}/{}", APP_DIR, CONFIG_FILE))
    }
}

/// First non-blank key from the environment variables, then the keychain.
fn resolve_api_key_with(
    env: impl Fn(&str) -> Option<String>,
    keychain: impl FnOnce() -> Option<String>,
) -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| env(name))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
        .or_else(|| keychain().filter(|key| !key.trim().is_empty()))
}

/// Interactive prompt to set up API key
pub fn setup_api_key_interactive() -> anyhow::Result<String> {
    use std::io::{self, Write};

    println!();
    println!("  GEMINI SETUP");
    println!();
    println!("  lightning uses Google Gemini with web search to study repositories.");
    println!();
    println!("  1. Get an API key at: https://aistudio.google.com/apikey");
    println!("  2. Paste it below (saved in your system keychain)");
    println!();
    print!("  API Key: ");
    io::stdout().flush()?;

    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim().to_string();

    if key.is_empty() {
        anyhow::bail!("No API key provided");
    }

    if !Config::validate_api_key_format(&key) {
        println!();
        println!("  Warning: Key doesn't look like a Gemini key (should start with AIza)");
        println!("     Saving anyway...");
    }

    Config::set_api_key(&key)?;

    println!();
    println!("  + API key saved to the system keychain");
    println!();

    Ok(key)
}
