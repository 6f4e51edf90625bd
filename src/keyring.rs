//! OS keychain storage for the Gemini API key
//!
//! Credentials live in a single keychain entry as JSON, read once per process
//! and cached.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

const KEYRING_SERVICE: &str = "lightning-issues";
const KEYRING_USERNAME: &str = "default";

/// Set to `1`, `true` or `yes` to never touch the keychain.
pub const DISABLE_KEYRING_ENV: &str = "LIGHTNING_DISABLE_KEYRING";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    gemini_api_key: Option<String>,
}

type KeyringResult<T> = Result<T, String>;

static CREDENTIALS_CACHE: OnceLock<Mutex<Option<StoredCredentials>>> = OnceLock::new();
static KEYRING_ERROR_WARNED: AtomicBool = AtomicBool::new(false);

fn credentials_cache() -> &'static Mutex<Option<StoredCredentials>> {
    CREDENTIALS_CACHE.get_or_init(|| Mutex::new(None))
}

fn flag_enabled(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

pub fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }
    flag_enabled(&std::env::var(DISABLE_KEYRING_ENV).unwrap_or_default())
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

/// Warn about keychain errors only once per process
pub fn warn_keychain_error_once(context: &str, err: &str) {
    if KEYRING_ERROR_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    tracing::warn!(context, error = err, "couldn't access system keychain");
    eprintln!(
        "  Warning: Couldn't access system keychain for {}: {}",
        context, err
    );
    eprintln!("  Tip: Set GEMINI_API_KEY to bypass the keychain.");
}

fn read_credentials_uncached() -> KeyringResult<StoredCredentials> {
    if keyring_disabled() {
        return Ok(StoredCredentials::default());
    }
    let entry = keyring_entry().map_err(|e| e.to_string())?;
    match entry.get_password() {
        Ok(json) => {
            serde_json::from_str(&json).map_err(|e| format!("Failed to parse credentials: {}", e))
        }
        Err(keyring::Error::NoEntry) => Ok(StoredCredentials::default()),
        Err(err) => Err(err.to_string()),
    }
}

fn read_credentials_cached() -> KeyringResult<StoredCredentials> {
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(creds) = guard.as_ref() {
        return Ok(creds.clone());
    }
    let creds = read_credentials_uncached()?;
    *guard = Some(creds.clone());
    Ok(creds)
}

fn write_credentials(creds: &StoredCredentials) -> KeyringResult<()> {
    if keyring_disabled() {
        return Err(format!("keychain access is disabled ({})", DISABLE_KEYRING_ENV));
    }
    let json = serde_json::to_string(creds).map_err(|e| e.to_string())?;
    keyring_entry()
        .and_then(|entry| entry.set_password(&json))
        .map_err(|e| e.to_string())?;

    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(creds.clone());
    Ok(())
}

// ============================================================================
// Public API
// ============================================================================

/// Get the Gemini API key from the keychain
pub fn get_api_key() -> KeyringResult<Option<String>> {
    let creds = read_credentials_cached()?;
    Ok(creds.gemini_api_key.filter(|k| !k.trim().is_empty()))
}

/// Store the Gemini API key in the keychain
pub fn set_api_key(key: &str) -> KeyringResult<()> {
    let mut creds = read_credentials_cached().unwrap_or_default();
    creds.gemini_api_key = Some(key.to_string());
    write_credentials(&creds)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyring_disabled_under_test() {
        assert!(keyring_disabled());
        assert_eq!(get_api_key().unwrap(), None);
    }

    #[test]
    fn test_set_api_key_refused_when_disabled() {
        let err = set_api_key("AIza-test").unwrap_err();
        assert!(err.contains(DISABLE_KEYRING_ENV));
    }

    #[test]
    fn test_flag_values() {
        for on in ["1", "true", "YES", " yes "] {
            assert!(flag_enabled(on), "{}", on);
        }
        for off in ["", "0", "no", "false"] {
            assert!(!flag_enabled(off), "{}", off);
        }
    }

    #[test]
    fn test_stored_credentials_omit_missing_key() {
        let json = serde_json::to_string(&StoredCredentials::default()).unwrap();
        assert_eq!(json, "{}");

        let parsed: StoredCredentials =
            serde_json::from_str(r#"{"gemini_api_key": "AIza-test"}"#).unwrap();
        assert_eq!(parsed.gemini_api_key.as_deref(), Some("AIza-test"));
    }
}
