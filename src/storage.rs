//! Secure credential storage using the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the kernel keyring. Holds the bearer token and the backend
//! base URL; everything else lives in the SQLite settings table.

use keyring::Entry;
use tracing::warn;

const SERVICE_NAME: &str = "tiendita-terminal";

// Credential keys
pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_BASE_URL: &str = "api_base_url";

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// The terminal is configured once it knows where the backend lives.
pub fn is_configured() -> bool {
    get_credential(KEY_BASE_URL).is_some()
}

pub fn get_token() -> Option<String> {
    get_credential(KEY_AUTH_TOKEN)
}

pub fn set_token(token: &str) -> Result<(), String> {
    set_credential(KEY_AUTH_TOKEN, token)
}

pub fn delete_token() -> Result<(), String> {
    delete_credential(KEY_AUTH_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn credential_round_trip() {
        let key = "test_credential_round_trip";
        set_credential(key, "secret-value").expect("store credential");
        assert_eq!(get_credential(key).as_deref(), Some("secret-value"));
        delete_credential(key).expect("delete credential");
        assert_eq!(get_credential(key), None);
    }

    #[test]
    #[serial]
    fn deleting_a_missing_credential_is_fine() {
        delete_credential("test_never_stored").expect("missing entry is not an error");
    }
}
