// Allow dead code: Infrastructure methods for future use
#![allow(dead_code)]

use anyhow::{Context, Result};
use keyring::Entry;

/// Keychain service name for stored passwords
const SERVICE_NAME: &str = "clockin";

/// Thin wrapper over the OS keychain so a saved password can re-login
/// after the session expires.
pub struct CredentialStore;

impl CredentialStore {
    pub fn remember(username: &str, password: &str) -> Result<()> {
        Entry::new(SERVICE_NAME, username)
            .context("Failed to open keyring entry")?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Saved password for a username, if any. Keychain errors are
    /// treated as "nothing saved".
    pub fn lookup(username: &str) -> Option<String> {
        Entry::new(SERVICE_NAME, username)
            .ok()?
            .get_password()
            .ok()
    }

    pub fn forget(username: &str) -> Result<()> {
        Entry::new(SERVICE_NAME, username)
            .context("Failed to open keyring entry")?
            .delete_credential()
            .context("Failed to delete credential from keychain")
    }
}
