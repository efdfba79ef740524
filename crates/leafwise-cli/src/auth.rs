//! Per-profile identity, with sessions kept in the OS keychain.

use leafwise_core::auth::{AuthSession, SessionVault, SupabaseIdentity};
use leafwise_core::{ClientConfig, Error, Result};

#[cfg(not(test))]
const KEYCHAIN_SERVICE: &str = "leafwise-cli";

pub type ProfileIdentity = SupabaseIdentity<KeychainVault>;

/// Identity for `profile_name`, or `None` when the profile has no Supabase project.
pub fn profile_identity(profile_name: &str, config: &ClientConfig) -> Result<Option<ProfileIdentity>> {
    config
        .rest_config()?
        .map(|backend| SupabaseIdentity::new(&backend, KeychainVault::for_profile(profile_name)))
        .transpose()
}

/// One keychain entry per profile
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeychainVault {
    account: String,
}

impl KeychainVault {
    pub fn for_profile(profile_name: &str) -> Self {
        Self {
            account: format!("session:{profile_name}"),
        }
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYCHAIN_SERVICE, &self.account).map_err(keychain_error)
    }
}

#[cfg(not(test))]
fn keychain_error(error: keyring::Error) -> Error {
    Error::Io(std::io::Error::other(format!("keychain: {error}")))
}

#[cfg(not(test))]
impl SessionVault for KeychainVault {
    fn load(&self) -> Result<Option<AuthSession>> {
        match self.entry()?.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(keychain_error(error)),
        }
    }

    fn store(&self, session: &AuthSession) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?.set_password(&raw).map_err(keychain_error)
    }

    fn erase(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(keychain_error(error)),
        }
    }
}

/// Tests never touch the real keychain.
#[cfg(test)]
mod fake_keychain {
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock, PoisonError};

    use super::{AuthSession, KeychainVault, Result, SessionVault};

    fn entries() -> std::sync::MutexGuard<'static, HashMap<String, AuthSession>> {
        static ENTRIES: OnceLock<Mutex<HashMap<String, AuthSession>>> = OnceLock::new();
        ENTRIES
            .get_or_init(Mutex::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    impl SessionVault for KeychainVault {
        fn load(&self) -> Result<Option<AuthSession>> {
            Ok(entries().get(&self.account).cloned())
        }

        fn store(&self, session: &AuthSession) -> Result<()> {
            entries().insert(self.account.clone(), session.clone());
            Ok(())
        }

        fn erase(&self) -> Result<()> {
            entries().remove(&self.account);
            Ok(())
        }
    }
}
