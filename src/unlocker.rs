//! Account unlocking.

use crate::{core::Credentials, wallet::Account};
use thiserror::Error;
use zeroize::Zeroizing;

/// A service making account keys available for signing.
pub trait Unlocker {
    /// Unlocks an account, returning early if it is already unlocked.
    fn unlock(&self, account: &Account, credentials: Option<&Credentials>)
        -> Result<(), UnlockError>;
}

/// An unlocker trying a configured list of account passphrases.
#[derive(Default)]
pub struct LocalUnlocker {
    passphrases: Vec<Zeroizing<String>>,
}

impl LocalUnlocker {
    pub fn new<I, S>(passphrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passphrases: passphrases
                .into_iter()
                .map(|passphrase| Zeroizing::new(passphrase.into()))
                .collect(),
        }
    }
}

impl Unlocker for LocalUnlocker {
    fn unlock(&self, account: &Account, _: Option<&Credentials>) -> Result<(), UnlockError> {
        if account.is_unlocked() {
            return Ok(());
        }
        for passphrase in &self.passphrases {
            if account.unlock(passphrase.as_bytes()).is_ok() {
                tracing::trace!(account = %account.path(), "unlocked account");
                return Ok(());
            }
        }
        Err(UnlockError::NoPassphrase(account.path()))
    }
}

/// An error unlocking an account.
#[derive(Debug, Error)]
pub enum UnlockError {
    #[error("no known passphrase unlocks account {0}")]
    NoPassphrase(String),

    #[error("{0}")]
    Other(String),
}
