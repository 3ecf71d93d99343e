//! Account lookup.

use crate::{
    core::Identity,
    wallet::{Account, PublicKey, Wallet},
};
use std::sync::Arc;

/// A service mapping request identities to accounts.
pub trait AccountResolver {
    /// Resolves an identity to an account.
    ///
    /// Returns `None` if no account matches, or if an identity carrying
    /// both a name and a public key refers to two different accounts.
    fn resolve(&self, identity: &Identity) -> Option<Arc<Account>>;
}

/// A resolver over a set of in-memory wallets.
#[derive(Default)]
pub struct WalletResolver {
    wallets: Vec<Wallet>,
}

impl WalletResolver {
    pub fn new(wallets: Vec<Wallet>) -> Self {
        Self { wallets }
    }

    /// Finds an account by its wallet-qualified name, `"wallet/account"`.
    pub fn by_name(&self, name: &str) -> Option<Arc<Account>> {
        let (wallet, account) = name.split_once('/')?;
        self.wallets
            .iter()
            .find(|w| w.name() == wallet)?
            .account(account)
            .cloned()
    }

    /// Finds an account by a SEC1 encoded public key.
    pub fn by_public_key(&self, key: &[u8]) -> Option<Arc<Account>> {
        let key = PublicKey::from_sec1(key).ok()?;
        self.wallets
            .iter()
            .find_map(|wallet| wallet.account_by_public_key(&key))
            .cloned()
    }
}

impl AccountResolver for WalletResolver {
    fn resolve(&self, identity: &Identity) -> Option<Arc<Account>> {
        match identity {
            Identity::Name(name) => self.by_name(name),
            Identity::PublicKey(key) => self.by_public_key(key),
            Identity::Both(name, key) => {
                let account = self.by_name(name)?;
                let other = self.by_public_key(key)?;
                (account.public_key() == other.public_key()).then_some(account)
            }
        }
    }
}
