//! Signer configuration.

use crate::{
    checker::{Permission, PermissionChecker},
    locker::{Locker, TableLocker},
    resolver::WalletResolver,
    rules::lua::LuaRules,
    serialization,
    signer::Signer,
    unlocker::LocalUnlocker,
    wallet::{Keystore, PublicKey, Wallet},
};
use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

/// Configuration for a [`Signer`], read from TOML.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The wallets holding the signing accounts.
    #[serde(default)]
    pub wallets: Vec<WalletConfig>,

    /// Passphrases tried when unlocking accounts.
    #[serde(default)]
    pub account_passphrases: Vec<String>,

    /// Permissions by client name.
    #[serde(default)]
    pub permissions: HashMap<String, Vec<Permission>>,

    /// Path to the Lua module defining the signing rules.
    pub rules: PathBuf,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalletConfig {
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub name: String,
    #[serde(with = "serialization::bytes")]
    pub public_key: Vec<u8>,
    pub keystore: Keystore,
}

impl Config {
    /// Reads a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let src = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&src).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(src: &str) -> Result<Self> {
        Ok(toml::from_str(src)?)
    }

    /// Builds the configured wallets. Accounts start out locked.
    pub fn wallets(&self) -> Result<Vec<Wallet>> {
        self.wallets
            .iter()
            .map(|config| {
                let mut wallet = Wallet::new(&config.name);
                for account in &config.accounts {
                    let public_key = PublicKey::from_sec1(&account.public_key).with_context(|| {
                        format!("invalid public key for {}/{}", config.name, account.name)
                    })?;
                    wallet.add_account(&account.name, public_key, account.keystore.clone())?;
                }
                Ok::<_, anyhow::Error>(wallet)
            })
            .collect()
    }

    /// Builds a signer with a locker of its own.
    pub fn signer(&self) -> Result<Signer> {
        self.signer_with_locker(TableLocker::new())
    }

    /// Builds a signer using the specified locker, for sharing key locks
    /// with other signers.
    pub fn signer_with_locker(
        &self,
        locker: impl Locker + Send + Sync + 'static,
    ) -> Result<Signer> {
        let wallets = self.wallets()?;
        for wallet in &wallets {
            tracing::debug!(
                wallet = wallet.name(),
                accounts = wallet.accounts().len(),
                "loaded wallet"
            );
        }

        let checker = PermissionChecker::new(&self.permissions)?;
        let rules = LuaRules::new(&self.rules)?;
        let signer = Signer::builder()
            .resolver(WalletResolver::new(wallets))
            .checker(checker)
            .rules(rules)
            .unlocker(LocalUnlocker::new(self.account_passphrases.iter().cloned()))
            .locker(locker)
            .build()?;
        Ok(signer)
    }
}
