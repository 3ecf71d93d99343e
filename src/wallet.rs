//! Wallets of accounts whose secp256k1 keys are stored encrypted at rest.

use crate::serialization;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use k256::ecdsa::{signature::hazmat::PrehashVerifier as _, SigningKey, VerifyingKey};
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error;
use zeroize::Zeroizing;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// A compressed SEC1 secp256k1 public key.
///
/// This is the canonical identity of an account: requests referencing an
/// account by public key are normalized to this form before any lookup or
/// comparison.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct PublicKey([u8; 33]);

impl PublicKey {
    /// Parses a compressed or uncompressed SEC1 encoded public key.
    pub fn from_sec1(bytes: &[u8]) -> Result<Self, WalletError> {
        let key = VerifyingKey::from_sec1_bytes(bytes).map_err(|_| WalletError::InvalidPublicKey)?;
        Ok(Self::from_verifying_key(&key))
    }

    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(true);
        let mut bytes = [0; 33];
        bytes.copy_from_slice(point.as_bytes());
        Self(bytes)
    }

    /// Returns the compressed public key bytes.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Verifies a signature over a signing root against this key.
    pub fn verify(&self, root: &[u8; 32], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(&self.0) else {
            return false;
        };
        let Ok(signature) = k256::ecdsa::Signature::from_slice(&signature.0[..64]) else {
            return false;
        };
        key.verify_prehash(root, &signature).is_ok()
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&serialization::to_hex(&self.0))
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

/// A recoverable ECDSA signature, `r || s || v`.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Signature(pub [u8; 65]);

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&serialization::to_hex(&self.0))
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

/// Computes the root that is signed for some data in a signing domain.
///
/// Both inputs are reduced to 32-byte chunks, hashing them if they are any
/// other length, and the root is the SHA-256 hash of the two chunks.
pub fn signing_root(data: &[u8], domain: &[u8]) -> [u8; 32] {
    fn chunk(bytes: &[u8]) -> [u8; 32] {
        match bytes.try_into() {
            Ok(chunk) => chunk,
            Err(_) => Sha256::digest(bytes).into(),
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(chunk(data));
    hasher.update(chunk(domain));
    hasher.finalize().into()
}

/// Argon2id cost parameters for deriving a keystore key from a passphrase.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct KdfParams {
    /// Memory size in KiB.
    pub memory_cost: u32,
    /// Number of passes.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: Params::DEFAULT_M_COST,
            time_cost: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    fn derive_key(
        &self,
        salt: &[u8],
        passphrase: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, WalletError> {
        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|_| WalletError::KeyDerivation)?;

        let mut key = Zeroizing::new([0; KEY_LEN]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(passphrase, salt, &mut key[..])
            .map_err(|_| WalletError::KeyDerivation)?;
        Ok(key)
    }

    fn cipher(&self, salt: &[u8], passphrase: &[u8]) -> Result<Aes256Gcm, WalletError> {
        let key = self.derive_key(salt, passphrase)?;
        Aes256Gcm::new_from_slice(&key[..]).map_err(|_| WalletError::KeyDerivation)
    }
}

/// A passphrase-encrypted secret key.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Keystore {
    /// Key derivation parameters, Argon2id defaults when omitted.
    #[serde(default)]
    pub kdf: KdfParams,
    #[serde(with = "serialization::bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "serialization::bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "serialization::bytes")]
    pub ciphertext: Vec<u8>,
}

impl Keystore {
    /// Encrypts a secret with a passphrase, using a random salt and nonce.
    pub fn encrypt(
        secret: &[u8],
        passphrase: &[u8],
        kdf: KdfParams,
    ) -> Result<Self, WalletError> {
        let mut salt = vec![0; SALT_LEN];
        let mut nonce = vec![0; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let cipher = kdf.cipher(&salt, passphrase)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret)
            .map_err(|_| WalletError::Encryption)?;

        Ok(Self {
            kdf,
            salt,
            nonce,
            ciphertext,
        })
    }

    /// Decrypts the secret, failing if the passphrase is wrong.
    pub fn decrypt(&self, passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>, WalletError> {
        if self.nonce.len() != NONCE_LEN {
            return Err(WalletError::Decryption);
        }
        let cipher = self.kdf.cipher(&self.salt, passphrase)?;
        let secret = cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
            .map_err(|_| WalletError::Decryption)?;
        Ok(Zeroizing::new(secret))
    }
}

/// An account whose key can be unlocked with a passphrase.
pub struct Account {
    wallet: String,
    name: String,
    public_key: PublicKey,
    keystore: Keystore,
    key: Mutex<Option<SigningKey>>,
}

impl Account {
    /// Creates a locked account from its public key and encrypted secret.
    pub fn new(
        wallet: impl Into<String>,
        name: impl Into<String>,
        public_key: PublicKey,
        keystore: Keystore,
    ) -> Self {
        Self {
            wallet: wallet.into(),
            name: name.into(),
            public_key,
            keystore,
            key: Mutex::new(None),
        }
    }

    /// The name of the wallet owning the account.
    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    /// The account name within its wallet.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wallet-qualified account name.
    pub fn path(&self) -> String {
        format!("{}/{}", self.wallet, self.name)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn keystore(&self) -> &Keystore {
        &self.keystore
    }

    /// Returns whether the account key has been decrypted.
    pub fn is_unlocked(&self) -> bool {
        self.key.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Decrypts the account key with a passphrase.
    pub fn unlock(&self, passphrase: &[u8]) -> Result<(), WalletError> {
        let secret = self.keystore.decrypt(passphrase)?;
        let key = SigningKey::from_slice(&secret).map_err(|_| WalletError::InvalidSecretKey)?;
        if PublicKey::from_verifying_key(key.verifying_key()) != self.public_key {
            return Err(WalletError::KeyMismatch);
        }
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = Some(key);
        Ok(())
    }

    /// Drops the decrypted account key.
    pub fn lock(&self) {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Signs a signing root with the unlocked account key.
    pub fn sign(&self, root: &[u8; 32]) -> Result<Signature, WalletError> {
        let key = self.key.lock().unwrap_or_else(PoisonError::into_inner);
        let key = key.as_ref().ok_or(WalletError::Locked)?;
        let (signature, recovery_id) = key.sign_prehash_recoverable(root)?;

        let mut bytes = [0; 65];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(Signature(bytes))
    }
}

impl Debug for Account {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Account")
            .field("wallet", &self.wallet)
            .field("name", &self.name)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// A named collection of accounts.
pub struct Wallet {
    name: String,
    kdf: KdfParams,
    accounts: Vec<Arc<Account>>,
}

impl Wallet {
    /// Creates an empty wallet.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kdf(name, KdfParams::default())
    }

    /// Creates an empty wallet encrypting imported accounts with the
    /// specified key derivation parameters.
    pub fn with_kdf(name: impl Into<String>, kdf: KdfParams) -> Self {
        Self {
            name: name.into(),
            kdf,
            accounts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accounts(&self) -> &[Arc<Account>] {
        &self.accounts
    }

    /// Adds a locked account with an existing keystore.
    pub fn add_account(
        &mut self,
        name: &str,
        public_key: PublicKey,
        keystore: Keystore,
    ) -> Result<Arc<Account>, WalletError> {
        if self.account(name).is_some() {
            return Err(WalletError::DuplicateAccount(name.to_owned()));
        }
        let account = Arc::new(Account::new(&self.name, name, public_key, keystore));
        self.accounts.push(account.clone());
        Ok(account)
    }

    /// Imports a raw secret key as a new account, encrypting it with the
    /// specified passphrase.
    pub fn import_account(
        &mut self,
        name: &str,
        secret: &[u8],
        passphrase: &[u8],
    ) -> Result<Arc<Account>, WalletError> {
        let key = SigningKey::from_slice(secret).map_err(|_| WalletError::InvalidSecretKey)?;
        let public_key = PublicKey::from_verifying_key(key.verifying_key());
        let keystore = Keystore::encrypt(secret, passphrase, self.kdf)?;
        self.add_account(name, public_key, keystore)
    }

    /// Finds an account by its name within the wallet.
    pub fn account(&self, name: &str) -> Option<&Arc<Account>> {
        self.accounts.iter().find(|account| account.name == name)
    }

    /// Finds an account by its public key.
    pub fn account_by_public_key(&self, public_key: &PublicKey) -> Option<&Arc<Account>> {
        self.accounts
            .iter()
            .find(|account| account.public_key == *public_key)
    }
}

/// An error occured in a wallet or account operation.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("keystore encryption failed")]
    Encryption,

    #[error("keystore decryption failed")]
    Decryption,

    #[error("invalid keystore key derivation parameters")]
    KeyDerivation,

    #[error("decrypted key does not match account public key")]
    KeyMismatch,

    #[error("account is locked")]
    Locked,

    #[error("duplicate account {0}")]
    DuplicateAccount(String),

    #[error("signing error: {0}")]
    Signing(#[from] k256::ecdsa::Error),
}
