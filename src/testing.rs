//! Test fixtures and doubles.

use crate::{
    checker::{Permission, PermissionChecker},
    core::{Credentials, SignItem, Verdict},
    locker::{Locker, TableLocker},
    resolver::WalletResolver,
    rules::{RuleEngine, RuleRequest},
    signer::{Builder, Signer},
    unlocker::{LocalUnlocker, UnlockError, Unlocker},
    wallet::{Account, KdfParams, PublicKey, Wallet},
};
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};
use tracing::{
    field::{Field, Visit},
    Event, Subscriber,
};
use tracing_subscriber::{
    layer::{Context, SubscriberExt as _},
    Layer,
};

pub const WALLET: &str = "Test wallet";
pub const ACCOUNT_1: &str = "Test wallet/Test account 1";
pub const ACCOUNT_2: &str = "Test wallet/Test account 2";
pub const DENIED_CLIENT: &str = "Deny this client";

/// Cheap key derivation so tests don't spend their time in Argon2.
pub const FAST_KDF: KdfParams = KdfParams {
    memory_cost: 64,
    time_cost: 1,
    parallelism: 1,
};

/// An empty wallet using [`FAST_KDF`].
pub fn wallet(name: &str) -> Wallet {
    Wallet::with_kdf(name, FAST_KDF)
}

/// Messages of the log events recorded while running a closure.
#[derive(Debug, Default)]
pub struct Logs(Vec<String>);

impl Logs {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn count(&self, message: &str) -> usize {
        self.0.iter().filter(|entry| *entry == message).count()
    }

    #[track_caller]
    pub fn assert_has_entry(&self, message: &str) {
        assert!(
            self.count(message) > 0,
            "missing log entry '{message}' in {:?}",
            self.0
        );
    }
}

struct CaptureLayer(Arc<Mutex<Vec<String>>>);

struct MessageVisitor(Option<String>);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        let mut visitor = MessageVisitor(None);
        event.record(&mut visitor);
        if let Some(message) = visitor.0 {
            self.0.lock().unwrap().push(message);
        }
    }
}

/// Runs a closure, capturing log events emitted on the current thread.
pub fn capture<T>(f: impl FnOnce() -> T) -> (T, Logs) {
    let entries = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(CaptureLayer(entries.clone()));
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = Logs(entries.lock().unwrap().clone());
    (result, logs)
}

/// Records a `("sign", client)` step whenever a signature is produced.
struct SignatureLayer {
    steps: Steps,
    client: String,
}

impl<S> Layer<S> for SignatureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        let mut visitor = MessageVisitor(None);
        event.record(&mut visitor);
        if visitor.0.as_deref() == Some("Signed") {
            self.steps
                .lock()
                .unwrap()
                .push(("sign", self.client.clone()));
        }
    }
}

/// Runs a closure on behalf of a client, recording its signatures as steps.
pub fn record_signatures<T>(steps: &Steps, client: &str, f: impl FnOnce() -> T) -> T {
    let subscriber = tracing_subscriber::registry().with(SignatureLayer {
        steps: steps.clone(),
        client: client.to_owned(),
    });
    tracing::subscriber::with_default(subscriber, f)
}

/// A rule engine with a fixed verdict.
pub struct FixedRules(pub Verdict);

impl RuleEngine for FixedRules {
    fn evaluate(&self, _: &RuleRequest) -> Verdict {
        self.0
    }
}

/// A two-account wallet where only the first account's passphrase is known
/// to the unlocker.
pub struct Fixture {
    pub resolver: WalletResolver,
    pub account_1: Arc<Account>,
    pub account_2: Arc<Account>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut wallet = wallet(WALLET);
        let account_1 = wallet
            .import_account("Test account 1", &[0x11; 32], b"Test account 1 passphrase")
            .unwrap();
        let account_2 = wallet
            .import_account("Test account 2", &[0x22; 32], b"Test account 2 passphrase")
            .unwrap();
        Self {
            resolver: WalletResolver::new(vec![wallet]),
            account_1,
            account_2,
        }
    }

    /// A builder with every collaborator set to a permissive default.
    pub fn builder(self) -> Builder {
        Signer::builder()
            .resolver(self.resolver)
            .checker(checker())
            .rules(FixedRules(Verdict::Approved))
            .unlocker(LocalUnlocker::new(["Test account 1 passphrase"]))
            .locker(TableLocker::new())
    }

    pub fn signer(self) -> Signer {
        self.builder().build().unwrap()
    }
}

/// A checker allowing every client everything on the test wallet, except
/// for the denied client.
pub fn checker() -> PermissionChecker {
    let permission = |operation: &str| Permission {
        path: WALLET.to_owned(),
        operations: vec![operation.to_owned()],
    };
    PermissionChecker::new(&HashMap::from([
        ("client1".to_owned(), vec![permission("All")]),
        ("client2".to_owned(), vec![permission("All")]),
        (DENIED_CLIENT.to_owned(), vec![permission("~All")]),
    ]))
    .unwrap()
}

pub fn credentials() -> Credentials {
    Credentials::new("client1")
}

pub fn item() -> SignItem {
    SignItem {
        data: vec![0x01; 32],
        domain: vec![0x02; 32],
    }
}

/// A locker counting acquisitions and releases per key.
#[derive(Default)]
pub struct CountingLocker {
    inner: TableLocker,
    counts: Mutex<HashMap<String, (usize, usize)>>,
}

impl CountingLocker {
    /// Returns the number of acquisitions and releases of a key.
    pub fn counts(&self, key: &PublicKey) -> (usize, usize) {
        self.counts
            .lock()
            .unwrap()
            .get(&key.to_string())
            .copied()
            .unwrap_or_default()
    }
}

impl Locker for CountingLocker {
    fn acquire(&self, key: &str) {
        self.inner.acquire(key);
        self.counts.lock().unwrap().entry(key.to_owned()).or_default().0 += 1;
    }

    fn release(&self, key: &str) {
        self.counts.lock().unwrap().entry(key.to_owned()).or_default().1 += 1;
        self.inner.release(key);
    }
}

/// A shared log of pipeline steps.
pub type Steps = Arc<Mutex<Vec<(&'static str, String)>>>;

/// Rules approving everything after recording the evaluation and pausing.
pub struct RecordingRules(pub Steps);

impl RuleEngine for RecordingRules {
    fn evaluate(&self, request: &RuleRequest) -> Verdict {
        self.0
            .lock()
            .unwrap()
            .push(("start", request.credentials.client.clone()));
        thread::sleep(Duration::from_millis(20));
        Verdict::Approved
    }
}

/// An unlocker recording each call before delegating.
pub struct RecordingUnlocker<U>(pub Steps, pub U);

impl<U> Unlocker for RecordingUnlocker<U>
where
    U: Unlocker,
{
    fn unlock(
        &self,
        account: &Account,
        credentials: Option<&Credentials>,
    ) -> Result<(), UnlockError> {
        let client = credentials.map(|c| c.client.clone()).unwrap_or_default();
        self.0.lock().unwrap().push(("unlock", client));
        self.1.unlock(account, credentials)
    }
}

/// Rules that panic when evaluated for one account and approve the others.
pub struct PanickingRules(pub &'static str);

impl RuleEngine for PanickingRules {
    fn evaluate(&self, request: &RuleRequest) -> Verdict {
        if request.account.path() == self.0 {
            panic!("rules exploded for {}", self.0);
        }
        Verdict::Approved
    }
}

/// An unlocker that always fails.
pub struct BrokenUnlocker;

impl Unlocker for BrokenUnlocker {
    fn unlock(&self, account: &Account, _: Option<&Credentials>) -> Result<(), UnlockError> {
        Err(UnlockError::Other(format!("keystore for {} unavailable", account.path())))
    }
}
