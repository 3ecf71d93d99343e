//! The signing orchestrator.
//!
//! A [`Signer`] composes the collaborators a signing request goes through:
//! account resolution, per-key locking, client access checks, signing rules,
//! account unlocking, and finally the signature itself. Each collaborator is
//! a trait object so that deployments and tests can substitute their own.

mod multisign;

use crate::{
    checker::{Checker, SIGN_OPERATION},
    core::{Credentials, SignItem, SignRequest, SignResponse, Verdict},
    locker::{BoxLocker, KeyGuard, Locker},
    resolver::AccountResolver,
    rules::{RuleEngine, RuleRequest},
    unlocker::Unlocker,
    wallet::{signing_root, Account},
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use thiserror::Error;

type BoxResolver = Box<dyn AccountResolver + Send + Sync + 'static>;
type BoxChecker = Box<dyn Checker + Send + Sync + 'static>;
type BoxRules = Box<dyn RuleEngine + Send + Sync + 'static>;
type BoxUnlocker = Box<dyn Unlocker + Send + Sync + 'static>;

/// Signs requests on behalf of clients, subject to access checks and rules.
pub struct Signer {
    resolver: BoxResolver,
    checker: BoxChecker,
    rules: BoxRules,
    unlocker: BoxUnlocker,
    locker: BoxLocker,
}

/// A builder for [`Signer`]s. Every collaborator is required.
#[derive(Default)]
pub struct Builder {
    resolver: Option<BoxResolver>,
    checker: Option<BoxChecker>,
    rules: Option<BoxRules>,
    unlocker: Option<BoxUnlocker>,
    locker: Option<BoxLocker>,
}

impl Builder {
    pub fn resolver(mut self, resolver: impl AccountResolver + Send + Sync + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn checker(mut self, checker: impl Checker + Send + Sync + 'static) -> Self {
        self.checker = Some(Box::new(checker));
        self
    }

    pub fn rules(mut self, rules: impl RuleEngine + Send + Sync + 'static) -> Self {
        self.rules = Some(Box::new(rules));
        self
    }

    pub fn unlocker(mut self, unlocker: impl Unlocker + Send + Sync + 'static) -> Self {
        self.unlocker = Some(Box::new(unlocker));
        self
    }

    /// Sets the locker. Signers sharing keys across instances must share a
    /// locker, for example through an `Arc`.
    pub fn locker(mut self, locker: impl Locker + Send + Sync + 'static) -> Self {
        self.locker = Some(Box::new(locker));
        self
    }

    pub fn build(self) -> Result<Signer, BuildError> {
        Ok(Signer {
            resolver: self.resolver.ok_or(BuildError::Missing("resolver"))?,
            checker: self.checker.ok_or(BuildError::Missing("checker"))?,
            rules: self.rules.ok_or(BuildError::Missing("rules"))?,
            unlocker: self.unlocker.ok_or(BuildError::Missing("unlocker"))?,
            locker: self.locker.ok_or(BuildError::Missing("locker"))?,
        })
    }
}

/// A request that passed structural validation and resolved to an account.
struct Checked<'a> {
    index: usize,
    account: Arc<Account>,
    item: &'a SignItem,
}

impl Signer {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Signs a single request.
    ///
    /// This runs the same per-item pipeline as [`Signer::multisign`] for a
    /// batch of one.
    pub fn sign(&self, credentials: Option<&Credentials>, request: &SignRequest) -> SignResponse {
        let Some(credentials) = credentials else {
            tracing::warn!("No credentials supplied");
            return SignResponse::denied();
        };
        let _span = request_span(credentials).entered();

        match self.check_request(0, request) {
            Ok(checked) => self.sign_isolated(credentials, &checked),
            Err(response) => response,
        }
    }

    /// Validates a request and resolves its account.
    fn check_request<'a>(
        &self,
        index: usize,
        request: &'a SignRequest,
    ) -> Result<Checked<'a>, SignResponse> {
        let (item, identity) = match (&request.item, &request.identity) {
            (None, _) => {
                tracing::warn!(index, reason = "missing item", "Check failed");
                return Err(SignResponse::denied());
            }
            (Some(item), _) if item.data.is_empty() => {
                tracing::warn!(index, reason = "missing data", "Check failed");
                return Err(SignResponse::denied());
            }
            (Some(item), _) if item.domain.is_empty() => {
                tracing::warn!(index, reason = "missing domain", "Check failed");
                return Err(SignResponse::denied());
            }
            (Some(_), None) => {
                tracing::warn!(index, reason = "missing account", "Check failed");
                return Err(SignResponse::denied());
            }
            (Some(item), Some(identity)) => (item, identity),
        };

        let Some(account) = self.resolver.resolve(identity) else {
            tracing::warn!(index, %identity, reason = "unknown account", "Check failed");
            return Err(SignResponse::failed());
        };

        Ok(Checked {
            index,
            account,
            item,
        })
    }

    /// Signs a checked request, failing it if a collaborator panics. The key
    /// lock is released while unwinding.
    fn sign_isolated(&self, credentials: &Credentials, checked: &Checked) -> SignResponse {
        panic::catch_unwind(AssertUnwindSafe(|| self.sign_checked(credentials, checked)))
            .unwrap_or_else(|payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("unknown");
                tracing::error!(
                    index = checked.index,
                    account = %checked.account.path(),
                    %reason,
                    "Panicked while signing"
                );
                SignResponse::failed()
            })
    }

    /// Signs a checked request while holding the lock for its account key.
    fn sign_checked(&self, credentials: &Credentials, checked: &Checked) -> SignResponse {
        let index = checked.index;
        let account = checked.account.path();
        let _guard = KeyGuard::acquire(&*self.locker, checked.account.public_key().to_string());

        match self.checker.check(credentials, &account, SIGN_OPERATION) {
            Verdict::Approved => {}
            Verdict::Denied => return SignResponse::denied(),
            Verdict::Failed => {
                tracing::warn!(index, %account, reason = "access check", "Check failed");
                return SignResponse::denied();
            }
        }

        let request = RuleRequest {
            credentials,
            account: &checked.account,
            data: &checked.item.data,
            domain: &checked.item.domain,
        };
        match self.rules.evaluate(&request) {
            Verdict::Approved => {}
            Verdict::Denied => {
                tracing::debug!(index, %account, "Denied by rules");
                return SignResponse::denied();
            }
            Verdict::Failed => {
                tracing::warn!(index, %account, reason = "rules", "Check failed");
                return SignResponse::denied();
            }
        }

        if let Err(err) = self.unlocker.unlock(&checked.account, Some(credentials)) {
            tracing::warn!(index, %account, %err, "Failed to unlock account");
            return SignResponse::failed();
        }

        let root = signing_root(&checked.item.data, &checked.item.domain);
        match checked.account.sign(&root) {
            Ok(signature) => {
                tracing::debug!(index, %account, %signature, "Signed");
                SignResponse::succeeded(signature)
            }
            Err(err) => {
                tracing::warn!(index, %account, %err, "Failed to sign");
                SignResponse::failed()
            }
        }
    }
}

fn request_span(credentials: &Credentials) -> tracing::Span {
    tracing::debug_span!(
        "sign",
        client = %credentials.client,
        request_id = credentials.request_id.as_deref(),
    )
}

/// An error building a signer.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no {0} specified")]
    Missing(&'static str),
}

/// An unexpected error handling a signing call.
///
/// Problems with individual requests are reported through their
/// [`SignResponse`] instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{names} account names and {keys} public keys supplied for {items} items")]
    Misaligned {
        items: usize,
        names: usize,
        keys: usize,
    },
}
