//! Fine-grained signing policy.
//!
//! The rule engine is consulted for every item after the client level access
//! check passed, with the resolved account and the data being signed.

pub mod lua;

use crate::{
    core::{Credentials, Verdict},
    wallet::Account,
};

/// A request to sign data with an account, as presented to a rule engine.
#[derive(Clone, Copy, Debug)]
pub struct RuleRequest<'a> {
    pub credentials: &'a Credentials,
    pub account: &'a Account,
    pub data: &'a [u8],
    pub domain: &'a [u8],
}

/// A policy deciding whether a signing request may proceed.
pub trait RuleEngine {
    /// Evaluates a signing request.
    ///
    /// Returns [`Verdict::Failed`] when the policy could not be evaluated.
    fn evaluate(&self, request: &RuleRequest) -> Verdict;
}
