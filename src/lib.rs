//! A remote signing service.
//!
//! Clients submit batches of sign requests through a [`Signer`], which
//! resolves each request to a wallet account, checks the client's
//! permissions, evaluates signing rules, unlocks the account and signs.
//! Every request yields its own [`SignResponse`].

pub mod checker;
pub mod config;
pub mod core;
pub mod locker;
pub mod resolver;
pub mod rules;
pub mod serialization;
pub mod signer;
pub mod unlocker;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use crate::{
    config::Config,
    core::{Credentials, Identity, Outcome, SignItem, SignRequest, SignResponse},
    signer::{Builder, Signer},
};
