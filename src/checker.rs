//! Client level access checks.

use crate::core::{Credentials, Verdict};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// The operation name checked before signing.
pub const SIGN_OPERATION: &str = "Sign";

/// The operation name matching every operation.
pub const ALL_OPERATIONS: &str = "All";

/// A service deciding whether a client may perform an operation on an
/// account.
pub trait Checker {
    /// Checks an operation on the account with the specified
    /// wallet-qualified name.
    fn check(&self, credentials: &Credentials, account: &str, operation: &str) -> Verdict;
}

/// A permission granted to, or withheld from, a client.
#[derive(Clone, Debug, Deserialize)]
pub struct Permission {
    /// Accounts the permission applies to, `"wallet"` or `"wallet/account"`.
    /// Both parts are regular expressions matched against the whole name.
    pub path: String,

    /// Operation names; a leading `~` denies the operation instead.
    pub operations: Vec<String>,
}

struct Rule {
    wallet: Regex,
    account: Option<Regex>,
    operations: Vec<String>,
}

impl Rule {
    fn compile(permission: &Permission) -> Result<Self, PermissionError> {
        let (wallet, account) = match permission.path.split_once('/') {
            Some((wallet, account)) => (wallet, Some(account)),
            None => (permission.path.as_str(), None),
        };
        if wallet.is_empty() || account == Some("") {
            return Err(PermissionError::InvalidPath(permission.path.clone()));
        }

        Ok(Self {
            wallet: anchored(wallet)?,
            account: account.map(anchored).transpose()?,
            operations: permission.operations.clone(),
        })
    }

    fn applies_to(&self, account: &str) -> bool {
        let (wallet, name) = account.split_once('/').unwrap_or((account, ""));
        self.wallet.is_match(wallet)
            && self
                .account
                .as_ref()
                .map_or(true, |pattern| pattern.is_match(name))
    }
}

fn anchored(pattern: &str) -> Result<Regex, PermissionError> {
    Ok(Regex::new(&format!("^(?:{pattern})$"))?)
}

fn operation_matches(granted: &str, operation: &str) -> bool {
    granted.eq_ignore_ascii_case(ALL_OPERATIONS) || granted.eq_ignore_ascii_case(operation)
}

/// A checker driven by per-client permission lists.
///
/// Permissions are evaluated in order and the first one that applies to the
/// account and names the operation decides. Clients without permissions are
/// denied everything.
pub struct PermissionChecker {
    clients: HashMap<String, Vec<Rule>>,
}

impl PermissionChecker {
    /// Compiles permissions keyed by client name.
    pub fn new(permissions: &HashMap<String, Vec<Permission>>) -> Result<Self, PermissionError> {
        let clients = permissions
            .iter()
            .map(|(client, permissions)| {
                let rules = permissions
                    .iter()
                    .map(Rule::compile)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok::<_, PermissionError>((client.clone(), rules))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { clients })
    }
}

impl Checker for PermissionChecker {
    fn check(&self, credentials: &Credentials, account: &str, operation: &str) -> Verdict {
        let client = credentials.client.as_str();
        let Some(rules) = self.clients.get(client) else {
            tracing::debug!(%client, %account, %operation, "No permissions for client");
            return Verdict::Denied;
        };

        for rule in rules.iter().filter(|rule| rule.applies_to(account)) {
            for granted in &rule.operations {
                match granted.strip_prefix('~') {
                    Some(denied) if operation_matches(denied, operation) => {
                        tracing::debug!(%client, %account, %operation, "Negative permission matched");
                        return Verdict::Denied;
                    }
                    None if operation_matches(granted, operation) => {
                        tracing::trace!(%client, %account, %operation, "Positive permission matched");
                        return Verdict::Approved;
                    }
                    _ => {}
                }
            }
        }

        tracing::debug!(%client, %account, %operation, "No permission matched");
        Verdict::Denied
    }
}

/// An invalid permission.
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("invalid permission path '{0}'")]
    InvalidPath(String),

    #[error("invalid permission pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(permissions: &[(&str, &str, &[&str])]) -> PermissionChecker {
        let mut clients = HashMap::<String, Vec<Permission>>::new();
        for (client, path, operations) in permissions {
            clients
                .entry(client.to_string())
                .or_default()
                .push(Permission {
                    path: path.to_string(),
                    operations: operations.iter().map(|op| op.to_string()).collect(),
                });
        }
        PermissionChecker::new(&clients).unwrap()
    }

    #[test]
    fn grants_matching_operations() {
        let checker = checker(&[("client", "Wallet", &["Sign"])]);
        let credentials = Credentials::new("client");

        assert_eq!(
            checker.check(&credentials, "Wallet/Account", SIGN_OPERATION),
            Verdict::Approved,
        );
        assert_eq!(
            checker.check(&credentials, "Wallet/Account", "Lock"),
            Verdict::Denied,
        );
        assert_eq!(
            checker.check(&credentials, "Other/Account", SIGN_OPERATION),
            Verdict::Denied,
        );
    }

    #[test]
    fn unknown_client() {
        let checker = checker(&[("client", "Wallet", &["All"])]);
        assert_eq!(
            checker.check(&Credentials::new("stranger"), "Wallet/Account", SIGN_OPERATION),
            Verdict::Denied,
        );
    }

    #[test]
    fn account_patterns() {
        let checker = checker(&[("client", "Wallet/Validator [0-9]+", &["All"])]);
        let credentials = Credentials::new("client");

        assert_eq!(
            checker.check(&credentials, "Wallet/Validator 12", SIGN_OPERATION),
            Verdict::Approved,
        );
        assert_eq!(
            checker.check(&credentials, "Wallet/Validator 12 old", SIGN_OPERATION),
            Verdict::Denied,
        );
    }

    #[test]
    fn negative_permission_outranks_later_positive() {
        let checker = checker(&[
            ("client", "Wallet/Cold", &["~All"]),
            ("client", "Wallet", &["All"]),
        ]);
        let credentials = Credentials::new("client");

        assert_eq!(
            checker.check(&credentials, "Wallet/Cold", SIGN_OPERATION),
            Verdict::Denied,
        );
        assert_eq!(
            checker.check(&credentials, "Wallet/Hot", SIGN_OPERATION),
            Verdict::Approved,
        );
    }

    #[test]
    fn invalid_permissions() {
        for path in ["", "/Account", "Wallet/", "Wallet/(unclosed"] {
            let clients = HashMap::from([(
                "client".to_owned(),
                vec![Permission {
                    path: path.to_owned(),
                    operations: vec!["All".to_owned()],
                }],
            )]);
            assert!(PermissionChecker::new(&clients).is_err(), "{path}");
        }
    }
}
