//! Request and result types shared by the signer and its collaborators.

use crate::wallet::Signature;
use std::fmt::{self, Display, Formatter};

/// The outcome of a single signing request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Outcome {
    /// A signature was produced.
    Succeeded,

    /// The caller is not allowed to sign, or the request was structurally
    /// absent or malformed.
    Denied,

    /// The request was potentially legitimate but could not be completed.
    Failed,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Succeeded => "succeeded",
            Self::Denied => "denied",
            Self::Failed => "failed",
        })
    }
}

/// A tri-state decision returned by authorization collaborators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    Approved,
    Denied,
    /// The decision could not be evaluated.
    Failed,
}

/// Caller identity.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Credentials {
    /// The client identifier that permissions are keyed on.
    pub client: String,

    /// An optional caller-supplied identifier used to correlate log records.
    pub request_id: Option<String>,
}

impl Credentials {
    /// Creates credentials for the specified client.
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            request_id: None,
        }
    }
}

/// The account a request wants to sign with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Identity {
    /// A wallet-qualified account name, `"wallet/account"`.
    Name(String),

    /// A SEC1 encoded public key, compressed or not.
    PublicKey(Vec<u8>),

    /// Both an account name and a public key; they must refer to the same
    /// account.
    Both(String, Vec<u8>),
}

impl Identity {
    /// Builds an identity from optional positional inputs, where empty
    /// values count as absent.
    pub fn from_parts(name: Option<&str>, public_key: Option<&[u8]>) -> Option<Self> {
        let name = name.filter(|name| !name.is_empty());
        let public_key = public_key.filter(|key| !key.is_empty());
        match (name, public_key) {
            (Some(name), Some(key)) => Some(Self::Both(name.to_owned(), key.to_vec())),
            (Some(name), None) => Some(Self::Name(name.to_owned())),
            (None, Some(key)) => Some(Self::PublicKey(key.to_vec())),
            (None, None) => None,
        }
    }

    /// Returns the account name, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) | Self::Both(name, _) => Some(name),
            Self::PublicKey(_) => None,
        }
    }

    /// Returns the public key, if any.
    pub fn public_key(&self) -> Option<&[u8]> {
        match self {
            Self::PublicKey(key) | Self::Both(_, key) => Some(key),
            Self::Name(_) => None,
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Name(name) | Self::Both(name, _) => f.write_str(name),
            Self::PublicKey(key) => f.write_str(&crate::serialization::to_hex(key)),
        }
    }
}

/// The payload of a signing request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignItem {
    /// Opaque data to sign.
    pub data: Vec<u8>,

    /// The signing domain the data is bound to.
    pub domain: Vec<u8>,
}

/// One entry of a signing batch.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignRequest {
    pub identity: Option<Identity>,
    pub item: Option<SignItem>,
}

impl SignRequest {
    /// Creates a request for the account with the specified name.
    pub fn by_name(name: impl Into<String>, item: SignItem) -> Self {
        Self {
            identity: Some(Identity::Name(name.into())),
            item: Some(item),
        }
    }

    /// Creates a request for the account with the specified public key.
    pub fn by_public_key(key: impl Into<Vec<u8>>, item: SignItem) -> Self {
        Self {
            identity: Some(Identity::PublicKey(key.into())),
            item: Some(item),
        }
    }
}

/// The result for a single request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignResponse {
    pub outcome: Outcome,
    /// Set only when the outcome is [`Outcome::Succeeded`].
    pub signature: Option<Signature>,
}

impl SignResponse {
    pub(crate) fn denied() -> Self {
        Self {
            outcome: Outcome::Denied,
            signature: None,
        }
    }

    pub(crate) fn failed() -> Self {
        Self {
            outcome: Outcome::Failed,
            signature: None,
        }
    }

    pub(crate) fn succeeded(signature: Signature) -> Self {
        Self {
            outcome: Outcome::Succeeded,
            signature: Some(signature),
        }
    }
}

/// Returns the outcomes of a list of responses.
pub fn outcomes(responses: &[SignResponse]) -> Vec<Outcome> {
    responses.iter().map(|response| response.outcome).collect()
}
