//! Batch signing.

use super::{request_span, Error, Signer};
use crate::{
    core::{Credentials, Identity, SignItem, SignRequest, SignResponse},
    wallet::PublicKey,
};
use std::collections::{hash_map::Entry, HashMap, HashSet};

impl Signer {
    /// Signs a batch of requests.
    ///
    /// Returns one response per request, in request order, or a single
    /// denial if the batch is empty. Requests are processed one after the
    /// other; each holds the lock for its account key from the access check
    /// until its signature is produced or refused. Two requests in the same
    /// batch resolving to the same key both fail. A request whose pipeline
    /// panics fails without affecting the others.
    pub fn multisign(
        &self,
        credentials: Option<&Credentials>,
        requests: &[SignRequest],
    ) -> Vec<SignResponse> {
        if requests.is_empty() {
            tracing::warn!("Request empty");
            return vec![SignResponse::denied()];
        }
        let Some(credentials) = credentials else {
            for index in 0..requests.len() {
                tracing::warn!(index, "No credentials supplied");
            }
            return vec![SignResponse::denied(); requests.len()];
        };
        let _span = request_span(credentials).entered();

        let mut responses = vec![None; requests.len()];
        let mut checked = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            match self.check_request(index, request) {
                Ok(request) => checked.push(request),
                Err(response) => responses[index] = Some(response),
            }
        }

        let mut seen = HashMap::<PublicKey, usize>::new();
        let mut duplicates = HashSet::new();
        for request in &checked {
            match seen.entry(*request.account.public_key()) {
                Entry::Occupied(first) => {
                    duplicates.insert(*first.get());
                    duplicates.insert(request.index);
                }
                Entry::Vacant(entry) => {
                    entry.insert(request.index);
                }
            }
        }

        for request in &checked {
            let response = if duplicates.contains(&request.index) {
                tracing::warn!(
                    index = request.index,
                    account = %request.account.path(),
                    "Multiple requests for same key"
                );
                SignResponse::failed()
            } else {
                self.sign_isolated(credentials, request)
            };
            responses[request.index] = Some(response);
        }

        responses
            .into_iter()
            .map(|response| response.unwrap_or_else(SignResponse::failed))
            .collect()
    }

    /// Signs a batch given as positionally aligned lists.
    ///
    /// For each item, the account is identified by the account name and
    /// public key at the same position; empty or missing entries count as
    /// absent. Identity lists longer than the item list are an error.
    pub fn multisign_aligned(
        &self,
        credentials: Option<&Credentials>,
        account_names: &[String],
        public_keys: &[Vec<u8>],
        items: &[Option<SignItem>],
    ) -> Result<Vec<SignResponse>, Error> {
        if !items.is_empty() && (account_names.len() > items.len() || public_keys.len() > items.len())
        {
            return Err(Error::Misaligned {
                items: items.len(),
                names: account_names.len(),
                keys: public_keys.len(),
            });
        }

        let requests = items
            .iter()
            .enumerate()
            .map(|(i, item)| SignRequest {
                identity: Identity::from_parts(
                    account_names.get(i).map(String::as_str),
                    public_keys.get(i).map(Vec::as_slice),
                ),
                item: item.clone(),
            })
            .collect::<Vec<_>>();
        Ok(self.multisign(credentials, &requests))
    }
}
