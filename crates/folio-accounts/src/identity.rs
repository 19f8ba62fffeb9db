//! External-identity linking.
//!
//! Tracks per-provider federated identity claims on an account. A tuple
//! `(provider, external id)` can be VERIFIED on at most one account across
//! the platform; provisional claims (CREATE, LINK) may be superseded.

use std::collections::BTreeMap;
use std::sync::Arc;

use folio_events::AccountEvent;
use folio_storage::{Account, IdentityStatus, Store, StoreError};

use crate::error::IdentityError;

type IdentityMap = BTreeMap<String, BTreeMap<String, IdentityStatus>>;

/// Links federated identities to accounts.
#[derive(Clone)]
pub struct ExternalIdentityLinker {
    store: Arc<dyn Store>,
}

impl ExternalIdentityLinker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fail if another account already holds VERIFIED for the tuple.
    async fn check_not_verified_elsewhere(
        &self,
        account: &Account,
        provider: &str,
        external_id: &str,
    ) -> Result<(), IdentityError> {
        match self
            .store
            .find_by_verified_identity(provider, external_id)
            .await
        {
            Ok(holder) if holder.id != account.id => Err(IdentityError::AlreadyVerifiedElsewhere),
            Ok(_) => Ok(()),
            Err(StoreError::NotFound) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Claim an identity tuple at the intended status. An existing claim is
    /// upgraded through [`promote`](Self::promote) rules; a fresh one is
    /// inserted as supplied. The caller persists the account.
    pub async fn claim(
        &self,
        account: &mut Account,
        provider: &str,
        external_id: &str,
        status: IdentityStatus,
    ) -> Result<Vec<AccountEvent>, IdentityError> {
        self.check_not_verified_elsewhere(account, provider, external_id)
            .await?;

        let existing = account
            .external_identities
            .get(provider)
            .and_then(|ids| ids.get(external_id))
            .copied();

        if let Some(current) = existing {
            if current.rank() > status.rank() {
                return Err(IdentityError::NonMonotonicPromotion {
                    from: current,
                    to: status,
                });
            }
        }

        account
            .external_identities
            .entry(provider.to_string())
            .or_default()
            .insert(external_id.to_string(), status);

        Ok(if status == IdentityStatus::Verified && existing != Some(IdentityStatus::Verified) {
            vec![AccountEvent::IdentityVerified {
                account_id: account.id.clone(),
                provider: provider.to_string(),
                external_id: external_id.to_string(),
            }]
        } else {
            Vec::new()
        })
    }

    /// Upgrade an existing claim. The path is strictly CREATE → LINK →
    /// VERIFIED; equal status is a no-op, downgrades are rejected.
    pub async fn promote(
        &self,
        account: &mut Account,
        provider: &str,
        external_id: &str,
        to: IdentityStatus,
    ) -> Result<Vec<AccountEvent>, IdentityError> {
        let current = account
            .external_identities
            .get(provider)
            .and_then(|ids| ids.get(external_id))
            .copied()
            .ok_or(IdentityError::NotClaimed)?;

        if current.rank() > to.rank() {
            return Err(IdentityError::NonMonotonicPromotion { from: current, to });
        }
        if current == to {
            return Ok(Vec::new());
        }

        if to == IdentityStatus::Verified {
            self.check_not_verified_elsewhere(account, provider, external_id)
                .await?;
        }

        account
            .external_identities
            .entry(provider.to_string())
            .or_default()
            .insert(external_id.to_string(), to);

        Ok(if to == IdentityStatus::Verified {
            vec![AccountEvent::IdentityVerified {
                account_id: account.id.clone(),
                provider: provider.to_string(),
                external_id: external_id.to_string(),
            }]
        } else {
            Vec::new()
        })
    }
}

/// Merge two identity maps: per `(provider, id)` the higher status wins,
/// ties keep the target's value.
pub fn merge_identity_maps(target: &IdentityMap, source: &IdentityMap) -> IdentityMap {
    let mut merged = target.clone();
    for (provider, ids) in source {
        let slot = merged.entry(provider.clone()).or_default();
        for (external_id, status) in ids {
            match slot.get(external_id) {
                Some(existing) if existing.rank() >= status.rank() => {}
                _ => {
                    slot.insert(external_id.clone(), *status);
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_maps_higher_status_wins() {
        let mut target: IdentityMap = BTreeMap::new();
        target
            .entry("orcid".to_string())
            .or_default()
            .insert("0000-1".to_string(), IdentityStatus::Link);

        let mut source: IdentityMap = BTreeMap::new();
        source
            .entry("orcid".to_string())
            .or_default()
            .insert("0000-1".to_string(), IdentityStatus::Verified);
        source
            .entry("github".to_string())
            .or_default()
            .insert("octo".to_string(), IdentityStatus::Create);

        let merged = merge_identity_maps(&target, &source);
        assert_eq!(merged["orcid"]["0000-1"], IdentityStatus::Verified);
        assert_eq!(merged["github"]["octo"], IdentityStatus::Create);
    }

    #[test]
    fn test_merge_maps_tie_keeps_target() {
        let mut target: IdentityMap = BTreeMap::new();
        target
            .entry("orcid".to_string())
            .or_default()
            .insert("0000-1".to_string(), IdentityStatus::Link);

        let source = target.clone();
        let merged = merge_identity_maps(&target, &source);
        assert_eq!(merged["orcid"]["0000-1"], IdentityStatus::Link);
    }
}
