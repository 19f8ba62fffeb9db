//! Per-account mutation locks.
//!
//! Every account mutation runs under the account's lock so concurrent logins
//! never observe a half-applied transition. Merge locks both accounts,
//! always in ascending id order, so two concurrent merges over the same pair
//! cannot deadlock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use folio_storage::AccountId;

/// Lock table keyed by account id.
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: &AccountId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock a single account.
    pub async fn lock(&self, id: &AccountId) -> OwnedMutexGuard<()> {
        self.handle(id).lock_owned().await
    }

    /// Lock a pair of accounts in ascending id order.
    pub async fn lock_pair(
        &self,
        a: &AccountId,
        b: &AccountId,
    ) -> (OwnedMutexGuard<()>, OwnedMutexGuard<()>) {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let first_guard = self.handle(first).lock_owned().await;
        let second_guard = self.handle(second).lock_owned().await;
        (first_guard, second_guard)
    }
}
