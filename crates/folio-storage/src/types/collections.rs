//! Collection records.

use serde::{Deserialize, Serialize};

use super::{AccountId, CollectionId};

/// A collection owned by an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub owner: AccountId,
    pub title: String,
    /// Each account's personal bookmark collection; never transferred on
    /// merge.
    pub is_bookmark: bool,
}
