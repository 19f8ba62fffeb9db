//! Attached integration (addon) settings.
//!
//! Integrations are value objects attached to an account and selected by
//! provider key; they expose a mergeability capability instead of being a
//! class hierarchy.

use serde::{Deserialize, Serialize};

use super::AccountId;

/// Per-account settings for one integration provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub account_id: AccountId,
    /// Provider key, e.g. "github" or "s3".
    pub provider: String,
    /// Whether the provider supports consolidating two accounts' settings.
    /// A non-consolidatable integration on the merge source aborts the
    /// merge.
    pub can_be_merged: bool,
    pub settings: serde_json::Value,
}
