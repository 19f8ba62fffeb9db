//! Quick files: each account's personal, always-public file holding area.

use serde::{Deserialize, Serialize};

use super::{AccountId, FileId};

/// A file in an account's quick-files container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickFile {
    pub id: FileId,
    pub owner: AccountId,
    /// Name within the container; unique per owner.
    pub name: String,
    /// Checked-out lock holder, if any.
    pub checked_out_by: Option<AccountId>,
}
