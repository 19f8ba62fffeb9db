//! Group records for shared-curation membership.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{AccountId, GroupId};

/// Group record. Managers are not implicitly members; an account can hold
/// either role or both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub managers: BTreeSet<AccountId>,
    pub members: BTreeSet<AccountId>,
}

impl Group {
    pub fn is_manager(&self, account_id: &AccountId) -> bool {
        self.managers.contains(account_id)
    }

    pub fn is_member(&self, account_id: &AccountId) -> bool {
        self.members.contains(account_id)
    }

    pub fn belongs(&self, account_id: &AccountId) -> bool {
        self.is_manager(account_id) || self.is_member(account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_group_roles() {
        let manager = AccountId(Uuid::new_v4());
        let member = AccountId(Uuid::new_v4());
        let outsider = AccountId(Uuid::new_v4());

        let group = Group {
            id: GroupId(Uuid::new_v4()),
            name: "lab".to_string(),
            managers: [manager.clone()].into_iter().collect(),
            members: [member.clone()].into_iter().collect(),
        };

        assert!(group.is_manager(&manager));
        assert!(!group.is_manager(&member));
        assert!(group.belongs(&member));
        assert!(!group.belongs(&outsider));
    }
}
