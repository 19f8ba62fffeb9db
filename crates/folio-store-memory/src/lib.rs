//! In-memory implementation of the folio storage traits.
//!
//! This backend keeps every record in process-local maps. It is the
//! reference backend for the account engine and its tests: persistence
//! technology is a deployment concern, not part of the engine's contract.
//!
//! Atomicity: operations that consume single-use tokens
//! (`take_pending_verification`, `take_action_token`) re-check and remove
//! the token under the account's map-entry lock, so concurrent consumers
//! have exactly one winner.

use std::collections::BTreeMap;

use dashmap::DashMap;

use folio_storage::*;

/// Process-local store backend.
#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<AccountId, Account>,
    /// address → confirmed email record.
    emails: DashMap<String, ConfirmedEmail>,
    contributors: DashMap<ResourceId, BTreeMap<AccountId, Contributor>>,
    preprint_contributors: DashMap<PreprintId, BTreeMap<AccountId, Contributor>>,
    resources: DashMap<ResourceId, Resource>,
    preprints: DashMap<PreprintId, Preprint>,
    collections: DashMap<CollectionId, Collection>,
    files: DashMap<FileId, QuickFile>,
    groups: DashMap<GroupId, Group>,
    institutions: DashMap<InstitutionId, Institution>,
    /// (account, provider) → integration settings.
    integrations: DashMap<(AccountId, String), Integration>,
    sessions: DashMap<SessionId, Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        if self.accounts.contains_key(&account.id) {
            return Err(StoreError::AlreadyExists);
        }
        if self
            .accounts
            .iter()
            .any(|entry| entry.username == account.username)
        {
            return Err(StoreError::AlreadyExists);
        }
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        match self.accounts.get_mut(&account.id) {
            Some(mut entry) => {
                *entry = account.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn get_account(&self, id: &AccountId) -> Result<Account, StoreError> {
        self.accounts
            .get(id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<Account, StoreError> {
        self.accounts
            .iter()
            .find(|entry| entry.username == username)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_username_or_email(&self, needle: &str) -> Result<Account, StoreError> {
        if let Some(entry) = self.accounts.iter().find(|entry| entry.username == needle) {
            return Ok(entry.clone());
        }
        let owner = self
            .emails
            .get(needle)
            .map(|entry| entry.account_id.clone())
            .ok_or(StoreError::NotFound)?;
        self.get_account(&owner).await
    }

    async fn find_by_verified_identity(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Account, StoreError> {
        self.accounts
            .iter()
            .find(|entry| {
                entry
                    .external_identities
                    .get(provider)
                    .and_then(|ids| ids.get(external_id))
                    .is_some_and(|status| *status == IdentityStatus::Verified)
            })
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn take_pending_verification(
        &self,
        id: &AccountId,
        token: &str,
    ) -> Result<PendingEmail, StoreError> {
        let mut entry = self.accounts.get_mut(id).ok_or(StoreError::NotFound)?;
        entry
            .email_verifications
            .remove(token)
            .ok_or(StoreError::NotFound)
    }

    async fn take_action_token(
        &self,
        id: &AccountId,
        token: &str,
    ) -> Result<ActionToken, StoreError> {
        let mut entry = self.accounts.get_mut(id).ok_or(StoreError::NotFound)?;
        match entry.action_token.clone() {
            Some(current) if current.token == token => {
                entry.action_token = None;
                Ok(current)
            }
            _ => Err(StoreError::NotFound),
        }
    }
}

#[async_trait::async_trait]
impl EmailStore for MemoryStore {
    async fn add_confirmed_email(&self, email: &ConfirmedEmail) -> Result<(), StoreError> {
        if self.emails.contains_key(&email.address) {
            return Err(StoreError::AlreadyExists);
        }
        self.emails.insert(email.address.clone(), email.clone());
        Ok(())
    }

    async fn remove_confirmed_email(&self, address: &str) -> Result<(), StoreError> {
        self.emails
            .remove(address)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn find_confirmed_email(&self, address: &str) -> Result<ConfirmedEmail, StoreError> {
        self.emails
            .get(address)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn emails_for_account(&self, id: &AccountId) -> Result<Vec<ConfirmedEmail>, StoreError> {
        Ok(self
            .emails
            .iter()
            .filter(|entry| &entry.account_id == id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn transfer_emails(
        &self,
        source: &AccountId,
        target: &AccountId,
    ) -> Result<usize, StoreError> {
        let mut moved = 0;
        for mut entry in self.emails.iter_mut() {
            if &entry.account_id == source {
                entry.account_id = target.clone();
                moved += 1;
            }
        }
        Ok(moved)
    }
}

#[async_trait::async_trait]
impl ContributorStore for MemoryStore {
    async fn contributors_for_resource(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<Contributor>, StoreError> {
        Ok(self
            .contributors
            .get(resource_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn resources_contributed_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<ResourceId>, StoreError> {
        Ok(self
            .contributors
            .iter()
            .filter(|entry| entry.value().contains_key(account_id))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn get_contributor(
        &self,
        resource_id: &ResourceId,
        account_id: &AccountId,
    ) -> Result<Contributor, StoreError> {
        self.contributors
            .get(resource_id)
            .and_then(|rows| rows.get(account_id).cloned())
            .ok_or(StoreError::NotFound)
    }

    async fn upsert_contributor(
        &self,
        resource_id: &ResourceId,
        row: &Contributor,
    ) -> Result<(), StoreError> {
        self.contributors
            .entry(resource_id.clone())
            .or_default()
            .insert(row.account_id.clone(), row.clone());
        Ok(())
    }

    async fn remove_contributor(
        &self,
        resource_id: &ResourceId,
        account_id: &AccountId,
    ) -> Result<(), StoreError> {
        self.contributors
            .get_mut(resource_id)
            .and_then(|mut rows| rows.remove(account_id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn contributors_for_preprint(
        &self,
        preprint_id: &PreprintId,
    ) -> Result<Vec<Contributor>, StoreError> {
        Ok(self
            .preprint_contributors
            .get(preprint_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn preprints_contributed_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<PreprintId>, StoreError> {
        Ok(self
            .preprint_contributors
            .iter()
            .filter(|entry| entry.value().contains_key(account_id))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn get_preprint_contributor(
        &self,
        preprint_id: &PreprintId,
        account_id: &AccountId,
    ) -> Result<Contributor, StoreError> {
        self.preprint_contributors
            .get(preprint_id)
            .and_then(|rows| rows.get(account_id).cloned())
            .ok_or(StoreError::NotFound)
    }

    async fn upsert_preprint_contributor(
        &self,
        preprint_id: &PreprintId,
        row: &Contributor,
    ) -> Result<(), StoreError> {
        self.preprint_contributors
            .entry(preprint_id.clone())
            .or_default()
            .insert(row.account_id.clone(), row.clone());
        Ok(())
    }

    async fn remove_preprint_contributor(
        &self,
        preprint_id: &PreprintId,
        account_id: &AccountId,
    ) -> Result<(), StoreError> {
        self.preprint_contributors
            .get_mut(preprint_id)
            .and_then(|mut rows| rows.remove(account_id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait::async_trait]
impl ResourceStore for MemoryStore {
    async fn get_resource(&self, id: &ResourceId) -> Result<Resource, StoreError> {
        self.resources
            .get(id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn save_resource(&self, resource: &Resource) -> Result<(), StoreError> {
        self.resources.insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn resources_created_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Resource>, StoreError> {
        Ok(self
            .resources
            .iter()
            .filter(|entry| &entry.creator == account_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn get_preprint(&self, id: &PreprintId) -> Result<Preprint, StoreError> {
        self.preprints
            .get(id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn save_preprint(&self, preprint: &Preprint) -> Result<(), StoreError> {
        self.preprints.insert(preprint.id.clone(), preprint.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl CollectionStore for MemoryStore {
    async fn collections_owned_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Collection>, StoreError> {
        Ok(self
            .collections
            .iter()
            .filter(|entry| &entry.owner == account_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn save_collection(&self, collection: &Collection) -> Result<(), StoreError> {
        self.collections
            .insert(collection.id.clone(), collection.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl FileStore for MemoryStore {
    async fn quick_files_for(&self, owner: &AccountId) -> Result<Vec<QuickFile>, StoreError> {
        Ok(self
            .files
            .iter()
            .filter(|entry| &entry.owner == owner)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn save_quick_file(&self, file: &QuickFile) -> Result<(), StoreError> {
        self.files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    async fn files_checked_out_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<QuickFile>, StoreError> {
        Ok(self
            .files
            .iter()
            .filter(|entry| entry.checked_out_by.as_ref() == Some(account_id))
            .map(|entry| entry.clone())
            .collect())
    }
}

#[async_trait::async_trait]
impl GroupStore for MemoryStore {
    async fn groups_for(&self, account_id: &AccountId) -> Result<Vec<Group>, StoreError> {
        Ok(self
            .groups
            .iter()
            .filter(|entry| entry.belongs(account_id))
            .map(|entry| entry.clone())
            .collect())
    }

    async fn get_group(&self, id: &GroupId) -> Result<Group, StoreError> {
        self.groups
            .get(id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn save_group(&self, group: &Group) -> Result<(), StoreError> {
        self.groups.insert(group.id.clone(), group.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl InstitutionStore for MemoryStore {
    async fn get_institution(&self, id: &InstitutionId) -> Result<Institution, StoreError> {
        self.institutions
            .get(id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn find_institution_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Institution, StoreError> {
        self.institutions
            .iter()
            .find(|entry| entry.identifier == identifier)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn insert_institution(&self, institution: &Institution) -> Result<(), StoreError> {
        if self.institutions.contains_key(&institution.id) {
            return Err(StoreError::AlreadyExists);
        }
        self.institutions
            .insert(institution.id.clone(), institution.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl IntegrationStore for MemoryStore {
    async fn integrations_for(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Integration>, StoreError> {
        Ok(self
            .integrations
            .iter()
            .filter(|entry| &entry.account_id == account_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn save_integration(&self, integration: &Integration) -> Result<(), StoreError> {
        self.integrations.insert(
            (integration.account_id.clone(), integration.provider.clone()),
            integration.clone(),
        );
        Ok(())
    }

    async fn remove_integration(
        &self,
        account_id: &AccountId,
        provider: &str,
    ) -> Result<(), StoreError> {
        self.integrations
            .remove(&(account_id.clone(), provider.to_string()))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        if self.sessions.contains_key(&session.id) {
            return Err(StoreError::AlreadyExists);
        }
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn sessions_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| &entry.account_id == account_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn revoke_all_for_account(&self, account_id: &AccountId) -> Result<usize, StoreError> {
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| &entry.account_id == account_id)
            .map(|entry| entry.id.clone())
            .collect();
        for id in &ids {
            self.sessions.remove(id);
        }
        Ok(ids.len())
    }
}
