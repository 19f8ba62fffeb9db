//! The repository traits that backends implement.
//!
//! One trait per entity, so the engine names exactly the persistence surface
//! it touches. A backend implements all of them and is used through the
//! composite [`Store`] supertrait.

use crate::types::*;
use crate::StoreError;

// ───────────────────────────────────── Accounts ────────────────────────────────────────

#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. Fails `AlreadyExists` if the id or username is
    /// taken.
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Persist a full account snapshot. Fails `NotFound` if the account was
    /// never inserted.
    async fn save_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Get account by id.
    async fn get_account(&self, id: &AccountId) -> Result<Account, StoreError>;

    /// Find the account whose username equals `username` (normalized).
    async fn find_by_username(&self, username: &str) -> Result<Account, StoreError>;

    /// Find an account by username or any of its confirmed email addresses.
    async fn find_by_username_or_email(&self, needle: &str) -> Result<Account, StoreError>;

    /// Find the account holding a VERIFIED claim for `(provider, external_id)`.
    async fn find_by_verified_identity(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Account, StoreError>;

    /// Atomically remove and return the pending verification stored under
    /// `token`. The presence re-check and the removal happen in the same
    /// atomic section, so a single-use token has exactly one winner under
    /// concurrent confirmation attempts.
    async fn take_pending_verification(
        &self,
        id: &AccountId,
        token: &str,
    ) -> Result<PendingEmail, StoreError>;

    /// Atomically remove and return the v2 action token if it matches
    /// `token`. Same single-winner contract as
    /// [`take_pending_verification`](Self::take_pending_verification).
    async fn take_action_token(
        &self,
        id: &AccountId,
        token: &str,
    ) -> Result<ActionToken, StoreError>;
}

// ───────────────────────────────────── Confirmed emails ────────────────────────────────

#[async_trait::async_trait]
pub trait EmailStore: Send + Sync {
    /// Record a confirmed email. Fails `AlreadyExists` if any account has
    /// confirmed this address.
    async fn add_confirmed_email(&self, email: &ConfirmedEmail) -> Result<(), StoreError>;

    /// Remove a confirmed email record.
    async fn remove_confirmed_email(&self, address: &str) -> Result<(), StoreError>;

    /// Look up the owner of a confirmed address.
    async fn find_confirmed_email(&self, address: &str) -> Result<ConfirmedEmail, StoreError>;

    /// All confirmed emails of one account.
    async fn emails_for_account(&self, id: &AccountId) -> Result<Vec<ConfirmedEmail>, StoreError>;

    /// Re-point every confirmed email of `source` to `target` (a transfer,
    /// not delete-and-recreate). Returns how many rows moved.
    async fn transfer_emails(
        &self,
        source: &AccountId,
        target: &AccountId,
    ) -> Result<usize, StoreError>;
}

// ───────────────────────────────────── Contributors ────────────────────────────────────

#[async_trait::async_trait]
pub trait ContributorStore: Send + Sync {
    async fn contributors_for_resource(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<Contributor>, StoreError>;

    /// Resources on which the account holds a contributor row.
    async fn resources_contributed_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<ResourceId>, StoreError>;

    async fn get_contributor(
        &self,
        resource_id: &ResourceId,
        account_id: &AccountId,
    ) -> Result<Contributor, StoreError>;

    async fn upsert_contributor(
        &self,
        resource_id: &ResourceId,
        row: &Contributor,
    ) -> Result<(), StoreError>;

    async fn remove_contributor(
        &self,
        resource_id: &ResourceId,
        account_id: &AccountId,
    ) -> Result<(), StoreError>;

    // Preprint contributorship is a distinct permission scope with the same
    // row shape.

    async fn contributors_for_preprint(
        &self,
        preprint_id: &PreprintId,
    ) -> Result<Vec<Contributor>, StoreError>;

    async fn preprints_contributed_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<PreprintId>, StoreError>;

    async fn get_preprint_contributor(
        &self,
        preprint_id: &PreprintId,
        account_id: &AccountId,
    ) -> Result<Contributor, StoreError>;

    async fn upsert_preprint_contributor(
        &self,
        preprint_id: &PreprintId,
        row: &Contributor,
    ) -> Result<(), StoreError>;

    async fn remove_preprint_contributor(
        &self,
        preprint_id: &PreprintId,
        account_id: &AccountId,
    ) -> Result<(), StoreError>;
}

// ───────────────────────────────────── Resources ───────────────────────────────────────

#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_resource(&self, id: &ResourceId) -> Result<Resource, StoreError>;

    async fn save_resource(&self, resource: &Resource) -> Result<(), StoreError>;

    async fn resources_created_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Resource>, StoreError>;

    async fn get_preprint(&self, id: &PreprintId) -> Result<Preprint, StoreError>;

    async fn save_preprint(&self, preprint: &Preprint) -> Result<(), StoreError>;
}

// ───────────────────────────────────── Collections ─────────────────────────────────────

#[async_trait::async_trait]
pub trait CollectionStore: Send + Sync {
    async fn collections_owned_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Collection>, StoreError>;

    async fn save_collection(&self, collection: &Collection) -> Result<(), StoreError>;
}

// ───────────────────────────────────── Quick files ─────────────────────────────────────

#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    /// Files in the account's quick-files container.
    async fn quick_files_for(&self, owner: &AccountId) -> Result<Vec<QuickFile>, StoreError>;

    async fn save_quick_file(&self, file: &QuickFile) -> Result<(), StoreError>;

    /// Files anywhere whose checked-out lock is held by the account.
    async fn files_checked_out_by(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<QuickFile>, StoreError>;
}

// ───────────────────────────────────── Groups ──────────────────────────────────────────

#[async_trait::async_trait]
pub trait GroupStore: Send + Sync {
    /// Groups the account manages or belongs to.
    async fn groups_for(&self, account_id: &AccountId) -> Result<Vec<Group>, StoreError>;

    async fn get_group(&self, id: &GroupId) -> Result<Group, StoreError>;

    async fn save_group(&self, group: &Group) -> Result<(), StoreError>;
}

// ───────────────────────────────────── Institutions ────────────────────────────────────

#[async_trait::async_trait]
pub trait InstitutionStore: Send + Sync {
    async fn get_institution(&self, id: &InstitutionId) -> Result<Institution, StoreError>;

    /// Find an institution by its SSO entity identifier.
    async fn find_institution_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Institution, StoreError>;

    async fn insert_institution(&self, institution: &Institution) -> Result<(), StoreError>;
}

// ───────────────────────────────────── Integrations ────────────────────────────────────

#[async_trait::async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn integrations_for(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Integration>, StoreError>;

    async fn save_integration(&self, integration: &Integration) -> Result<(), StoreError>;

    async fn remove_integration(
        &self,
        account_id: &AccountId,
        provider: &str,
    ) -> Result<(), StoreError>;
}

// ───────────────────────────────────── Sessions ────────────────────────────────────────

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn sessions_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Session>, StoreError>;

    /// Revoke every live session of the account. Returns how many were
    /// revoked.
    async fn revoke_all_for_account(&self, account_id: &AccountId) -> Result<usize, StoreError>;
}

// ───────────────────────────────────── Composite ───────────────────────────────────────

/// The full persistence surface the account engine depends on.
pub trait Store:
    AccountStore
    + EmailStore
    + ContributorStore
    + ResourceStore
    + CollectionStore
    + FileStore
    + GroupStore
    + InstitutionStore
    + IntegrationStore
    + SessionStore
{
}

impl<T> Store for T where
    T: AccountStore
        + EmailStore
        + ContributorStore
        + ResourceStore
        + CollectionStore
        + FileStore
        + GroupStore
        + InstitutionStore
        + IntegrationStore
        + SessionStore
{
}
