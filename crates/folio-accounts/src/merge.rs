//! Account consolidation.
//!
//! Merges a source account into a target account without data loss or
//! duplication. The pair of accounts is locked in ascending id order for the
//! duration. Steps already committed before a failing step are not rolled
//! back; callers wrap the merge in a transaction when atomicity is required.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use folio_events::{AccountEvent, EventBus};
use folio_storage::{
    normalize_email, Account, AccountId, Contributor, Integration, Store, StoreError,
};

use crate::collab::publish_events;
use crate::config::EngineConfig;
use crate::error::MergeError;
use crate::identity::merge_identity_maps;
use crate::locks::AccountLocks;

/// Consolidates two accounts into one.
#[derive(Clone)]
pub struct MergeEngine {
    store: Arc<dyn Store>,
    locks: Arc<AccountLocks>,
    events: Option<Arc<dyn EventBus>>,
    config: Arc<EngineConfig>,
}

impl MergeEngine {
    pub fn new(
        store: Arc<dyn Store>,
        locks: Arc<AccountLocks>,
        events: Option<Arc<dyn EventBus>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            locks,
            events,
            config,
        }
    }

    /// Merge `source` into `target`. Re-running a completed merge is a
    /// no-op; merging into a different target than before is rejected.
    pub async fn merge(
        &self,
        source_id: &AccountId,
        target_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccountEvent>, MergeError> {
        if source_id == target_id {
            return Err(MergeError::SelfMerge);
        }

        let _guards = self.locks.lock_pair(source_id, target_id).await;

        let mut source = self.store.get_account(source_id).await?;
        let mut target = self.store.get_account(target_id).await?;

        match &source.merged_into {
            Some(existing) if existing == target_id => return Ok(Vec::new()),
            Some(_) => return Err(MergeError::AlreadyMergedElsewhere),
            None => {}
        }

        // Every attached integration on the source must consolidate, or the
        // whole merge is refused before any write.
        let source_integrations = self.store.integrations_for(source_id).await?;
        if let Some(blocked) = source_integrations.iter().find(|i| !i.can_be_merged) {
            return Err(MergeError::Conflict(blocked.provider.clone()));
        }

        reconcile_profiles(&mut target, &mut source);

        self.store.transfer_emails(source_id, target_id).await?;
        merge_pending_tokens(&mut target, &source);

        target
            .affiliated_institutions
            .extend(source.affiliated_institutions.iter().cloned());
        target.external_identities =
            merge_identity_maps(&target.external_identities, &source.external_identities);
        target
            .external_accounts
            .extend(source.external_accounts.iter().cloned());

        // Integration settings merge runs before contributorship transfer:
        // removing a contributor can trigger credential-revocation hooks on
        // the attached providers.
        self.merge_integrations(source_integrations, target_id)
            .await?;

        self.transfer_resource_contributors(source_id, target_id)
            .await?;
        self.transfer_preprint_contributors(source_id, target_id)
            .await?;

        self.reassign_created_resources(source_id, target_id).await?;
        self.reassign_collections(source_id, target_id).await?;
        self.transfer_checkouts(source_id, target_id).await?;
        self.consolidate_quick_files(source_id, target_id).await?;
        self.transfer_groups(source_id, target_id).await?;

        // Finalize: the source becomes an unusable tombstone pointing at the
        // target.
        self.store.revoke_all_for_account(source_id).await?;
        source.username = if source.id.0.is_nil() {
            folio_crypto::generate_token()
        } else {
            source.id.0.to_string()
        };
        source.password_hash = None;
        source.verification_key = None;
        source.action_token = None;
        source.email_verifications.clear();
        source.mailing_lists.clear();
        source.merged_into = Some(target_id.clone());
        source.updated_at = now;
        target.updated_at = now;

        self.store.save_account(&target).await?;
        self.store.save_account(&source).await?;

        info!(source = %source_id.0, target = %target_id.0, "accounts merged");

        let events = vec![AccountEvent::AccountsMerged {
            source: source_id.clone(),
            target: target_id.clone(),
        }];
        publish_events(&self.events, &events).await;
        Ok(events)
    }

    async fn merge_integrations(
        &self,
        source_integrations: Vec<Integration>,
        target_id: &AccountId,
    ) -> Result<(), MergeError> {
        let target_by_provider: BTreeMap<String, Integration> = self
            .store
            .integrations_for(target_id)
            .await?
            .into_iter()
            .map(|integration| (integration.provider.clone(), integration))
            .collect();

        for integration in source_integrations {
            match target_by_provider.get(&integration.provider) {
                Some(existing) => {
                    let mut merged = existing.clone();
                    merged.settings =
                        merge_settings(&existing.settings, &integration.settings);
                    self.store.save_integration(&merged).await?;
                }
                None => {
                    let mut moved = integration.clone();
                    moved.account_id = target_id.clone();
                    self.store.save_integration(&moved).await?;
                }
            }
            self.store
                .remove_integration(&integration.account_id, &integration.provider)
                .await?;
        }
        Ok(())
    }

    async fn transfer_resource_contributors(
        &self,
        source_id: &AccountId,
        target_id: &AccountId,
    ) -> Result<(), MergeError> {
        for resource_id in self.store.resources_contributed_by(source_id).await? {
            let source_row = self.store.get_contributor(&resource_id, source_id).await?;
            match self.store.get_contributor(&resource_id, target_id).await {
                Ok(target_row) => {
                    let merged = Contributor {
                        account_id: target_id.clone(),
                        permission: target_row.permission.max(source_row.permission),
                        visible: target_row.visible || source_row.visible,
                    };
                    self.store.upsert_contributor(&resource_id, &merged).await?;
                }
                Err(StoreError::NotFound) => {
                    let moved = Contributor {
                        account_id: target_id.clone(),
                        permission: source_row.permission,
                        visible: source_row.visible,
                    };
                    self.store.upsert_contributor(&resource_id, &moved).await?;
                }
                Err(err) => return Err(err.into()),
            }
            self.store.remove_contributor(&resource_id, source_id).await?;
        }
        Ok(())
    }

    async fn transfer_preprint_contributors(
        &self,
        source_id: &AccountId,
        target_id: &AccountId,
    ) -> Result<(), MergeError> {
        for preprint_id in self.store.preprints_contributed_by(source_id).await? {
            let source_row = self
                .store
                .get_preprint_contributor(&preprint_id, source_id)
                .await?;
            match self
                .store
                .get_preprint_contributor(&preprint_id, target_id)
                .await
            {
                Ok(target_row) => {
                    let merged = Contributor {
                        account_id: target_id.clone(),
                        permission: target_row.permission.max(source_row.permission),
                        visible: target_row.visible || source_row.visible,
                    };
                    self.store
                        .upsert_preprint_contributor(&preprint_id, &merged)
                        .await?;
                }
                Err(StoreError::NotFound) => {
                    let moved = Contributor {
                        account_id: target_id.clone(),
                        permission: source_row.permission,
                        visible: source_row.visible,
                    };
                    self.store
                        .upsert_preprint_contributor(&preprint_id, &moved)
                        .await?;
                }
                Err(err) => return Err(err.into()),
            }
            self.store
                .remove_preprint_contributor(&preprint_id, source_id)
                .await?;
        }
        Ok(())
    }

    async fn reassign_created_resources(
        &self,
        source_id: &AccountId,
        target_id: &AccountId,
    ) -> Result<(), MergeError> {
        for mut resource in self.store.resources_created_by(source_id).await? {
            resource.creator = target_id.clone();
            self.store.save_resource(&resource).await?;
        }
        Ok(())
    }

    async fn reassign_collections(
        &self,
        source_id: &AccountId,
        target_id: &AccountId,
    ) -> Result<(), MergeError> {
        // Personal bookmark collections never transfer; quick-files
        // containers are consolidated file-by-file instead.
        for mut collection in self.store.collections_owned_by(source_id).await? {
            if collection.is_bookmark {
                continue;
            }
            collection.owner = target_id.clone();
            self.store.save_collection(&collection).await?;
        }
        Ok(())
    }

    async fn transfer_checkouts(
        &self,
        source_id: &AccountId,
        target_id: &AccountId,
    ) -> Result<(), MergeError> {
        for mut file in self.store.files_checked_out_by(source_id).await? {
            file.checked_out_by = Some(target_id.clone());
            self.store.save_quick_file(&file).await?;
        }
        Ok(())
    }

    async fn consolidate_quick_files(
        &self,
        source_id: &AccountId,
        target_id: &AccountId,
    ) -> Result<(), MergeError> {
        let mut taken: HashSet<String> = self
            .store
            .quick_files_for(target_id)
            .await?
            .into_iter()
            .map(|file| file.name)
            .collect();

        let mut source_files = self.store.quick_files_for(source_id).await?;
        source_files.sort_by(|a, b| a.name.cmp(&b.name));

        for mut file in source_files {
            if taken.contains(&file.name) {
                file.name =
                    collision_free_name(&file.name, &taken, self.config.max_rename_attempts)?;
            }
            taken.insert(file.name.clone());
            file.owner = target_id.clone();
            self.store.save_quick_file(&file).await?;
        }
        Ok(())
    }

    async fn transfer_groups(
        &self,
        source_id: &AccountId,
        target_id: &AccountId,
    ) -> Result<(), MergeError> {
        for mut group in self.store.groups_for(source_id).await? {
            let source_manages = group.is_manager(source_id);
            if !group.is_manager(target_id) {
                if source_manages {
                    group.managers.insert(target_id.clone());
                } else if !group.is_member(target_id) {
                    group.members.insert(target_id.clone());
                }
            }
            group.managers.remove(source_id);
            group.members.remove(source_id);
            self.store.save_group(&group).await?;
        }
        Ok(())
    }
}

/// Steps 3-7: flag, tag, profile, map and subscription reconciliation.
fn reconcile_profiles(target: &mut Account, source: &mut Account) {
    target.system_tags.extend(source.system_tags.iter().cloned());
    target.is_superuser |= source.is_superuser;
    target.is_staff |= source.is_staff;
    target.is_invited |= source.is_invited;

    // Profile fields: first writer wins.
    if target.jobs.is_empty() {
        target.jobs = source.jobs.clone();
    }
    if target.schools.is_empty() {
        target.schools = source.schools.clone();
    }
    if target.social.is_empty() {
        target.social = source.social.clone();
    }

    // Map unions, target entries winning on key conflicts. Unclaimed
    // records belong to exactly one account, so the source's are cleared.
    for (key, value) in &source.unclaimed_records {
        target
            .unclaimed_records
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    source.unclaimed_records.clear();
    for (key, value) in &source.security_messages {
        target.security_messages.entry(key.clone()).or_insert(*value);
    }
    for (key, value) in &source.notifications_configured {
        target
            .notifications_configured
            .entry(key.clone())
            .or_insert(*value);
    }

    // Subscribed to a list if either account was.
    for (list, subscribed) in &source.mailing_lists {
        let entry = target.mailing_lists.entry(list.clone()).or_insert(false);
        *entry = *entry || *subscribed;
    }
    source.mailing_lists.clear();

    // Comments-viewed timestamps: keep the later view per key.
    for (key, timestamp) in &source.comments_viewed_timestamp {
        target
            .comments_viewed_timestamp
            .entry(key.clone())
            .and_modify(|current| {
                if *timestamp > *current {
                    *current = *timestamp;
                }
            })
            .or_insert(*timestamp);
    }
}

/// Step 9: pending verification tokens. Tokens for the source's own
/// now-stale primary address are skipped, as are tokens whose key collides
/// with an existing target token.
fn merge_pending_tokens(target: &mut Account, source: &Account) {
    let stale = normalize_email(&source.username);
    for (token, pending) in &source.email_verifications {
        if normalize_email(&pending.email) == stale {
            continue;
        }
        if target.email_verifications.contains_key(token) {
            continue;
        }
        target
            .email_verifications
            .insert(token.clone(), pending.clone());
    }
}

/// Integration settings merge: object keys union with target winning; any
/// other shape keeps the target's settings untouched.
fn merge_settings(target: &serde_json::Value, source: &serde_json::Value) -> serde_json::Value {
    match (target, source) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(source_map)) => {
            let mut merged = target_map.clone();
            for (key, value) in source_map {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
            serde_json::Value::Object(merged)
        }
        _ => target.clone(),
    }
}

/// Find a free name by inserting/incrementing a parenthesized counter
/// immediately before the extension, re-checking after each increment.
/// Exceeding `max_attempts` fails the merge instead of looping forever or
/// silently overwriting.
fn collision_free_name(
    name: &str,
    taken: &HashSet<String>,
    max_attempts: u32,
) -> Result<String, MergeError> {
    let (stem, ext) = split_extension(name);
    let (base, start) = split_counter(stem);

    let mut counter = start;
    for _ in 0..max_attempts {
        let candidate = format!("{} ({}){}", base, counter, ext);
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
        counter += 1;
    }
    Err(MergeError::MaxRetries(name.to_string()))
}

/// `"report.pdf"` → `("report", ".pdf")`; dotfiles keep their name whole.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// `"report (2)"` → `("report", 3)`; names without a counter start at 1.
fn split_counter(stem: &str) -> (&str, u32) {
    if let Some(open) = stem.rfind(" (") {
        if let Some(inner) = stem[open + 2..].strip_suffix(')') {
            if let Ok(count) = inner.parse::<u32>() {
                return (&stem[..open], count.saturating_add(1));
            }
        }
    }
    (stem, 1)
}
