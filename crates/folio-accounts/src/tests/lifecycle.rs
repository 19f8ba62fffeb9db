//! State-machine tests: registration, disable/reactivate, GDPR erasure,
//! password reset and the claim flow.

use chrono::Duration;

use folio_storage::*;

use super::common::*;
use crate::config::EngineConfig;
use crate::error::{LifecycleError, StatusGate, TokenError};
use crate::gateway::gate_for;
use crate::Collaborators;

#[tokio::test]
async fn register_confirm_disable_reactivate_scenario() {
    let harness = test_engine();

    // Register and confirm.
    let (account, _) = harness
        .engine
        .lifecycle
        .create_unconfirmed("alice@example.com", "hunter2hunter2", "Alice", None, now())
        .await
        .unwrap();
    let token = pending_token(&account);
    harness
        .engine
        .registry
        .confirm(&account.id, &token, false, now())
        .await
        .unwrap();
    let active = harness.store.get_account(&account.id).await.unwrap();
    assert!(active.is_active());

    // Disable.
    harness
        .engine
        .lifecycle
        .disable(&account.id, now())
        .await
        .unwrap();
    let disabled = harness.store.get_account(&account.id).await.unwrap();
    assert!(!disabled.is_active());
    assert_eq!(gate_for(&disabled), Some(StatusGate::Disabled));

    // Reactivate.
    harness
        .engine
        .lifecycle
        .reactivate(&account.id, now())
        .await
        .unwrap();
    let reactivated = harness.store.get_account(&account.id).await.unwrap();
    assert!(reactivated.is_active());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let harness = test_engine();
    create_active_account(&harness, "alice@example.com", "hunter2hunter2").await;

    let result = harness
        .engine
        .lifecycle
        .create_unconfirmed("Alice@Example.com ", "hunter2hunter2", "Imposter", None, now())
        .await;
    assert!(matches!(result, Err(LifecycleError::DuplicateEmail)));
}

#[tokio::test]
async fn self_registration_reuses_shadow_account() {
    let harness = test_engine();
    let shadow = harness
        .engine
        .lifecycle
        .create_unregistered("invited@example.com", "Invited", now())
        .await
        .unwrap();

    let (account, _) = harness
        .engine
        .lifecycle
        .create_unconfirmed("invited@example.com", "hunter2hunter2", "Real Name", None, now())
        .await
        .unwrap();
    assert_eq!(account.id, shadow.id);
    assert!(account.is_invited);
    assert_eq!(account.fullname, "Real Name");
    assert!(account.has_usable_password());
}

#[tokio::test]
async fn campaign_tag_applies_when_recognized() {
    let mut config = EngineConfig::default();
    config.campaigns.insert(
        "prereg-2026".to_string(),
        "campaign:prereg".to_string(),
    );
    let harness = test_engine_with(config, Collaborators::default());

    let (tagged, _) = harness
        .engine
        .lifecycle
        .create_unconfirmed(
            "alice@example.com",
            "hunter2hunter2",
            "Alice",
            Some("prereg-2026"),
            now(),
        )
        .await
        .unwrap();
    assert!(tagged.system_tags.contains("campaign:prereg"));

    let (untagged, _) = harness
        .engine
        .lifecycle
        .create_unconfirmed(
            "bob@example.com",
            "hunter2hunter2",
            "Bob",
            Some("unknown-campaign"),
            now(),
        )
        .await
        .unwrap();
    assert!(untagged.system_tags.is_empty());
}

#[tokio::test]
async fn disable_revokes_sessions_and_unsubscribes() {
    let lists = std::sync::Arc::new(RecordingMailingLists::default());
    let harness = test_engine_with(
        EngineConfig::default(),
        Collaborators {
            mailing_lists: Some(lists.clone()),
            ..Default::default()
        },
    );
    let account = create_active_account(&harness, "alice@example.com", "hunter2hunter2").await;
    create_session_for(&harness.store, &account.id).await;
    create_session_for(&harness.store, &account.id).await;

    harness
        .engine
        .lifecycle
        .disable(&account.id, now())
        .await
        .unwrap();

    assert!(harness
        .store
        .sessions_for_account(&account.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        lists.unsubscribed.lock().unwrap().as_slice(),
        ["alice@example.com"]
    );

    // Second disable is a no-op.
    harness
        .engine
        .lifecycle
        .disable(&account.id, now())
        .await
        .unwrap();
    assert_eq!(lists.unsubscribed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn disable_swallows_unsubscribe_failure_unless_mandatory() {
    // Best-effort by default.
    let harness = test_engine_with(
        EngineConfig::default(),
        Collaborators {
            mailing_lists: Some(std::sync::Arc::new(FailingMailingLists)),
            ..Default::default()
        },
    );
    let account = create_active_account(&harness, "alice@example.com", "hunter2hunter2").await;
    harness
        .engine
        .lifecycle
        .disable(&account.id, now())
        .await
        .unwrap();

    // Mandatory-by-config propagates the failure.
    let mut config = EngineConfig::default();
    config.mailing_lists_mandatory = true;
    let strict = test_engine_with(
        config,
        Collaborators {
            mailing_lists: Some(std::sync::Arc::new(FailingMailingLists)),
            ..Default::default()
        },
    );
    let account = create_active_account(&strict, "bob@example.com", "hunter2hunter2").await;
    let result = strict.engine.lifecycle.disable(&account.id, now()).await;
    assert!(matches!(result, Err(LifecycleError::MailingList(_))));
    let untouched = strict.store.get_account(&account.id).await.unwrap();
    assert!(!untouched.is_disabled());
}

#[tokio::test]
async fn gdpr_delete_refuses_registrations() {
    let harness = test_engine();
    let account = create_active_account(&harness, "alice@example.com", "hunter2hunter2").await;
    let registration =
        create_resource(&harness.store, &account.id, ResourceKind::Registration).await;
    add_contributor(
        &harness.store,
        &registration.id,
        &account.id,
        Permission::Admin,
        true,
    )
    .await;

    let result = harness.engine.lifecycle.gdpr_delete(&account.id, now()).await;
    assert!(matches!(result, Err(LifecycleError::UserState(_))));
}

#[tokio::test]
async fn gdpr_delete_refuses_public_preprints() {
    let harness = test_engine();
    let account = create_active_account(&harness, "alice@example.com", "hunter2hunter2").await;
    let preprint = create_preprint(&harness.store, true).await;
    harness
        .store
        .upsert_preprint_contributor(
            &preprint.id,
            &Contributor {
                account_id: account.id.clone(),
                permission: Permission::Write,
                visible: true,
            },
        )
        .await
        .unwrap();

    let result = harness.engine.lifecycle.gdpr_delete(&account.id, now()).await;
    assert!(matches!(result, Err(LifecycleError::UserState(_))));
}

#[tokio::test]
async fn gdpr_delete_refuses_sole_admin_on_shared_resource() {
    let harness = test_engine();
    let account = create_active_account(&harness, "alice@example.com", "hunter2hunter2").await;
    let colleague = create_active_account(&harness, "bob@example.com", "hunter2hunter2").await;

    let project = create_resource(&harness.store, &account.id, ResourceKind::Project).await;
    add_contributor(&harness.store, &project.id, &account.id, Permission::Admin, true).await;
    add_contributor(&harness.store, &project.id, &colleague.id, Permission::Write, true).await;

    let result = harness.engine.lifecycle.gdpr_delete(&account.id, now()).await;
    assert!(matches!(result, Err(LifecycleError::UserState(_))));

    // A second admin unblocks erasure.
    add_contributor(&harness.store, &project.id, &colleague.id, Permission::Admin, true).await;
    harness
        .engine
        .lifecycle
        .gdpr_delete(&account.id, now())
        .await
        .unwrap();
}

#[tokio::test]
async fn gdpr_delete_refuses_sole_registered_group_manager() {
    let harness = test_engine();
    let account = create_active_account(&harness, "alice@example.com", "hunter2hunter2").await;
    let invitee = harness
        .engine
        .lifecycle
        .create_unregistered("invited@example.com", "Invited", now())
        .await
        .unwrap();

    let group = Group {
        id: GroupId(uuid::Uuid::new_v4()),
        name: "lab".to_string(),
        managers: [account.id.clone()].into_iter().collect(),
        members: [invitee.id.clone()].into_iter().collect(),
    };
    harness.store.save_group(&group).await.unwrap();

    let result = harness.engine.lifecycle.gdpr_delete(&account.id, now()).await;
    assert!(matches!(result, Err(LifecycleError::UserState(_))));
}

#[tokio::test]
async fn gdpr_delete_scrubs_in_place() {
    let harness = test_engine();
    let mut account = create_active_account(&harness, "alice@example.com", "hunter2hunter2").await;
    account.social.insert("twitter".to_string(), "@alice".to_string());
    account.jobs.push(JobRecord {
        institution: "Example University".to_string(),
        title: Some("Researcher".to_string()),
        ongoing: true,
    });
    account
        .external_identities
        .entry("orcid".to_string())
        .or_default()
        .insert("0000-1".to_string(), IdentityStatus::Verified);
    harness.store.save_account(&account).await.unwrap();

    let personal = create_resource(&harness.store, &account.id, ResourceKind::Project).await;
    add_contributor(&harness.store, &personal.id, &account.id, Permission::Admin, true).await;
    create_session_for(&harness.store, &account.id).await;

    harness
        .engine
        .lifecycle
        .gdpr_delete(&account.id, now())
        .await
        .unwrap();

    // The row persists, scrubbed.
    let erased = harness.store.get_account(&account.id).await.unwrap();
    assert_eq!(erased.fullname, "Deleted user");
    assert!(erased.social.is_empty());
    assert!(erased.jobs.is_empty());
    assert!(erased.external_identities.is_empty());
    assert!(erased.deleted.is_some());
    assert!(erased.is_disabled());

    assert!(harness.store.emails_for_account(&account.id).await.unwrap().is_empty());
    assert!(harness
        .store
        .sessions_for_account(&account.id)
        .await
        .unwrap()
        .is_empty());

    // The personal sole-contributor project is soft-deleted, not orphaned.
    let resource = harness.store.get_resource(&personal.id).await.unwrap();
    assert!(resource.deleted.is_some());
}

#[tokio::test]
async fn password_reset_flow() {
    let harness = test_engine();
    let account = create_active_account(&harness, "alice@example.com", "old-password-1").await;

    let token = harness
        .engine
        .lifecycle
        .request_password_reset("alice@example.com", now())
        .await
        .unwrap();
    assert_eq!(harness.mailer.sent_to("alice@example.com").len(), 2); // confirm + reset

    harness
        .engine
        .lifecycle
        .reset_password(&account.id, &token, "new-password-1", now())
        .await
        .unwrap();

    let updated = harness.store.get_account(&account.id).await.unwrap();
    let hash = updated.password_hash.as_deref().unwrap();
    assert!(folio_crypto::verify_password("new-password-1", hash).unwrap());
    assert!(!folio_crypto::verify_password("old-password-1", hash).unwrap());

    // Single-use: the token is consumed.
    let again = harness
        .engine
        .lifecycle
        .reset_password(&account.id, &token, "sneaky-password", now())
        .await;
    assert!(matches!(
        again,
        Err(LifecycleError::Token(TokenError::Invalid))
    ));
}

#[tokio::test]
async fn password_reset_token_expires_after_48_hours() {
    let harness = test_engine();
    let account = create_active_account(&harness, "alice@example.com", "old-password-1").await;
    let token = harness
        .engine
        .lifecycle
        .request_password_reset("alice@example.com", now())
        .await
        .unwrap();

    let result = harness
        .engine
        .lifecycle
        .reset_password(&account.id, &token, "new-password-1", now() + Duration::hours(49))
        .await;
    assert!(matches!(
        result,
        Err(LifecycleError::Token(TokenError::Expired))
    ));
}

#[tokio::test]
async fn claim_flow_converts_shadow_account() {
    let harness = test_engine();
    let shadow = harness
        .engine
        .lifecycle
        .create_unregistered("invited@example.com", "Invited", now())
        .await
        .unwrap();
    let project = create_resource(&harness.store, &shadow.id, ResourceKind::Project).await;

    let token = harness
        .engine
        .lifecycle
        .send_claim_invitation(&shadow.id, &project.id, now())
        .await
        .unwrap();
    let claim_mail = &harness.mailer.sent_to("invited@example.com")[0];
    assert!(claim_mail.body.contains(&token));
    assert!(claim_mail.body.contains("claim"));

    harness
        .engine
        .lifecycle
        .claim_account(&shadow.id, &token, "hunter2hunter2", now())
        .await
        .unwrap();

    let claimed = harness.store.get_account(&shadow.id).await.unwrap();
    assert!(claimed.is_active());

    // Already claimed: a second invitation is refused.
    let again = harness
        .engine
        .lifecycle
        .send_claim_invitation(&shadow.id, &project.id, now())
        .await;
    assert!(matches!(again, Err(LifecycleError::UserState(_))));
}

#[tokio::test]
async fn register_is_idempotent_once_active() {
    let harness = test_engine();
    let account = create_active_account(&harness, "alice@example.com", "hunter2hunter2").await;

    let events = harness
        .engine
        .lifecycle
        .register(&account.id, "alice@example.com", now())
        .await
        .unwrap();
    assert!(events.is_empty());
}
