//! External-identity linking tests.

use folio_storage::*;

use super::common::*;
use crate::error::{IdentityError, RegistryError};

#[tokio::test]
async fn verified_identity_is_exclusive_across_accounts() {
    let harness = test_engine();
    let mut holder = create_active_account(&harness, "x@example.com", "hunter2hunter2").await;
    let mut claimer = create_active_account(&harness, "y@example.com", "hunter2hunter2").await;

    harness
        .engine
        .identity
        .claim(&mut holder, "orcid", "0000-1", IdentityStatus::Verified)
        .await
        .unwrap();
    harness.store.save_account(&holder).await.unwrap();

    let result = harness
        .engine
        .identity
        .claim(&mut claimer, "orcid", "0000-1", IdentityStatus::Verified)
        .await;
    assert!(matches!(
        result,
        Err(IdentityError::AlreadyVerifiedElsewhere)
    ));

    // A different id on the same provider is fine.
    harness
        .engine
        .identity
        .claim(&mut claimer, "orcid", "0000-2", IdentityStatus::Link)
        .await
        .unwrap();
}

#[tokio::test]
async fn promotion_is_monotonic() {
    let harness = test_engine();
    let mut account = create_active_account(&harness, "x@example.com", "hunter2hunter2").await;

    harness
        .engine
        .identity
        .claim(&mut account, "orcid", "0000-1", IdentityStatus::Create)
        .await
        .unwrap();

    harness
        .engine
        .identity
        .promote(&mut account, "orcid", "0000-1", IdentityStatus::Link)
        .await
        .unwrap();

    let events = harness
        .engine
        .identity
        .promote(&mut account, "orcid", "0000-1", IdentityStatus::Verified)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    // Downgrades are rejected; equal status is a no-op.
    let downgrade = harness
        .engine
        .identity
        .promote(&mut account, "orcid", "0000-1", IdentityStatus::Link)
        .await;
    assert!(matches!(
        downgrade,
        Err(IdentityError::NonMonotonicPromotion { .. })
    ));
    let same = harness
        .engine
        .identity
        .promote(&mut account, "orcid", "0000-1", IdentityStatus::Verified)
        .await
        .unwrap();
    assert!(same.is_empty());
}

#[tokio::test]
async fn promote_requires_existing_claim() {
    let harness = test_engine();
    let mut account = create_active_account(&harness, "x@example.com", "hunter2hunter2").await;

    let result = harness
        .engine
        .identity
        .promote(&mut account, "orcid", "0000-1", IdentityStatus::Link)
        .await;
    assert!(matches!(result, Err(IdentityError::NotClaimed)));
}

#[tokio::test]
async fn confirming_with_identity_context_verifies_the_claim() {
    let harness = test_engine();
    let mut account = create_active_account(&harness, "x@example.com", "hunter2hunter2").await;

    let claim = ExternalIdentityClaim {
        provider: "orcid".to_string(),
        external_id: "0000-1".to_string(),
    };
    harness
        .engine
        .registry
        .add_unconfirmed(&mut account, "x@example.com", Some(claim), now())
        .await
        .unwrap();
    harness.store.save_account(&account).await.unwrap();
    let token = pending_token(&harness.store.get_account(&account.id).await.unwrap());

    harness
        .engine
        .registry
        .confirm(&account.id, &token, false, now())
        .await
        .unwrap();

    let updated = harness.store.get_account(&account.id).await.unwrap();
    assert_eq!(
        updated.external_identities["orcid"]["0000-1"],
        IdentityStatus::Verified
    );
}

#[tokio::test]
async fn confirming_an_identity_verified_elsewhere_fails() {
    let harness = test_engine();
    let mut holder = create_active_account(&harness, "x@example.com", "hunter2hunter2").await;
    harness
        .engine
        .identity
        .claim(&mut holder, "orcid", "0000-1", IdentityStatus::Verified)
        .await
        .unwrap();
    harness.store.save_account(&holder).await.unwrap();

    let mut account = create_active_account(&harness, "y@example.com", "hunter2hunter2").await;
    let claim = ExternalIdentityClaim {
        provider: "orcid".to_string(),
        external_id: "0000-1".to_string(),
    };
    harness
        .engine
        .registry
        .add_unconfirmed(&mut account, "y@example.com", Some(claim), now())
        .await
        .unwrap();
    harness.store.save_account(&account).await.unwrap();
    let token = pending_token(&harness.store.get_account(&account.id).await.unwrap());

    let result = harness
        .engine
        .registry
        .confirm(&account.id, &token, false, now())
        .await;
    assert!(matches!(
        result,
        Err(RegistryError::Identity(
            IdentityError::AlreadyVerifiedElsewhere
        ))
    ));
}
