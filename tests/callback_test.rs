mod common;

use common::*;
use unlock_engine::application::views::CallbackOutcome;
use unlock_engine::domain::notification::Notification;
use unlock_engine::domain::ports::UnlockStore;
use unlock_engine::domain::unlock::{GatewayStatus, PaymentMethod, StatusKind};
use unlock_engine::error::UnlockError;

#[tokio::test]
async fn test_completion_callback_is_applied_once() {
    let h = harness().await;
    let outcome = h
        .orchestrator
        .initiate_unlock_payment(GUEST, wallet_request(STUDIO, PaymentMethod::NonRefundableFee))
        .await
        .unwrap();
    let reference = outcome.unlock.transaction_reference;

    let first = h
        .orchestrator
        .process_payment_callback(&reference, GatewayStatus::Completed)
        .await
        .unwrap();
    assert!(matches!(
        first,
        CallbackOutcome::Applied {
            from: StatusKind::Submitted,
            to: StatusKind::Completed,
            ..
        }
    ));
    let unlocked_at = h
        .repository
        .find_by_reference(&reference)
        .await
        .unwrap()
        .unwrap()
        .unlocked_at();

    let replay = h
        .orchestrator
        .process_payment_callback(&reference, GatewayStatus::Completed)
        .await
        .unwrap();
    assert!(matches!(
        replay,
        CallbackOutcome::Duplicate {
            status: StatusKind::Completed,
            ..
        }
    ));

    let stored = h.repository.find_by_reference(&reference).await.unwrap().unwrap();
    assert_eq!(stored.unlocked_at(), unlocked_at);

    let sent = h.outbox.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0], Notification::UnlockCompleted { .. }));
}

#[tokio::test]
async fn test_late_failure_does_not_undo_completion() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, STUDIO, PaymentMethod::NonRefundableFee)
        .await;

    let outcome = h
        .orchestrator
        .process_payment_callback(&unlock.transaction_reference, GatewayStatus::Failed)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        CallbackOutcome::Ignored {
            status: StatusKind::Completed,
            ..
        }
    ));
    let stored = h
        .repository
        .get_unlock(unlock.unlock_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.kind(), StatusKind::Completed);
}

#[tokio::test]
async fn test_completion_after_failure_is_ignored() {
    let h = harness().await;
    let outcome = h
        .orchestrator
        .initiate_unlock_payment(GUEST, wallet_request(STUDIO, PaymentMethod::NonRefundableFee))
        .await
        .unwrap();
    let reference = outcome.unlock.transaction_reference;

    let failed = h
        .orchestrator
        .process_payment_callback(&reference, GatewayStatus::Failed)
        .await
        .unwrap();
    assert_eq!(failed.label(), "applied");

    let late = h
        .orchestrator
        .process_payment_callback(&reference, GatewayStatus::Completed)
        .await
        .unwrap();
    assert_eq!(late.label(), "ignored");
    assert!(h.outbox.sent().await.is_empty());
}

#[tokio::test]
async fn test_unknown_reference_is_reported() {
    let h = harness().await;

    let outcome = h
        .orchestrator
        .process_payment_callback("UNLOCK-DOESNOTEXIST", GatewayStatus::Completed)
        .await
        .unwrap();

    assert_eq!(outcome, CallbackOutcome::NotFound);
}

#[tokio::test]
async fn test_reconcile_applies_provider_status() {
    let h = harness().await;
    let outcome = h
        .orchestrator
        .initiate_unlock_payment(GUEST, wallet_request(STUDIO, PaymentMethod::NonRefundableFee))
        .await
        .unwrap();
    let reference = outcome.unlock.transaction_reference;
    h.wallet.report(&reference, "SUCCESSFUL");

    let reconciled = h
        .orchestrator
        .reconcile_unlock(GUEST, outcome.unlock.unlock_id)
        .await
        .unwrap();

    assert!(matches!(
        reconciled,
        CallbackOutcome::Applied {
            to: StatusKind::Completed,
            ..
        }
    ));
    assert_eq!(h.outbox.sent().await.len(), 1);

    // Settled records are not polled again.
    let again = h.orchestrator.reconcile_payment(&reference).await.unwrap();
    assert_eq!(again.label(), "duplicate");
}

#[tokio::test]
async fn test_reconcile_fails_charge_unknown_to_provider() {
    let h = harness().await;
    let outcome = h
        .orchestrator
        .initiate_unlock_payment(GUEST, card_request(VILLA, PaymentMethod::NonRefundableFee))
        .await
        .unwrap();

    let reconciled = h
        .orchestrator
        .reconcile_payment(&outcome.unlock.transaction_reference)
        .await
        .unwrap();

    assert!(matches!(
        reconciled,
        CallbackOutcome::Applied {
            from: StatusKind::Pending,
            to: StatusKind::Failed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_reconcile_is_owner_only() {
    let h = harness().await;
    let outcome = h
        .orchestrator
        .initiate_unlock_payment(GUEST, wallet_request(STUDIO, PaymentMethod::NonRefundableFee))
        .await
        .unwrap();

    let result = h
        .orchestrator
        .reconcile_unlock(OTHER_GUEST, outcome.unlock.unlock_id)
        .await;

    assert!(matches!(result, Err(UnlockError::Unauthorized)));
}

#[tokio::test]
async fn test_sweep_reconciles_every_open_payment() {
    let h = harness().await;
    let paid = h
        .orchestrator
        .initiate_unlock_payment(GUEST, wallet_request(STUDIO, PaymentMethod::NonRefundableFee))
        .await
        .unwrap();
    let waiting = h
        .orchestrator
        .initiate_unlock_payment(GUEST, card_request(LOFT, PaymentMethod::NonRefundableFee))
        .await
        .unwrap();
    h.wallet.report(&paid.unlock.transaction_reference, "COMPLETED");
    h.cards.report(&waiting.unlock.transaction_reference, "PENDING");

    let outcomes = h.orchestrator.reconcile_open_payments().await.unwrap();

    assert_eq!(outcomes.len(), 2);
    let labels: Vec<_> = outcomes
        .iter()
        .map(|(reference, outcome)| (reference.as_str(), outcome.label()))
        .collect();
    assert!(labels.contains(&(paid.unlock.transaction_reference.as_str(), "applied")));
    assert!(labels.contains(&(waiting.unlock.transaction_reference.as_str(), "applied")));

    let open = h.repository.open_unlocks().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].kind(), StatusKind::Submitted);
}
