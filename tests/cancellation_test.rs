mod common;

use common::*;
use rust_decimal_macros::dec;
use unlock_engine::domain::money::LocalAmount;
use unlock_engine::domain::notification::{Audience, Notification};
use unlock_engine::domain::ports::{RefundStore, UnlockStore};
use unlock_engine::domain::refund::RefundStatus;
use unlock_engine::domain::unlock::{AppreciationLevel, PaymentMethod, PaymentStatus, StatusKind};
use unlock_engine::error::UnlockError;

#[tokio::test]
async fn test_deposit_cancellation_refunds_and_compensates() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, VILLA, PaymentMethod::ThreeMonth30Percent)
        .await;

    let outcome = h
        .orchestrator
        .cancel_unlock_request(GUEST, unlock.unlock_id, Some("found another place".to_string()))
        .await
        .unwrap();

    assert!(outcome.refund_eligible);
    assert_eq!(outcome.unlock.status, StatusKind::Cancelled);
    assert_eq!(outcome.unlock.appreciation_level, Some(AppreciationLevel::Cancelled));

    // 666,900 paid minus the 15,000 service fee
    let refund = outcome.refund.unwrap();
    assert_eq!(refund.refund_amount_local, LocalAmount::units(651_900));
    assert_eq!(refund.refund_amount_usd.value(), dec!(501.46));
    assert_eq!(refund.service_fee_local, LocalAmount::units(15_000));
    assert_eq!(refund.status, RefundStatus::Pending);
    assert_eq!(
        h.orchestrator.list_refunds(GUEST).await.unwrap(),
        vec![refund.clone()]
    );

    let code = outcome.deal_code.unwrap();
    assert_eq!(code.source_property_id, VILLA);
    assert_eq!(h.orchestrator.ledger().codes_for_user(GUEST).await.unwrap(), vec![code.clone()]);

    let stored = h.repository.get_unlock(unlock.unlock_id).await.unwrap().unwrap();
    assert!(matches!(
        stored.status,
        PaymentStatus::Cancelled {
            refund_eligible: true,
            ..
        }
    ));
    assert_eq!(stored.unlocked_at(), unlock.unlocked_at);

    let audiences: Vec<_> = h
        .outbox
        .sent()
        .await
        .into_iter()
        .filter_map(|n| match n {
            Notification::UnlockCancelled {
                audience,
                user_id,
                refund_amount_local,
                deal_code,
                ..
            } => {
                assert_eq!(refund_amount_local, Some(LocalAmount::units(651_900)));
                assert_eq!(deal_code.as_deref(), Some(code.code.as_str()));
                Some((audience, user_id))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        audiences,
        vec![
            (Audience::Guest, GUEST.to_string()),
            (Audience::Host, HOST.to_string())
        ]
    );
}

#[tokio::test]
async fn test_flat_fee_cancellation_has_no_compensation() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, STUDIO, PaymentMethod::NonRefundableFee)
        .await;
    let sent_before = h.outbox.sent().await.len();

    let outcome = h
        .orchestrator
        .cancel_unlock_request(GUEST, unlock.unlock_id, None)
        .await
        .unwrap();

    assert!(!outcome.refund_eligible);
    assert!(outcome.refund.is_none());
    assert!(outcome.deal_code.is_none());
    assert_eq!(outcome.unlock.status, StatusKind::Cancelled);
    assert!(h.orchestrator.list_refunds(GUEST).await.unwrap().is_empty());
    assert_eq!(h.outbox.sent().await.len(), sent_before);
}

#[tokio::test]
async fn test_cancellation_happens_once() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, VILLA, PaymentMethod::ThreeMonth30Percent)
        .await;
    h.orchestrator
        .cancel_unlock_request(GUEST, unlock.unlock_id, None)
        .await
        .unwrap();

    let again = h
        .orchestrator
        .cancel_unlock_request(GUEST, unlock.unlock_id, None)
        .await;

    assert!(matches!(again, Err(UnlockError::AlreadyAppreciated)));
    assert_eq!(h.orchestrator.list_refunds(GUEST).await.unwrap().len(), 1);
    assert_eq!(h.orchestrator.ledger().codes_for_user(GUEST).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_cancellations_issue_one_refund() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, VILLA, PaymentMethod::ThreeMonth30Percent)
        .await;

    let (a, b) = tokio::join!(
        h.orchestrator
            .cancel_unlock_request(GUEST, unlock.unlock_id, None),
        h.orchestrator
            .cancel_unlock_request(GUEST, unlock.unlock_id, None),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(h.orchestrator.list_refunds(GUEST).await.unwrap().len(), 1);
    assert_eq!(h.orchestrator.ledger().codes_for_user(GUEST).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_feedback_blocks_cancellation() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, VILLA, PaymentMethod::ThreeMonth30Percent)
        .await;
    h.orchestrator
        .submit_appreciation(GUEST, unlock.unlock_id, AppreciationLevel::Appreciated, None)
        .await
        .unwrap();

    let result = h
        .orchestrator
        .cancel_unlock_request(GUEST, unlock.unlock_id, None)
        .await;

    assert!(matches!(result, Err(UnlockError::AlreadyAppreciated)));
}

#[tokio::test]
async fn test_open_payment_cannot_be_cancelled() {
    let h = harness().await;
    let pending = h
        .orchestrator
        .initiate_unlock_payment(GUEST, wallet_request(VILLA, PaymentMethod::ThreeMonth30Percent))
        .await
        .unwrap();

    let result = h
        .orchestrator
        .cancel_unlock_request(GUEST, pending.unlock.unlock_id, None)
        .await;
    assert!(matches!(
        result,
        Err(UnlockError::PendingPaymentNotCancellable(StatusKind::Submitted))
    ));

    let stranger = h
        .orchestrator
        .cancel_unlock_request(OTHER_GUEST, pending.unlock.unlock_id, None)
        .await;
    assert!(matches!(stranger, Err(UnlockError::Unauthorized)));
}

#[tokio::test]
async fn test_paying_again_keeps_cancelled_record() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, VILLA, PaymentMethod::ThreeMonth30Percent)
        .await;
    h.orchestrator
        .cancel_unlock_request(GUEST, unlock.unlock_id, None)
        .await
        .unwrap();
    let cancelled = h.repository.get_unlock(unlock.unlock_id).await.unwrap().unwrap();

    let mut bogus = wallet_request(VILLA, PaymentMethod::ThreeMonth30Percent);
    bogus.payment_provider = Some("BOGUS_ZZ".to_string());
    let result = h.orchestrator.initiate_unlock_payment(GUEST, bogus).await;
    assert!(matches!(result, Err(UnlockError::UnsupportedProvider(_))));
    assert_eq!(
        h.repository.find_unlock(GUEST, VILLA).await.unwrap(),
        Some(cancelled.clone())
    );

    let retry = h
        .orchestrator
        .initiate_unlock_payment(GUEST, wallet_request(VILLA, PaymentMethod::ThreeMonth30Percent))
        .await
        .unwrap();
    assert_eq!(retry.unlock.status, StatusKind::Submitted);
    assert_eq!(
        h.repository.get_unlock(unlock.unlock_id).await.unwrap(),
        Some(cancelled)
    );
    assert!(h.repository.refund_for_unlock(unlock.unlock_id).await.unwrap().is_some());
    assert_eq!(h.orchestrator.list_refunds(GUEST).await.unwrap().len(), 1);
}
