//! Post-unlock feedback and cancellation.
//!
//! Both flows consume the same write-once slot on the unlock, and both may
//! issue a deal code; the unlock change, the code and any refund are written
//! through one [`Settlement`] so none of them can exist without the others.

use super::orchestrator::UnlockOrchestrator;
use super::views::{AppreciationOutcome, CancellationOutcome};
use crate::domain::deal_code::DealCode;
use crate::domain::notification::{Audience, Notification};
use crate::domain::ports::Settlement;
use crate::domain::refund::AddressUnlockRefund;
use crate::domain::unlock::{AppreciationLevel, UnlockId, UnlockRecord};
use crate::error::{Result, UnlockError};
use chrono::Utc;

impl UnlockOrchestrator {
    /// Records how the guest felt about a completed unlock.
    ///
    /// A neutral or negative verdict on a paid deposit unlock earns a
    /// single-use deal code for another property.
    pub async fn submit_appreciation(
        &self,
        user_id: &str,
        unlock_id: UnlockId,
        level: AppreciationLevel,
        feedback: Option<String>,
    ) -> Result<AppreciationOutcome> {
        if level == AppreciationLevel::Cancelled {
            return Err(UnlockError::ValidationError(
                "cancellation goes through the cancel endpoint".to_string(),
            ));
        }

        let record = self.owned_unlock(user_id, unlock_id).await?;
        let now = Utc::now();
        let mut updated = record.clone();
        updated.record_appreciation(level, feedback, now)?;

        let deal_code = if level.earns_deal_code() && record.paid_as_deposit() {
            Some(self.ledger.prepare(user_id, &record.property_id, now).await?)
        } else {
            None
        };

        let settled = self
            .repository
            .settle(Settlement {
                unlock: updated.clone(),
                expected_revision: record.revision,
                deal_code: deal_code.clone(),
                refund: None,
            })
            .await?;
        if !settled {
            return Err(self.explain_lost_race(unlock_id).await);
        }

        tracing::info!(%unlock_id, ?level, deal_code_issued = deal_code.is_some(), "Appreciation recorded");
        if let Some(code) = &deal_code {
            self.notify(Notification::DealCodeIssued {
                user_id: user_id.to_string(),
                code: code.code.clone(),
                source_property_id: record.property_id.clone(),
            })
            .await;
        }

        Ok(AppreciationOutcome {
            unlock: self.summary(&updated),
            deal_code,
        })
    }

    /// Cancels a completed unlock.
    ///
    /// Paid deposit unlocks get a pending refund of the fee minus the service
    /// fee, plus a deal code; guest and host are told. Flat-fee unlocks are
    /// cancelled without compensation.
    pub async fn cancel_unlock_request(
        &self,
        user_id: &str,
        unlock_id: UnlockId,
        reason: Option<String>,
    ) -> Result<CancellationOutcome> {
        let record = self.owned_unlock(user_id, unlock_id).await?;
        let now = Utc::now();
        let mut updated = record.clone();
        updated.cancel(reason, now)?;

        let refund_eligible = record.paid_as_deposit();
        let (deal_code, refund) = if refund_eligible {
            if self.repository.refund_for_unlock(unlock_id).await?.is_some() {
                return Err(UnlockError::Conflict(format!(
                    "a refund already exists for unlock {unlock_id}"
                )));
            }
            let code = self.ledger.prepare(user_id, &record.property_id, now).await?;
            let refund = AddressUnlockRefund::compute(
                unlock_id,
                user_id.to_string(),
                record.amount_local,
                self.config.service_fee,
                record.exchange_rate,
                now,
            );
            (Some(code), Some(refund))
        } else {
            (None, None)
        };

        let settled = self
            .repository
            .settle(Settlement {
                unlock: updated.clone(),
                expected_revision: record.revision,
                deal_code: deal_code.clone(),
                refund: refund.clone(),
            })
            .await?;
        if !settled {
            return Err(self.explain_lost_race(unlock_id).await);
        }

        tracing::info!(
            %unlock_id,
            refund_eligible,
            refund_local = ?refund.as_ref().map(|r| r.refund_amount_local),
            "Unlock cancelled"
        );

        if refund_eligible {
            self.notify_cancellation(&updated, &refund, &deal_code).await;
        }

        Ok(CancellationOutcome {
            unlock: self.summary(&updated),
            refund_eligible,
            refund,
            deal_code,
        })
    }

    /// Refunds owed to `user_id`, oldest first.
    pub async fn list_refunds(&self, user_id: &str) -> Result<Vec<AddressUnlockRefund>> {
        self.repository.refunds_for_user(user_id).await
    }

    async fn notify_cancellation(
        &self,
        unlock: &UnlockRecord,
        refund: &Option<AddressUnlockRefund>,
        deal_code: &Option<DealCode>,
    ) {
        let message = |audience: Audience, user_id: String| Notification::UnlockCancelled {
            audience,
            unlock_id: unlock.unlock_id,
            property_id: unlock.property_id.clone(),
            user_id,
            refund_amount_local: refund.as_ref().map(|r| r.refund_amount_local),
            deal_code: deal_code.as_ref().map(|c| c.code.clone()),
        };

        self.notify(message(Audience::Guest, unlock.user_id.clone()))
            .await;

        match self.catalog.property(&unlock.property_id).await {
            Ok(Some(listing)) => {
                self.notify(message(Audience::Host, listing.host.host_id))
                    .await;
            }
            Ok(None) => {
                tracing::warn!(property_id = %unlock.property_id, "Host not notified, property missing");
            }
            Err(e) => {
                tracing::warn!(property_id = %unlock.property_id, error = %e, "Host not notified");
            }
        }
    }

    /// Re-reads an unlock whose settlement lost a race and reports why.
    async fn explain_lost_race(&self, unlock_id: UnlockId) -> UnlockError {
        match self.repository.get_unlock(unlock_id).await {
            Ok(Some(current)) if current.appreciation_submitted() => UnlockError::AlreadyAppreciated,
            Ok(Some(current)) if !current.is_completed() => {
                UnlockError::PaymentNotCompleted(current.kind())
            }
            Ok(_) => UnlockError::Conflict(format!(
                "unlock {unlock_id} changed concurrently"
            )),
            Err(e) => e,
        }
    }
}
