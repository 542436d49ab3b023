use super::fees::{deposit_period_total_usd, monthly_price};
use super::orchestrator::UnlockOrchestrator;
use super::views::{BookingOutcome, BookingRequest};
use crate::domain::catalog::{BookingDraft, SettlementState};
use crate::domain::unlock::{Transition, UnlockId};
use crate::error::{Result, UnlockError};
use chrono::{Months, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

impl UnlockOrchestrator {
    /// Converts a paid deposit unlock into a booking whose deposit is already
    /// settled; the remaining share of the period is left pending.
    pub async fn create_booking_from_unlock(
        &self,
        user_id: &str,
        unlock_id: UnlockId,
        request: BookingRequest,
    ) -> Result<BookingOutcome> {
        let record = self.owned_unlock(user_id, unlock_id).await?;
        if !record.is_completed() {
            return Err(UnlockError::PaymentNotCompleted(record.kind()));
        }
        if !record.paid_as_deposit() {
            return Err(UnlockError::MethodNotSupported {
                property_id: record.property_id,
                reason: "only paid deposit unlocks convert into bookings".to_string(),
            });
        }
        if record.booking_id.is_some() {
            return Err(UnlockError::BookingAlreadyCreated(unlock_id.to_string()));
        }

        let schedule = &self.config.fees;
        let check_in = request.check_in;
        let check_out = match request.check_out {
            Some(date) => date,
            None => deposit_period_end(check_in, schedule.deposit_months)?,
        };
        if check_out <= check_in {
            return Err(UnlockError::ValidationError(
                "check_out must be after check_in".to_string(),
            ));
        }

        let listing = self.listing(&record.property_id).await?;
        let monthly = monthly_price(&listing)?;
        let total = cents(deposit_period_total_usd(monthly, schedule));
        let paid = cents(total * schedule.deposit_share);
        let remaining = total - paid;

        let receipt = self
            .bookings
            .create_booking(BookingDraft {
                unlock_id,
                property_id: record.property_id.clone(),
                guest_id: user_id.to_string(),
                check_in,
                check_out,
                guests: request.guests.unwrap_or(1).max(1),
                message: request.message,
                total_price_usd: total,
                paid_amount_usd: paid,
                deposit_state: SettlementState::Settled,
                remaining_amount_usd: remaining,
                remaining_state: SettlementState::Pending,
            })
            .await?;

        // The service keys bookings by unlock, so a concurrent request gets the
        // same booking back and loses the race for the link below.
        let now = Utc::now();
        let booking_id = receipt.booking_id;
        match self
            .update_with(unlock_id, |r| {
                r.attach_booking(booking_id.clone(), now)
                    .map(|_| Transition::Unchanged)
            })
            .await
        {
            Ok(_) => {}
            Err(e @ UnlockError::BookingAlreadyCreated(_)) => {
                tracing::info!(%unlock_id, booking_id = %booking_id, "Booking already linked by a concurrent request");
                return Err(e);
            }
            Err(e) => {
                tracing::error!(%unlock_id, booking_id = %booking_id, error = %e, "Booking created but not linked to unlock");
                return Err(e);
            }
        }

        tracing::info!(%unlock_id, booking_id = %booking_id, total = %total, paid = %paid, "Booking created from unlock");
        Ok(BookingOutcome {
            booking_id,
            unlock_id,
            check_in,
            check_out,
            total_price_usd: total,
            paid_amount_usd: paid,
            remaining_amount_usd: remaining,
        })
    }
}

fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn deposit_period_end(check_in: NaiveDate, months: Decimal) -> Result<NaiveDate> {
    let months = months
        .to_u32()
        .ok_or_else(|| UnlockError::internal("deposit period is not a whole number of months"))?;
    check_in
        .checked_add_months(Months::new(months))
        .ok_or_else(|| UnlockError::ValidationError("check_in is out of range".to_string()))
}
