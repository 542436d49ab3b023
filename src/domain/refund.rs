use crate::domain::money::{ExchangeRate, LocalAmount, UsdAmount};
use crate::domain::unlock::{UnlockId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Recorded, awaiting payout by finance.
    Pending,
}

/// Cash refund owed for a cancelled deposit-method unlock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressUnlockRefund {
    pub refund_id: Uuid,
    pub unlock_id: UnlockId,
    pub user_id: UserId,
    pub refund_amount_local: LocalAmount,
    pub refund_amount_usd: UsdAmount,
    pub service_fee_local: LocalAmount,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
}

impl AddressUnlockRefund {
    /// `max(0, paid - service_fee)`, reported in both currencies at the rate
    /// the unlock was paid with.
    pub fn compute(
        unlock_id: UnlockId,
        user_id: UserId,
        paid: LocalAmount,
        service_fee: LocalAmount,
        rate: ExchangeRate,
        now: DateTime<Utc>,
    ) -> Self {
        let refund = paid.saturating_sub(service_fee);
        Self {
            refund_id: Uuid::now_v7(),
            unlock_id,
            user_id,
            refund_amount_local: refund,
            refund_amount_usd: refund.to_usd(rate),
            service_fee_local: service_fee,
            status: RefundStatus::Pending,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_refund_is_paid_minus_fee() {
        let rate = ExchangeRate::new(dec!(1000)).unwrap();
        let refund = AddressUnlockRefund::compute(
            UnlockId::generate(),
            "guest-1".into(),
            LocalAmount::units(300_000),
            LocalAmount::units(15_000),
            rate,
            Utc::now(),
        );
        assert_eq!(refund.refund_amount_local, LocalAmount::units(285_000));
        assert_eq!(refund.refund_amount_usd.value(), dec!(285));
        assert_eq!(refund.status, RefundStatus::Pending);
    }

    #[test]
    fn test_refund_floors_at_zero() {
        let rate = ExchangeRate::new(dec!(1000)).unwrap();
        let refund = AddressUnlockRefund::compute(
            UnlockId::generate(),
            "guest-1".into(),
            LocalAmount::units(10_000),
            LocalAmount::units(15_000),
            rate,
            Utc::now(),
        );
        assert!(refund.refund_amount_local.is_zero());
    }
}
