use crate::domain::money::LocalAmount;
use crate::domain::unlock::{PaymentMethod, PropertyId, UnlockId, UserId};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Admin,
    Guest,
    Host,
}

/// Messages fired by the orchestrator. Delivery is best effort.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    UnlockCompleted {
        unlock_id: UnlockId,
        property_id: PropertyId,
        user_id: UserId,
        payment_method: PaymentMethod,
        amount_local: LocalAmount,
        provider: String,
    },
    UnlockCancelled {
        audience: Audience,
        unlock_id: UnlockId,
        property_id: PropertyId,
        user_id: UserId,
        refund_amount_local: Option<LocalAmount>,
        deal_code: Option<String>,
    },
    DealCodeIssued {
        user_id: UserId,
        code: String,
        source_property_id: PropertyId,
    },
}

impl Notification {
    pub fn audience(&self) -> Audience {
        match self {
            Self::UnlockCompleted { .. } => Audience::Admin,
            Self::UnlockCancelled { audience, .. } => *audience,
            Self::DealCodeIssued { .. } => Audience::Guest,
        }
    }
}
