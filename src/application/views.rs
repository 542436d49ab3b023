//! Request and response shapes of the orchestrator's operations.

use crate::domain::catalog::{HostContact, PropertyAddress, PropertyListing};
use crate::domain::deal_code::DealCode;
use crate::domain::money::{ExchangeRate, LocalAmount, UsdAmount};
use crate::domain::refund::AddressUnlockRefund;
use crate::domain::unlock::{AppreciationLevel, PaymentMethod, StatusKind, UnlockId, UnlockRecord};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct InitiateUnlockRequest {
    pub property_id: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_provider: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub deal_code: Option<String>,
    /// Shown to the guest by the client; never charged.
    #[serde(default)]
    pub client_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub check_in: NaiveDate,
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
    #[serde(default)]
    pub guests: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Money as charged, with the rate needed to reproduce it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargedAmount {
    pub amount_local: LocalAmount,
    pub amount_usd: UsdAmount,
    pub exchange_rate: ExchangeRate,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnlockSummary {
    pub unlock_id: UnlockId,
    pub property_id: String,
    pub payment_method: PaymentMethod,
    pub payment_provider: String,
    pub status: StatusKind,
    pub transaction_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    pub payment: ChargedAmount,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub appreciation_submitted: bool,
    pub appreciation_level: Option<AppreciationLevel>,
    pub deal_code_id: Option<Uuid>,
    pub booking_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UnlockSummary {
    pub fn from_record(record: &UnlockRecord, currency: &str) -> Self {
        Self {
            unlock_id: record.unlock_id,
            property_id: record.property_id.clone(),
            payment_method: record.payment_method,
            payment_provider: record.provider.to_string(),
            status: record.kind(),
            transaction_reference: record.transaction_reference.clone(),
            payment_url: record.payment_url.clone(),
            payment: ChargedAmount {
                amount_local: record.amount_local,
                amount_usd: record.amount_usd,
                exchange_rate: record.exchange_rate,
                currency: currency.to_string(),
            },
            unlocked_at: record.unlocked_at(),
            appreciation_submitted: record.appreciation_submitted(),
            appreciation_level: record.appreciation.as_ref().map(|a| a.level),
            deal_code_id: record.deal_code_id,
            booking_id: record.booking_id.clone(),
            created_at: record.created_at,
        }
    }
}

/// What a completed unlock reveals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnlockedProperty {
    pub title: String,
    pub address: PropertyAddress,
    pub host_contact_info: HostContact,
}

impl From<PropertyListing> for UnlockedProperty {
    fn from(listing: PropertyListing) -> Self {
        Self {
            title: listing.title,
            address: listing.address,
            host_contact_info: listing.host,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiateUnlockOutcome {
    pub unlock: UnlockSummary,
    /// An open attempt already existed and was returned as-is.
    pub resumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<UnlockedProperty>,
}

/// Guests only see the address and host once payment has cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnlockStatusView {
    NotUnlocked {
        property_id: String,
    },
    Locked {
        unlock: UnlockSummary,
    },
    Unlocked {
        unlock: UnlockSummary,
        property: UnlockedProperty,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppreciationOutcome {
    pub unlock: UnlockSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_code: Option<DealCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancellationOutcome {
    pub unlock: UnlockSummary,
    pub refund_eligible: bool,
    pub refund: Option<AddressUnlockRefund>,
    pub deal_code: Option<DealCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingOutcome {
    pub booking_id: String,
    pub unlock_id: UnlockId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub total_price_usd: Decimal,
    pub paid_amount_usd: Decimal,
    pub remaining_amount_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Applied {
        unlock_id: UnlockId,
        from: StatusKind,
        to: StatusKind,
    },
    /// Replay of a status the record already reflects.
    Duplicate { unlock_id: UnlockId, status: StatusKind },
    /// Out-of-order report that would break the state machine.
    Ignored {
        unlock_id: UnlockId,
        status: StatusKind,
        reason: String,
    },
    NotFound,
}

impl CallbackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Duplicate { .. } => "duplicate",
            Self::Ignored { .. } => "ignored",
            Self::NotFound => "not_found",
        }
    }
}
