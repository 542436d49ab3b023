//! Snapshots of entities owned by the wider booking platform.
//!
//! Properties, guests and bookings are referenced by id only; these types are
//! what the unlock core reads from (or hands to) the services that own them.

use crate::domain::unlock::{PropertyId, UnlockId, UserId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAddress {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub district: Option<String>,
    pub country: String,
    #[serde(default)]
    pub latitude: Option<Decimal>,
    #[serde(default)]
    pub longitude: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostContact {
    pub host_id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyListing {
    pub property_id: PropertyId,
    pub title: String,
    /// Monthly rent in USD; `None` for nightly-only listings.
    #[serde(default)]
    pub price_per_month: Option<Decimal>,
    #[serde(default)]
    pub price_per_night: Option<Decimal>,
    pub address: PropertyAddress,
    pub host: HostContact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestProfile {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    Settled,
    Pending,
}

/// Booking handed to the booking service when a deposit unlock converts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub unlock_id: UnlockId,
    pub property_id: PropertyId,
    pub guest_id: UserId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub message: Option<String>,
    pub total_price_usd: Decimal,
    pub paid_amount_usd: Decimal,
    pub deposit_state: SettlementState,
    pub remaining_amount_usd: Decimal,
    pub remaining_state: SettlementState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingReceipt {
    pub booking_id: String,
}
