use super::catalog::{BookingDraft, BookingReceipt, GuestProfile, PropertyListing};
use super::deal_code::{DealCode, DealCodeUsage};
use super::money::{ExchangeRate, LocalAmount, UsdAmount};
use super::notification::Notification;
use super::refund::AddressUnlockRefund;
use super::unlock::{GatewayStatus, PaymentMethod, ProviderCode, UnlockId, UnlockRecord};
use crate::error::{GatewayError, RateError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[async_trait]
pub trait UnlockStore: Send + Sync {
    /// Fails with `Conflict` when the (user, property) slot is taken.
    async fn insert_unlock(&self, record: UnlockRecord) -> Result<()>;
    async fn get_unlock(&self, unlock_id: UnlockId) -> Result<Option<UnlockRecord>>;
    async fn find_unlock(&self, user_id: &str, property_id: &str) -> Result<Option<UnlockRecord>>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<UnlockRecord>>;
    async fn unlocks_for_user(&self, user_id: &str) -> Result<Vec<UnlockRecord>>;
    /// PENDING and SUBMITTED records, oldest first.
    async fn open_unlocks(&self) -> Result<Vec<UnlockRecord>>;
    /// Writes `record` only if the stored copy is still at `expected_revision`.
    async fn update_unlock(&self, record: UnlockRecord, expected_revision: u64) -> Result<bool>;
    /// Swaps the terminal record holding the (user, property) slot for
    /// `record` in one write. Returns `false` if the slot is no longer held
    /// by `replaces` at its revision. A CANCELLED occupant is kept as history
    /// since its refund points at it; other occupants are removed.
    async fn replace_unlock(&self, replaces: (UnlockId, u64), record: UnlockRecord) -> Result<bool>;
}

#[async_trait]
pub trait DealCodeStore: Send + Sync {
    /// Fails with `Conflict` when the code string already exists.
    async fn insert_deal_code(&self, code: DealCode) -> Result<()>;
    async fn get_deal_code(&self, id: Uuid) -> Result<Option<DealCode>>;
    async fn find_deal_code(&self, code: &str) -> Result<Option<DealCode>>;
    async fn deal_codes_for_user(&self, user_id: &str) -> Result<Vec<DealCode>>;
    async fn deal_code_usages(&self, deal_code_id: Uuid) -> Result<Vec<DealCodeUsage>>;
}

#[async_trait]
pub trait RefundStore: Send + Sync {
    async fn refund_for_unlock(&self, unlock_id: UnlockId) -> Result<Option<AddressUnlockRefund>>;
    async fn refunds_for_user(&self, user_id: &str) -> Result<Vec<AddressUnlockRefund>>;
}

/// A deal-code payment: the completed record, the code decrement and the
/// usage row are written together or not at all.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub unlock: UnlockRecord,
    /// Terminal record holding the slot, with its revision. Replaced the same
    /// way as [`UnlockStore::replace_unlock`].
    pub replaces: Option<(UnlockId, u64)>,
    pub usage: DealCodeUsage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedemptionOutcome {
    Redeemed { unlock: UnlockRecord, code: DealCode },
    /// A usage row for this unlock already existed; nothing was decremented.
    AlreadyRedeemed { unlock: UnlockRecord },
}

/// Feedback or cancellation outcome applied as one write.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub unlock: UnlockRecord,
    pub expected_revision: u64,
    pub deal_code: Option<DealCode>,
    pub refund: Option<AddressUnlockRefund>,
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Re-validates the code inside the write (including the source property
    /// rule) and rejects with `InvalidDealCode` if a concurrent redemption
    /// emptied it.
    async fn redeem(&self, redemption: Redemption) -> Result<RedemptionOutcome>;
    /// Returns `false` when the unlock moved past `expected_revision`.
    async fn settle(&self, settlement: Settlement) -> Result<bool>;
}

pub trait Repository: UnlockStore + DealCodeStore + RefundStore + UnitOfWork {}

impl<T> Repository for T where T: UnlockStore + DealCodeStore + RefundStore + UnitOfWork {}

// ---------------------------------------------------------------------------
// Payment rails
// ---------------------------------------------------------------------------

/// Everything a rail may need to collect an unlock fee.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub unlock_id: UnlockId,
    pub reference: String,
    pub provider: ProviderCode,
    pub payment_method: PaymentMethod,
    pub property_id: String,
    pub property_title: String,
    pub amount_local: LocalAmount,
    pub amount_usd: UsdAmount,
    pub exchange_rate: ExchangeRate,
    pub currency: String,
    /// Guest as known to the user service, never as typed by the client.
    pub guest: GuestProfile,
    /// Phone typed by the guest for wallet rails.
    pub payer_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeReceipt {
    /// Replaces our reference when the provider assigns its own.
    pub provider_reference: Option<String>,
    pub payment_url: Option<String>,
    /// `None` leaves the record PENDING until the provider calls back.
    pub status: Option<GatewayStatus>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    fn handles(&self, provider: &ProviderCode) -> bool;

    /// Request checks run before anything is persisted.
    fn preflight(&self, _provider: &ProviderCode, _payer_phone: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn dispatch(&self, charge: &ChargeRequest) -> std::result::Result<ChargeReceipt, GatewayError>;

    /// Authoritative status from the provider; `None` if it has no record.
    async fn fetch_status(&self, reference: &str) -> std::result::Result<Option<GatewayStatus>, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub payer_phone: String,
    pub operator_code: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepositResponse {
    #[serde(default)]
    pub provider_status: Option<String>,
}

#[async_trait]
pub trait MobileMoneyClient: Send + Sync {
    async fn initiate_deposit(&self, request: DepositRequest) -> std::result::Result<DepositResponse, GatewayError>;
    async fn deposit_status(&self, reference: &str) -> std::result::Result<Option<String>, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub customer_email: String,
    pub customer_name: String,
    pub amount_usd: Decimal,
    pub phone_local: String,
    pub phone_intl: String,
    pub currency: String,
    pub reference: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResponse {
    pub provider_reference: String,
    pub payment_url: String,
}

#[async_trait]
pub trait CardClient: Send + Sync {
    async fn initiate_collection(
        &self,
        request: CollectionRequest,
    ) -> std::result::Result<CollectionResponse, GatewayError>;
    async fn collection_status(&self, reference: &str) -> std::result::Result<Option<String>, GatewayError>;
}

// ---------------------------------------------------------------------------
// Other collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateQuote {
    pub rate: ExchangeRate,
    pub as_of: DateTime<Utc>,
}

#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    async fn get_rate(&self, base: &str, quote: &str) -> std::result::Result<RateQuote, RateError>;
}

#[async_trait]
pub trait PropertyCatalog: Send + Sync {
    async fn property(&self, property_id: &str) -> Result<Option<PropertyListing>>;
}

#[async_trait]
pub trait GuestDirectory: Send + Sync {
    async fn guest(&self, user_id: &str) -> Result<Option<GuestProfile>>;
}

#[async_trait]
pub trait BookingService: Send + Sync {
    /// `draft.unlock_id` is an idempotency key: a repeated draft for the same
    /// unlock returns the booking created the first time.
    async fn create_booking(&self, draft: BookingDraft) -> Result<BookingReceipt>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

pub type RepositoryRef = Arc<dyn Repository>;
pub type GatewayRef = Arc<dyn PaymentGateway>;
pub type RateSourceRef = Arc<dyn ExchangeRateSource>;
pub type CatalogRef = Arc<dyn PropertyCatalog>;
pub type GuestDirectoryRef = Arc<dyn GuestDirectory>;
pub type BookingServiceRef = Arc<dyn BookingService>;
pub type NotifierRef = Arc<dyn Notifier>;
