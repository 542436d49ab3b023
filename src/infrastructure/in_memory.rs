use crate::domain::catalog::{BookingDraft, BookingReceipt, GuestProfile, PropertyListing};
use crate::domain::deal_code::{DealCode, DealCodeRejection, DealCodeUsage};
use crate::domain::notification::Notification;
use crate::domain::ports::{
    BookingService, DealCodeStore, GuestDirectory, Notifier, PropertyCatalog, Redemption,
    RedemptionOutcome, RefundStore, Settlement, UnitOfWork, UnlockStore,
};
use crate::domain::refund::AddressUnlockRefund;
use crate::domain::unlock::{PropertyId, StatusKind, UnlockId, UnlockRecord, UserId};
use crate::error::{Result, UnlockError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    unlocks: HashMap<UnlockId, UnlockRecord>,
    by_slot: HashMap<(UserId, PropertyId), UnlockId>,
    by_reference: HashMap<String, UnlockId>,
    deal_codes: HashMap<Uuid, DealCode>,
    by_code: HashMap<String, Uuid>,
    usages: Vec<DealCodeUsage>,
    refunds: HashMap<UnlockId, AddressUnlockRefund>,
}

impl Tables {
    fn slot(record: &UnlockRecord) -> (UserId, PropertyId) {
        (record.user_id.clone(), record.property_id.clone())
    }

    /// Whether `unlock_id` is stored at exactly `revision`.
    fn at_revision(&self, unlock_id: &UnlockId, revision: u64) -> bool {
        self.unlocks
            .get(unlock_id)
            .is_some_and(|r| r.revision == revision)
    }

    fn put_unlock(&mut self, record: UnlockRecord) {
        if let Some(previous) = self.unlocks.get(&record.unlock_id)
            && previous.transaction_reference != record.transaction_reference
        {
            self.by_reference.remove(&previous.transaction_reference);
        }
        self.by_slot.insert(Self::slot(&record), record.unlock_id);
        self.by_reference
            .insert(record.transaction_reference.clone(), record.unlock_id);
        self.unlocks.insert(record.unlock_id, record);
    }

    fn remove_unlock(&mut self, unlock_id: &UnlockId) {
        if let Some(record) = self.unlocks.remove(unlock_id) {
            self.by_slot.remove(&Self::slot(&record));
            self.by_reference.remove(&record.transaction_reference);
        }
    }

    /// Whether the slot `record` wants is held by `replaces` at its revision,
    /// or is free when nothing is being replaced.
    fn slot_held_by(&self, record: &UnlockRecord, replaces: Option<(UnlockId, u64)>) -> bool {
        match (self.by_slot.get(&Self::slot(record)), replaces) {
            (None, None) => true,
            (Some(occupant), Some((id, revision))) => *occupant == id && self.at_revision(&id, revision),
            _ => false,
        }
    }

    /// Frees the slot held by `unlock_id`. CANCELLED records stay stored.
    fn release_slot(&mut self, unlock_id: &UnlockId) {
        let cancelled = self
            .unlocks
            .get(unlock_id)
            .map(|r| (r.kind() == StatusKind::Cancelled, Self::slot(r)));
        match cancelled {
            Some((true, slot)) => {
                self.by_slot.remove(&slot);
            }
            Some((false, _)) => self.remove_unlock(unlock_id),
            None => {}
        }
    }

    fn put_deal_code(&mut self, code: DealCode) {
        self.by_code.insert(code.code.clone(), code.id);
        self.deal_codes.insert(code.id, code);
    }
}

/// A thread-safe in-memory repository.
///
/// All tables sit behind one `Arc<RwLock<..>>`, so the conditional writes and
/// the multi-table units of work are trivially atomic. Ideal for tests and
/// local runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRepository {
    /// Creates a new, empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UnlockStore for InMemoryRepository {
    async fn insert_unlock(&self, record: UnlockRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.by_slot.contains_key(&Tables::slot(&record)) {
            return Err(UnlockError::Conflict(format!(
                "user {} already has an unlock for property {}",
                record.user_id, record.property_id
            )));
        }
        tables.put_unlock(record);
        Ok(())
    }

    async fn get_unlock(&self, unlock_id: UnlockId) -> Result<Option<UnlockRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.unlocks.get(&unlock_id).cloned())
    }

    async fn find_unlock(&self, user_id: &str, property_id: &str) -> Result<Option<UnlockRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_slot
            .get(&(user_id.to_string(), property_id.to_string()))
            .and_then(|id| tables.unlocks.get(id))
            .cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<UnlockRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_reference
            .get(reference)
            .and_then(|id| tables.unlocks.get(id))
            .cloned())
    }

    async fn unlocks_for_user(&self, user_id: &str) -> Result<Vec<UnlockRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .unlocks
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.unlock_id));
        Ok(records)
    }

    async fn open_unlocks(&self) -> Result<Vec<UnlockRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .unlocks
            .values()
            .filter(|r| r.status.is_open())
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.unlock_id));
        Ok(records)
    }

    async fn update_unlock(&self, record: UnlockRecord, expected_revision: u64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.at_revision(&record.unlock_id, expected_revision) {
            return Ok(false);
        }
        tables.put_unlock(record);
        Ok(true)
    }

    async fn replace_unlock(&self, replaces: (UnlockId, u64), record: UnlockRecord) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.slot_held_by(&record, Some(replaces)) {
            return Ok(false);
        }
        tables.release_slot(&replaces.0);
        tables.put_unlock(record);
        Ok(true)
    }
}

#[async_trait]
impl DealCodeStore for InMemoryRepository {
    async fn insert_deal_code(&self, code: DealCode) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.by_code.contains_key(&code.code) {
            return Err(UnlockError::Conflict(format!("deal code {} already exists", code.code)));
        }
        tables.put_deal_code(code);
        Ok(())
    }

    async fn get_deal_code(&self, id: Uuid) -> Result<Option<DealCode>> {
        let tables = self.tables.read().await;
        Ok(tables.deal_codes.get(&id).cloned())
    }

    async fn find_deal_code(&self, code: &str) -> Result<Option<DealCode>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_code
            .get(code)
            .and_then(|id| tables.deal_codes.get(id))
            .cloned())
    }

    async fn deal_codes_for_user(&self, user_id: &str) -> Result<Vec<DealCode>> {
        let tables = self.tables.read().await;
        let mut codes: Vec<_> = tables
            .deal_codes
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        codes.sort_by_key(|c| (c.generated_at, c.id));
        Ok(codes)
    }

    async fn deal_code_usages(&self, deal_code_id: Uuid) -> Result<Vec<DealCodeUsage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .usages
            .iter()
            .filter(|u| u.deal_code_id == deal_code_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RefundStore for InMemoryRepository {
    async fn refund_for_unlock(&self, unlock_id: UnlockId) -> Result<Option<AddressUnlockRefund>> {
        let tables = self.tables.read().await;
        Ok(tables.refunds.get(&unlock_id).cloned())
    }

    async fn refunds_for_user(&self, user_id: &str) -> Result<Vec<AddressUnlockRefund>> {
        let tables = self.tables.read().await;
        let mut refunds: Vec<_> = tables
            .refunds
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryRepository {
    async fn redeem(&self, redemption: Redemption) -> Result<RedemptionOutcome> {
        let Redemption {
            unlock,
            replaces,
            usage,
        } = redemption;
        let mut tables = self.tables.write().await;

        if tables.usages.iter().any(|u| u.unlock_id == usage.unlock_id) {
            let unlock = tables
                .unlocks
                .get(&usage.unlock_id)
                .cloned()
                .ok_or_else(|| UnlockError::UnlockNotFound(usage.unlock_id.to_string()))?;
            return Ok(RedemptionOutcome::AlreadyRedeemed { unlock });
        }

        let mut code = tables
            .deal_codes
            .get(&usage.deal_code_id)
            .cloned()
            .ok_or(UnlockError::InvalidDealCode(DealCodeRejection::NotFound))?;
        code.check_redemption(&usage.user_id, &unlock.property_id, usage.used_at)
            .map_err(UnlockError::InvalidDealCode)?;
        code.consume().map_err(UnlockError::InvalidDealCode)?;

        if !tables.slot_held_by(&unlock, replaces) {
            return Err(UnlockError::Conflict(format!(
                "unlock slot for property {} changed concurrently",
                unlock.property_id
            )));
        }
        if let Some((id, _)) = replaces {
            tables.release_slot(&id);
        }

        tables.put_unlock(unlock.clone());
        tables.put_deal_code(code.clone());
        tables.usages.push(usage);
        Ok(RedemptionOutcome::Redeemed { unlock, code })
    }

    async fn settle(&self, settlement: Settlement) -> Result<bool> {
        let Settlement {
            unlock,
            expected_revision,
            deal_code,
            refund,
        } = settlement;
        let mut tables = self.tables.write().await;

        if !tables.at_revision(&unlock.unlock_id, expected_revision) {
            return Ok(false);
        }
        if refund.is_some() && tables.refunds.contains_key(&unlock.unlock_id) {
            return Err(UnlockError::Conflict(format!(
                "a refund already exists for unlock {}",
                unlock.unlock_id
            )));
        }
        if let Some(code) = &deal_code
            && tables.by_code.contains_key(&code.code)
        {
            return Err(UnlockError::Conflict(format!("deal code {} already exists", code.code)));
        }

        if let Some(refund) = refund {
            tables.refunds.insert(refund.unlock_id, refund);
        }
        if let Some(code) = deal_code {
            tables.put_deal_code(code);
        }
        tables.put_unlock(unlock);
        Ok(true)
    }
}

/// Seed file accepted by [`InMemoryCatalog::from_json`].
#[derive(Debug, Default, Deserialize)]
struct CatalogSeed {
    #[serde(default)]
    properties: Vec<PropertyListing>,
    #[serde(default)]
    guests: Vec<GuestProfile>,
}

/// Property listings and guest profiles held in memory.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    properties: Arc<RwLock<HashMap<PropertyId, PropertyListing>>>,
    guests: Arc<RwLock<HashMap<UserId, GuestProfile>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{"properties": [...], "guests": [...]}` from disk.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let seed: CatalogSeed = serde_json::from_slice(&raw)
            .map_err(|e| UnlockError::ValidationError(format!("invalid catalog file: {e}")))?;
        Ok(Self {
            properties: Arc::new(RwLock::new(
                seed.properties
                    .into_iter()
                    .map(|p| (p.property_id.clone(), p))
                    .collect(),
            )),
            guests: Arc::new(RwLock::new(
                seed.guests
                    .into_iter()
                    .map(|g| (g.user_id.clone(), g))
                    .collect(),
            )),
        })
    }

    pub async fn insert_property(&self, listing: PropertyListing) {
        self.properties
            .write()
            .await
            .insert(listing.property_id.clone(), listing);
    }

    pub async fn insert_guest(&self, guest: GuestProfile) {
        self.guests.write().await.insert(guest.user_id.clone(), guest);
    }
}

#[async_trait]
impl PropertyCatalog for InMemoryCatalog {
    async fn property(&self, property_id: &str) -> Result<Option<PropertyListing>> {
        Ok(self.properties.read().await.get(property_id).cloned())
    }
}

#[async_trait]
impl GuestDirectory for InMemoryCatalog {
    async fn guest(&self, user_id: &str) -> Result<Option<GuestProfile>> {
        Ok(self.guests.read().await.get(user_id).cloned())
    }
}

/// Accepts every booking and keeps it for inspection. One booking per unlock.
#[derive(Default, Clone)]
pub struct InMemoryBookingService {
    bookings: Arc<RwLock<Vec<(String, BookingDraft)>>>,
}

impl InMemoryBookingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bookings(&self) -> Vec<(String, BookingDraft)> {
        self.bookings.read().await.clone()
    }
}

#[async_trait]
impl BookingService for InMemoryBookingService {
    async fn create_booking(&self, draft: BookingDraft) -> Result<BookingReceipt> {
        let mut bookings = self.bookings.write().await;
        if let Some((booking_id, _)) = bookings.iter().find(|(_, d)| d.unlock_id == draft.unlock_id) {
            return Ok(BookingReceipt {
                booking_id: booking_id.clone(),
            });
        }
        let booking_id = format!("BK-{}", Uuid::now_v7().simple());
        bookings.push((booking_id.clone(), draft));
        Ok(BookingReceipt { booking_id })
    }
}

/// Collects notifications instead of delivering them.
#[derive(Default, Clone)]
pub struct InMemoryOutbox {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryOutbox {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.sent.write().await.push(notification);
        Ok(())
    }
}
