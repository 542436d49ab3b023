use crate::domain::deal_code::{DealCode, DealCodeRejection, DealCodeUsage};
use crate::domain::ports::{
    DealCodeStore, Redemption, RedemptionOutcome, RefundStore, Settlement, UnitOfWork, UnlockStore,
};
use crate::domain::refund::AddressUnlockRefund;
use crate::domain::unlock::{StatusKind, UnlockId, UnlockRecord};
use crate::error::{Result, UnlockError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Unlock records keyed by unlock id.
pub const CF_UNLOCKS: &str = "unlocks";
/// (user, property) slot → unlock id.
pub const CF_UNLOCK_SLOTS: &str = "unlock_slots";
/// Transaction reference → unlock id.
pub const CF_REFERENCES: &str = "references";
/// Deal codes keyed by id.
pub const CF_DEAL_CODES: &str = "deal_codes";
/// Code string → deal code id.
pub const CF_CODE_INDEX: &str = "code_index";
/// Redemption audit rows keyed by deal code id then unlock id.
pub const CF_USAGES: &str = "usages";
/// Refunds keyed by unlock id.
pub const CF_REFUNDS: &str = "refunds";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_UNLOCKS,
    CF_UNLOCK_SLOTS,
    CF_REFERENCES,
    CF_DEAL_CODES,
    CF_CODE_INDEX,
    CF_USAGES,
    CF_REFUNDS,
];

/// A persistent repository backed by RocksDB.
///
/// Every entity and index lives in its own Column Family. Reads go straight
/// to the database; writes are serialized by an async mutex and committed as
/// a single `WriteBatch`, which is what makes the revision checks and units
/// of work atomic.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbRepository {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbRepository {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| UnlockError::internal(format!("{name} column family not found")))
    }

    fn load<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.handle(cf)?, key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn load_id(&self, cf: &str, key: &[u8]) -> Result<Option<Uuid>> {
        match self.db.get_pinned_cf(self.handle(cf)?, key)? {
            Some(bytes) => Uuid::from_slice(&bytes)
                .map(Some)
                .map_err(|e| UnlockError::internal(format!("corrupt index entry in {cf}: {e}"))),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str, prefix: Option<&[u8]>) -> Result<Vec<T>> {
        let mode = match prefix {
            Some(p) => IteratorMode::From(p, Direction::Forward),
            None => IteratorMode::Start,
        };
        let mut items = Vec::new();
        for item in self.db.iterator_cf(self.handle(cf)?, mode) {
            let (key, value) = item?;
            if let Some(p) = prefix
                && !key.starts_with(p)
            {
                break;
            }
            items.push(decode(&value)?);
        }
        Ok(items)
    }

    fn unlock_by_index(&self, cf: &str, key: &[u8]) -> Result<Option<UnlockRecord>> {
        match self.load_id(cf, key)? {
            Some(id) => self.load(CF_UNLOCKS, id.as_bytes()),
            None => Ok(None),
        }
    }

    fn stored_unlock(&self, unlock_id: UnlockId) -> Result<Option<UnlockRecord>> {
        self.load(CF_UNLOCKS, unlock_id.0.as_bytes())
    }

    /// Stages `record` and its indexes, dropping a stale reference entry.
    fn stage_unlock(
        &self,
        batch: &mut WriteBatch,
        record: &UnlockRecord,
        previous: Option<&UnlockRecord>,
    ) -> Result<()> {
        if let Some(previous) = previous
            && previous.transaction_reference != record.transaction_reference
        {
            batch.delete_cf(
                self.handle(CF_REFERENCES)?,
                previous.transaction_reference.as_bytes(),
            );
        }
        let id = record.unlock_id.0.as_bytes();
        batch.put_cf(self.handle(CF_UNLOCKS)?, id, encode(record)?);
        batch.put_cf(
            self.handle(CF_UNLOCK_SLOTS)?,
            slot_key(&record.user_id, &record.property_id),
            id,
        );
        batch.put_cf(
            self.handle(CF_REFERENCES)?,
            record.transaction_reference.as_bytes(),
            id,
        );
        Ok(())
    }

    fn stage_removal(&self, batch: &mut WriteBatch, record: &UnlockRecord) -> Result<()> {
        batch.delete_cf(self.handle(CF_UNLOCKS)?, record.unlock_id.0.as_bytes());
        batch.delete_cf(
            self.handle(CF_UNLOCK_SLOTS)?,
            slot_key(&record.user_id, &record.property_id),
        );
        batch.delete_cf(
            self.handle(CF_REFERENCES)?,
            record.transaction_reference.as_bytes(),
        );
        Ok(())
    }

    /// Checks the slot `record` wants is free, or held by `replaces` at its
    /// revision, and returns the occupant.
    fn claim_slot(
        &self,
        record: &UnlockRecord,
        replaces: Option<(UnlockId, u64)>,
    ) -> Result<Option<Option<UnlockRecord>>> {
        let occupant = self.unlock_by_index(
            CF_UNLOCK_SLOTS,
            &slot_key(&record.user_id, &record.property_id),
        )?;
        let held = match (&occupant, replaces) {
            (None, None) => true,
            (Some(current), Some((id, revision))) => current.unlock_id == id && current.revision == revision,
            _ => false,
        };
        Ok(held.then_some(occupant))
    }

    /// CANCELLED occupants stay stored; the newcomer overwrites their slot entry.
    fn stage_release(&self, batch: &mut WriteBatch, occupant: &UnlockRecord) -> Result<()> {
        if occupant.kind() == StatusKind::Cancelled {
            return Ok(());
        }
        self.stage_removal(batch, occupant)
    }

    fn stage_deal_code(&self, batch: &mut WriteBatch, code: &DealCode) -> Result<()> {
        batch.put_cf(self.handle(CF_DEAL_CODES)?, code.id.as_bytes(), encode(code)?);
        batch.put_cf(
            self.handle(CF_CODE_INDEX)?,
            code.code.as_bytes(),
            code.id.as_bytes(),
        );
        Ok(())
    }

    fn code_exists(&self, code: &str) -> Result<bool> {
        Ok(self
            .db
            .get_pinned_cf(self.handle(CF_CODE_INDEX)?, code.as_bytes())?
            .is_some())
    }
}

fn slot_key(user_id: &str, property_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + property_id.len() + 1);
    key.extend_from_slice(user_id.as_bytes());
    key.push(0x1f);
    key.extend_from_slice(property_id.as_bytes());
    key
}

fn usage_key(deal_code_id: Uuid, unlock_id: UnlockId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(deal_code_id.as_bytes());
    key.extend_from_slice(unlock_id.0.as_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| UnlockError::internal(format!("Serialization error: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| UnlockError::internal(format!("Deserialization error: {e}")))
}

#[async_trait]
impl UnlockStore for RocksDbRepository {
    async fn insert_unlock(&self, record: UnlockRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.load_id(CF_UNLOCK_SLOTS, &slot_key(&record.user_id, &record.property_id))?.is_some() {
            return Err(UnlockError::Conflict(format!(
                "user {} already has an unlock for property {}",
                record.user_id, record.property_id
            )));
        }
        let mut batch = WriteBatch::default();
        self.stage_unlock(&mut batch, &record, None)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_unlock(&self, unlock_id: UnlockId) -> Result<Option<UnlockRecord>> {
        self.load(CF_UNLOCKS, unlock_id.0.as_bytes())
    }

    async fn find_unlock(&self, user_id: &str, property_id: &str) -> Result<Option<UnlockRecord>> {
        self.unlock_by_index(CF_UNLOCK_SLOTS, &slot_key(user_id, property_id))
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<UnlockRecord>> {
        self.unlock_by_index(CF_REFERENCES, reference.as_bytes())
    }

    async fn unlocks_for_user(&self, user_id: &str) -> Result<Vec<UnlockRecord>> {
        let mut records: Vec<UnlockRecord> = self.scan(CF_UNLOCKS, None)?;
        records.retain(|r| r.user_id == user_id);
        records.sort_by_key(|r| (r.created_at, r.unlock_id));
        Ok(records)
    }

    async fn open_unlocks(&self) -> Result<Vec<UnlockRecord>> {
        let mut records: Vec<UnlockRecord> = self.scan(CF_UNLOCKS, None)?;
        records.retain(|r| r.status.is_open());
        records.sort_by_key(|r| (r.created_at, r.unlock_id));
        Ok(records)
    }

    async fn update_unlock(&self, record: UnlockRecord, expected_revision: u64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(current) = self.stored_unlock(record.unlock_id)? else {
            return Ok(false);
        };
        if current.revision != expected_revision {
            return Ok(false);
        }
        let mut batch = WriteBatch::default();
        self.stage_unlock(&mut batch, &record, Some(&current))?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn replace_unlock(&self, replaces: (UnlockId, u64), record: UnlockRecord) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(Some(occupant)) = self.claim_slot(&record, Some(replaces))? else {
            return Ok(false);
        };
        let mut batch = WriteBatch::default();
        self.stage_release(&mut batch, &occupant)?;
        self.stage_unlock(&mut batch, &record, None)?;
        self.db.write(batch)?;
        Ok(true)
    }
}

#[async_trait]
impl DealCodeStore for RocksDbRepository {
    async fn insert_deal_code(&self, code: DealCode) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.code_exists(&code.code)? {
            return Err(UnlockError::Conflict(format!("deal code {} already exists", code.code)));
        }
        let mut batch = WriteBatch::default();
        self.stage_deal_code(&mut batch, &code)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_deal_code(&self, id: Uuid) -> Result<Option<DealCode>> {
        self.load(CF_DEAL_CODES, id.as_bytes())
    }

    async fn find_deal_code(&self, code: &str) -> Result<Option<DealCode>> {
        match self.load_id(CF_CODE_INDEX, code.as_bytes())? {
            Some(id) => self.load(CF_DEAL_CODES, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn deal_codes_for_user(&self, user_id: &str) -> Result<Vec<DealCode>> {
        let mut codes: Vec<DealCode> = self.scan(CF_DEAL_CODES, None)?;
        codes.retain(|c| c.user_id == user_id);
        codes.sort_by_key(|c| (c.generated_at, c.id));
        Ok(codes)
    }

    async fn deal_code_usages(&self, deal_code_id: Uuid) -> Result<Vec<DealCodeUsage>> {
        self.scan(CF_USAGES, Some(&deal_code_id.as_bytes()[..]))
    }
}

#[async_trait]
impl RefundStore for RocksDbRepository {
    async fn refund_for_unlock(&self, unlock_id: UnlockId) -> Result<Option<AddressUnlockRefund>> {
        self.load(CF_REFUNDS, unlock_id.0.as_bytes())
    }

    async fn refunds_for_user(&self, user_id: &str) -> Result<Vec<AddressUnlockRefund>> {
        let mut refunds: Vec<AddressUnlockRefund> = self.scan(CF_REFUNDS, None)?;
        refunds.retain(|r| r.user_id == user_id);
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }
}

#[async_trait]
impl UnitOfWork for RocksDbRepository {
    async fn redeem(&self, redemption: Redemption) -> Result<RedemptionOutcome> {
        let Redemption {
            unlock,
            replaces,
            usage,
        } = redemption;
        let _guard = self.write_lock.lock().await;

        let usage_key = usage_key(usage.deal_code_id, usage.unlock_id);
        if self
            .db
            .get_pinned_cf(self.handle(CF_USAGES)?, &usage_key)?
            .is_some()
        {
            let unlock = self
                .stored_unlock(usage.unlock_id)?
                .ok_or_else(|| UnlockError::UnlockNotFound(usage.unlock_id.to_string()))?;
            return Ok(RedemptionOutcome::AlreadyRedeemed { unlock });
        }

        let mut code: DealCode = self
            .load(CF_DEAL_CODES, usage.deal_code_id.as_bytes())?
            .ok_or(UnlockError::InvalidDealCode(DealCodeRejection::NotFound))?;
        code.check_redemption(&usage.user_id, &unlock.property_id, usage.used_at)
            .map_err(UnlockError::InvalidDealCode)?;
        code.consume().map_err(UnlockError::InvalidDealCode)?;

        let Some(occupant) = self.claim_slot(&unlock, replaces)? else {
            return Err(UnlockError::Conflict(format!(
                "unlock slot for property {} changed concurrently",
                unlock.property_id
            )));
        };
        let mut batch = WriteBatch::default();
        if let Some(occupant) = &occupant {
            self.stage_release(&mut batch, occupant)?;
        }

        self.stage_unlock(&mut batch, &unlock, None)?;
        self.stage_deal_code(&mut batch, &code)?;
        batch.put_cf(self.handle(CF_USAGES)?, &usage_key, encode(&usage)?);
        self.db.write(batch)?;

        Ok(RedemptionOutcome::Redeemed { unlock, code })
    }

    async fn settle(&self, settlement: Settlement) -> Result<bool> {
        let Settlement {
            unlock,
            expected_revision,
            deal_code,
            refund,
        } = settlement;
        let _guard = self.write_lock.lock().await;

        let Some(current) = self.stored_unlock(unlock.unlock_id)? else {
            return Ok(false);
        };
        if current.revision != expected_revision {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        if let Some(refund) = &refund {
            let key = refund.unlock_id.0.as_bytes();
            if self.db.get_pinned_cf(self.handle(CF_REFUNDS)?, key)?.is_some() {
                return Err(UnlockError::Conflict(format!(
                    "a refund already exists for unlock {}",
                    refund.unlock_id
                )));
            }
            batch.put_cf(self.handle(CF_REFUNDS)?, key, encode(refund)?);
        }
        if let Some(code) = &deal_code {
            if self.code_exists(&code.code)? {
                return Err(UnlockError::Conflict(format!("deal code {} already exists", code.code)));
            }
            self.stage_deal_code(&mut batch, code)?;
        }
        self.stage_unlock(&mut batch, &unlock, Some(&current))?;
        self.db.write(batch)?;
        Ok(true)
    }
}
