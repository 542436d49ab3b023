use crate::domain::unlock::{PropertyId, UnlockId, UserId};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Alphabet for generated codes: no 0/O or 1/I lookalikes.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 8;

/// A single-use, time-limited token that pays for one unlock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealCode {
    pub id: Uuid,
    pub code: String,
    pub user_id: UserId,
    pub source_property_id: PropertyId,
    pub remaining_unlocks: u32,
    pub is_active: bool,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Why a deal code cannot be used. Checked in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DealCodeRejection {
    NotFound,
    NotOwner,
    Inactive,
    Exhausted,
    Expired { expired_at: DateTime<Utc> },
    /// Codes compensate for one property and pay for another.
    SameProperty,
}

impl DealCodeRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotOwner => "not_owner",
            Self::Inactive => "inactive",
            Self::Exhausted => "exhausted",
            Self::Expired { .. } => "expired",
            Self::SameProperty => "same_property",
        }
    }
}

impl fmt::Display for DealCodeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("deal code does not exist"),
            Self::NotOwner => f.write_str("deal code belongs to another user"),
            Self::Inactive => f.write_str("deal code has been deactivated"),
            Self::Exhausted => f.write_str("deal code has no remaining unlocks"),
            Self::Expired { expired_at } => {
                write!(f, "deal code expired on {}", expired_at.format("%Y-%m-%d"))
            }
            Self::SameProperty => f.write_str("deal code cannot unlock the property it was issued for"),
        }
    }
}

impl DealCode {
    pub fn issue(
        code: String,
        user_id: UserId,
        source_property_id: PropertyId,
        now: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            code,
            user_id,
            source_property_id,
            remaining_unlocks: 1,
            is_active: true,
            generated_at: now,
            expires_at: now + validity,
        }
    }

    /// Ownership → active → remaining → expiry; the first failure wins.
    pub fn check(&self, requester: &str, now: DateTime<Utc>) -> Result<(), DealCodeRejection> {
        if self.user_id != requester {
            return Err(DealCodeRejection::NotOwner);
        }
        if !self.is_active {
            return Err(DealCodeRejection::Inactive);
        }
        if self.remaining_unlocks == 0 {
            return Err(DealCodeRejection::Exhausted);
        }
        if now >= self.expires_at {
            return Err(DealCodeRejection::Expired {
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// [`DealCode::check`], then refuses the property the code was issued for.
    pub fn check_redemption(
        &self,
        requester: &str,
        property_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DealCodeRejection> {
        self.check(requester, now)?;
        if self.source_property_id == property_id {
            return Err(DealCodeRejection::SameProperty);
        }
        Ok(())
    }

    /// Burns one unlock; the code deactivates when none remain.
    pub fn consume(&mut self) -> Result<(), DealCodeRejection> {
        if !self.is_active {
            return Err(DealCodeRejection::Inactive);
        }
        if self.remaining_unlocks == 0 {
            return Err(DealCodeRejection::Exhausted);
        }
        self.remaining_unlocks -= 1;
        if self.remaining_unlocks == 0 {
            self.is_active = false;
        }
        Ok(())
    }
}

/// Append-only audit row, one per successful redemption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealCodeUsage {
    pub deal_code_id: Uuid,
    pub unlock_id: UnlockId,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub used_at: DateTime<Utc>,
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Uppercases and strips whitespace so codes typed by hand still match.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}
