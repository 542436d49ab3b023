use crate::domain::money::{ExchangeRate, LocalAmount, UsdAmount};
use crate::error::UnlockError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type UserId = String;
pub type PropertyId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnlockId(pub Uuid);

impl UnlockId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for UnlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UnlockId {
    type Err = UnlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| UnlockError::UnlockNotFound(s.to_string()))
    }
}

/// How the guest pays for an unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "non_refundable_fee")]
    NonRefundableFee,
    #[serde(rename = "three_month_30_percent")]
    ThreeMonth30Percent,
}

impl PaymentMethod {
    /// Only the deposit method earns deal codes and refunds.
    pub fn is_refundable(&self) -> bool {
        matches!(self, Self::ThreeMonth30Percent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonRefundableFee => "non_refundable_fee",
            Self::ThreeMonth30Percent => "three_month_30_percent",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper-case provider code such as `MTN_RW`, `XENTRIPAY_CARD` or `DEAL_CODE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderCode(String);

impl ProviderCode {
    pub const DEAL_CODE: &'static str = "DEAL_CODE";

    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn deal_code() -> Self {
        Self(Self::DEAL_CODE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits `MTN_RW` into `("MTN", Some("RW"))`.
    pub fn operator_and_country(&self) -> (&str, Option<&str>) {
        match self.0.rsplit_once('_') {
            Some((operator, country)) if country.len() == 2 => (operator, Some(country)),
            _ => (self.0.as_str(), None),
        }
    }
}

impl fmt::Display for ProviderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flat view of [`PaymentStatus`] used for comparisons, logs and wire output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Pending,
    Submitted,
    Completed,
    Failed,
    Cancelled,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Submitted => "SUBMITTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle of an unlock. Data that only exists in a given state
/// lives inside that variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Submitted,
    Completed {
        unlocked_at: DateTime<Utc>,
    },
    Failed {
        reason: Option<String>,
    },
    Cancelled {
        unlocked_at: DateTime<Utc>,
        cancelled_at: DateTime<Utc>,
        refund_eligible: bool,
    },
}

impl PaymentStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Pending => StatusKind::Pending,
            Self::Submitted => StatusKind::Submitted,
            Self::Completed { .. } => StatusKind::Completed,
            Self::Failed { .. } => StatusKind::Failed,
            Self::Cancelled { .. } => StatusKind::Cancelled,
        }
    }

    /// PENDING or SUBMITTED: money may still move.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Submitted)
    }
}

/// A status as reported by a gateway, callback or reconciliation poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    Submitted,
    Completed,
    Failed,
}

impl GatewayStatus {
    /// Maps provider vocabularies onto the three outcomes we track.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "SUBMITTED" | "ACCEPTED" | "ENQUEUED" | "PROCESSING"
            | "DUPLICATE_IGNORED" => Some(Self::Submitted),
            "COMPLETED" | "SUCCESS" | "SUCCESSFUL" | "PAID" => Some(Self::Completed),
            "FAILED" | "REJECTED" | "CANCELLED" | "EXPIRED" | "DECLINED" => Some(Self::Failed),
            _ => None,
        }
    }

    fn target(&self) -> StatusKind {
        match self {
            Self::Submitted => StatusKind::Submitted,
            Self::Completed => StatusKind::Completed,
            Self::Failed => StatusKind::Failed,
        }
    }
}

impl FromStr for GatewayStatus {
    type Err = UnlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnlockError::ValidationError(format!("unknown payment status '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppreciationLevel {
    Appreciated,
    Neutral,
    NotAppreciated,
    Cancelled,
}

impl AppreciationLevel {
    /// Guests who were not won over get another try on the house.
    pub fn earns_deal_code(&self) -> bool {
        matches!(self, Self::Neutral | Self::NotAppreciated)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appreciation {
    pub level: AppreciationLevel,
    pub feedback: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Outcome of applying a status to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed { from: StatusKind, to: StatusKind },
    Unchanged,
}

/// One unlock attempt for a (user, property) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockRecord {
    pub unlock_id: UnlockId,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub amount_local: LocalAmount,
    pub amount_usd: UsdAmount,
    pub exchange_rate: ExchangeRate,
    pub provider: ProviderCode,
    pub transaction_reference: String,
    pub payment_url: Option<String>,
    pub status: PaymentStatus,
    pub appreciation: Option<Appreciation>,
    pub deal_code_id: Option<Uuid>,
    pub booking_id: Option<String>,
    /// Bumped on every write; stores only accept an update whose base
    /// revision matches what they hold.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields fixed at initiation time.
#[derive(Debug, Clone)]
pub struct NewUnlock {
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub amount_local: LocalAmount,
    pub amount_usd: UsdAmount,
    pub exchange_rate: ExchangeRate,
    pub provider: ProviderCode,
}

impl UnlockRecord {
    pub fn pending(new: NewUnlock, now: DateTime<Utc>) -> Self {
        let unlock_id = UnlockId::generate();
        Self {
            transaction_reference: transaction_reference(&unlock_id),
            unlock_id,
            property_id: new.property_id,
            user_id: new.user_id,
            payment_method: new.payment_method,
            amount_local: new.amount_local,
            amount_usd: new.amount_usd,
            exchange_rate: new.exchange_rate,
            provider: new.provider,
            payment_url: None,
            status: PaymentStatus::Pending,
            appreciation: None,
            deal_code_id: None,
            booking_id: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// A record paid entirely with a deal code: completed on creation.
    pub fn redeemed(
        property_id: PropertyId,
        user_id: UserId,
        payment_method: PaymentMethod,
        exchange_rate: ExchangeRate,
        deal_code_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::pending(
            NewUnlock {
                property_id,
                user_id,
                payment_method,
                amount_local: LocalAmount::ZERO,
                amount_usd: UsdAmount::ZERO,
                exchange_rate,
                provider: ProviderCode::deal_code(),
            },
            now,
        );
        record.status = PaymentStatus::Completed { unlocked_at: now };
        record.deal_code_id = Some(deal_code_id);
        record
    }

    pub fn kind(&self) -> StatusKind {
        self.status.kind()
    }

    pub fn unlocked_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            PaymentStatus::Completed { unlocked_at } | PaymentStatus::Cancelled { unlocked_at, .. } => {
                Some(unlocked_at)
            }
            _ => None,
        }
    }

    pub fn appreciation_submitted(&self) -> bool {
        self.appreciation.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.kind() == StatusKind::Completed
    }

    /// Paid with money under the deposit method. Only these earn refunds,
    /// compensation codes and booking conversion; a deal-code unlock inherits
    /// the method but moved no money.
    pub fn paid_as_deposit(&self) -> bool {
        self.payment_method.is_refundable() && self.deal_code_id.is_none()
    }

    /// Stores what the rail handed back at dispatch time.
    pub fn record_dispatch(
        &mut self,
        provider_reference: Option<String>,
        payment_url: Option<String>,
        now: DateTime<Utc>,
    ) {
        if provider_reference.is_none() && payment_url.is_none() {
            return;
        }
        if let Some(reference) = provider_reference {
            self.transaction_reference = reference;
        }
        if payment_url.is_some() {
            self.payment_url = payment_url;
        }
        self.touch(now);
    }

    /// Applies a gateway-reported status.
    ///
    /// COMPLETED is a fixed point: replays and late SUBMITTED reports leave the
    /// record untouched, so `unlocked_at` keeps its first value.
    pub fn apply_gateway_status(
        &mut self,
        reported: GatewayStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, UnlockError> {
        let from = self.kind();
        let next = match (&self.status, reported) {
            (PaymentStatus::Pending, GatewayStatus::Submitted) => PaymentStatus::Submitted,
            (PaymentStatus::Submitted, GatewayStatus::Submitted) => return Ok(Transition::Unchanged),
            (PaymentStatus::Pending | PaymentStatus::Submitted, GatewayStatus::Completed) => {
                PaymentStatus::Completed { unlocked_at: now }
            }
            (PaymentStatus::Pending | PaymentStatus::Submitted, GatewayStatus::Failed) => {
                PaymentStatus::Failed { reason: None }
            }
            (PaymentStatus::Completed { .. } | PaymentStatus::Cancelled { .. }, GatewayStatus::Completed | GatewayStatus::Submitted)
            | (PaymentStatus::Failed { .. }, GatewayStatus::Failed) => {
                return Ok(Transition::Unchanged);
            }
            _ => {
                return Err(UnlockError::InvalidTransition {
                    from,
                    to: reported.target(),
                });
            }
        };
        Ok(self.set_status(next, now))
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<Transition, UnlockError> {
        if !self.status.is_open() {
            return Err(UnlockError::InvalidTransition {
                from: self.kind(),
                to: StatusKind::Failed,
            });
        }
        Ok(self.set_status(
            PaymentStatus::Failed {
                reason: Some(reason.into()),
            },
            now,
        ))
    }

    /// Records guest feedback once, on a completed unlock.
    pub fn record_appreciation(
        &mut self,
        level: AppreciationLevel,
        feedback: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), UnlockError> {
        if self.appreciation_submitted() {
            return Err(UnlockError::AlreadyAppreciated);
        }
        if !self.is_completed() {
            return Err(UnlockError::PaymentNotCompleted(self.kind()));
        }
        self.appreciation = Some(Appreciation {
            level,
            feedback,
            submitted_at: now,
        });
        self.touch(now);
        Ok(())
    }

    /// COMPLETED → CANCELLED. Consumes the write-once feedback slot.
    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<Transition, UnlockError> {
        let unlocked_at = match self.status {
            PaymentStatus::Completed { unlocked_at } => unlocked_at,
            _ if self.appreciation_submitted() => return Err(UnlockError::AlreadyAppreciated),
            _ => return Err(UnlockError::PendingPaymentNotCancellable(self.kind())),
        };
        if self.appreciation_submitted() {
            return Err(UnlockError::AlreadyAppreciated);
        }
        self.appreciation = Some(Appreciation {
            level: AppreciationLevel::Cancelled,
            feedback: reason,
            submitted_at: now,
        });
        Ok(self.set_status(
            PaymentStatus::Cancelled {
                unlocked_at,
                cancelled_at: now,
                refund_eligible: self.paid_as_deposit(),
            },
            now,
        ))
    }

    pub fn attach_booking(&mut self, booking_id: String, now: DateTime<Utc>) -> Result<(), UnlockError> {
        if self.booking_id.is_some() {
            return Err(UnlockError::BookingAlreadyCreated(self.unlock_id.to_string()));
        }
        self.booking_id = Some(booking_id);
        self.touch(now);
        Ok(())
    }

    fn set_status(&mut self, next: PaymentStatus, now: DateTime<Utc>) -> Transition {
        let from = self.kind();
        let to = next.kind();
        self.status = next;
        self.touch(now);
        Transition::Changed { from, to }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        self.updated_at = now;
    }
}

fn transaction_reference(unlock_id: &UnlockId) -> String {
    let simple = unlock_id.0.simple().to_string().to_ascii_uppercase();
    format!("UNLOCK-{}", &simple[simple.len() - 16..])
}
