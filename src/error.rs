use crate::domain::deal_code::DealCodeRejection;
use crate::domain::unlock::StatusKind;
use thiserror::Error;

/// Errors raised while orchestrating address unlocks.
///
/// Validation variants are returned before any record is touched. Storage and
/// gateway variants may leave a state transition behind (see
/// [`UnlockError::GatewayDispatchFailed`]).
#[derive(Error, Debug)]
pub enum UnlockError {
    #[error("property {property_id} is already unlocked")]
    AlreadyUnlocked { property_id: String },

    #[error("invalid deal code: {0}")]
    InvalidDealCode(DealCodeRejection),

    #[error("payment method not supported for property {property_id}: {reason}")]
    MethodNotSupported { property_id: String, reason: String },

    #[error("a phone number is required for mobile money payments")]
    MissingPhoneNumber,

    #[error("unsupported payment provider: {0}")]
    UnsupportedProvider(String),

    #[error("payment dispatch failed for {reference}: {source}")]
    GatewayDispatchFailed {
        reference: String,
        /// Status the record was left in after the failure.
        status: StatusKind,
        #[source]
        source: GatewayError,
    },

    #[error("unlock not found: {0}")]
    UnlockNotFound(String),

    #[error("property not found: {0}")]
    PropertyNotFound(String),

    #[error("guest not found: {0}")]
    GuestNotFound(String),

    #[error("unlock belongs to another user")]
    Unauthorized,

    #[error("feedback was already submitted for this unlock")]
    AlreadyAppreciated,

    #[error("unlock in status {0} cannot be cancelled")]
    PendingPaymentNotCancellable(StatusKind),

    #[error("payment is not completed (status {0})")]
    PaymentNotCompleted(StatusKind),

    #[error("a booking was already created from unlock {0}")]
    BookingAlreadyCreated(String),

    #[error("illegal status transition from {from} to {to}")]
    InvalidTransition { from: StatusKind, to: StatusKind },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),

    #[error("internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl UnlockError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyUnlocked { .. } => "ALREADY_UNLOCKED",
            Self::InvalidDealCode(_) => "INVALID_DEAL_CODE",
            Self::MethodNotSupported { .. } => "METHOD_NOT_SUPPORTED",
            Self::MissingPhoneNumber => "MISSING_PHONE_NUMBER",
            Self::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            Self::GatewayDispatchFailed { .. } => "GATEWAY_DISPATCH_FAILED",
            Self::UnlockNotFound(_) => "UNLOCK_NOT_FOUND",
            Self::PropertyNotFound(_) => "PROPERTY_NOT_FOUND",
            Self::GuestNotFound(_) => "GUEST_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::AlreadyAppreciated => "ALREADY_APPRECIATED",
            Self::PendingPaymentNotCancellable(_) => "PENDING_PAYMENT_NOT_CANCELLABLE",
            Self::PaymentNotCompleted(_) => "PAYMENT_NOT_COMPLETED",
            Self::BookingAlreadyCreated(_) => "BOOKING_ALREADY_CREATED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Conflict(_) => "CONFLICT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::CsvError(_) | Self::IoError(_) | Self::InternalError(_) => "INTERNAL_ERROR",
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDbError(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

/// Failures reported by a payment gateway adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The request may or may not have reached the provider.
    #[error("gateway timed out")]
    Timeout,
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("gateway transport failure: {0}")]
    Transport(String),
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether the charge outcome is unknown and must be confirmed with the provider.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Failures of the upstream exchange-rate feed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateError {
    #[error("rate feed unavailable: {0}")]
    Unavailable(String),
    #[error("rate feed returned an invalid rate: {0}")]
    InvalidRate(String),
}

pub type Result<T> = std::result::Result<T, UnlockError>;
