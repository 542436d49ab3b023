use crate::error::UnlockError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// An amount in the local settlement currency, always whole units.
///
/// Mobile-money rails settle in integral local units, so every conversion into
/// this type rounds half away from zero to the nearest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalAmount(Decimal);

/// An amount in US dollars, kept at cent precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsdAmount(Decimal);

/// A strictly positive USD→local conversion rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRate(Decimal);

impl LocalAmount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, UnlockError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(UnlockError::ValidationError(
                "Local amount must not be negative".to_string(),
            ));
        }
        Ok(Self(round_units(value)))
    }

    pub fn units(units: i64) -> Self {
        Self(Decimal::from(units.max(0)))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Converts to dollars at `rate`, rounded to cents.
    pub fn to_usd(self, rate: ExchangeRate) -> UsdAmount {
        UsdAmount::from_raw(self.0 / rate.value())
    }

    /// Subtraction floored at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        if rhs.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - rhs.0)
        }
    }
}

impl UsdAmount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, UnlockError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(UnlockError::ValidationError(
                "USD amount must not be negative".to_string(),
            ));
        }
        Ok(Self::from_raw(value))
    }

    fn from_raw(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Converts to local units at `rate`, rounded to the nearest unit.
    pub fn to_local(self, rate: ExchangeRate) -> LocalAmount {
        rate.convert(self.0)
    }

    pub fn scale(self, factor: Decimal) -> Self {
        Self::from_raw(self.0 * factor)
    }
}

impl ExchangeRate {
    pub fn new(value: Decimal) -> Result<Self, UnlockError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(UnlockError::ValidationError(
                "Exchange rate must be positive".to_string(),
            ))
        }
    }

    /// For compile-time constants known to be positive.
    pub(crate) const fn new_unchecked(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Converts a raw dollar value into whole local units.
    pub fn convert(&self, usd: Decimal) -> LocalAmount {
        LocalAmount(round_units(usd * self.0))
    }
}

impl TryFrom<Decimal> for ExchangeRate {
    type Error = UnlockError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Add for LocalAmount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for UsdAmount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for LocalAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn round_units(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}
