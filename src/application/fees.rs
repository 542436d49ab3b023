use crate::config::FeeSchedule;
use crate::domain::catalog::PropertyListing;
use crate::domain::money::{ExchangeRate, LocalAmount, UsdAmount};
use crate::domain::unlock::PaymentMethod;
use crate::error::{Result, UnlockError};
use rust_decimal::Decimal;
use serde::Serialize;

/// Server-side price of an unlock, in both currencies and with the rate used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeeQuote {
    pub method: PaymentMethod,
    pub amount_local: LocalAmount,
    pub amount_usd: UsdAmount,
    pub exchange_rate: ExchangeRate,
}

/// Prices an unlock for `listing`.
///
/// Both methods need a monthly price; nightly-only listings are rejected with
/// `MethodNotSupported`. Nothing submitted by the client takes part in this.
pub fn calculate_fee(
    listing: &PropertyListing,
    method: PaymentMethod,
    rate: ExchangeRate,
    schedule: &FeeSchedule,
) -> Result<FeeQuote> {
    let monthly = monthly_price(listing)?;

    let (amount_local, amount_usd) = match method {
        PaymentMethod::NonRefundableFee => {
            let local = if monthly < schedule.tier_threshold_usd {
                schedule.lower_tier_fee
            } else {
                schedule.upper_tier_fee
            };
            (local, local.to_usd(rate))
        }
        PaymentMethod::ThreeMonth30Percent => {
            let fee_usd = deposit_usd(monthly, schedule);
            (rate.convert(fee_usd), UsdAmount::new(fee_usd)?)
        }
    };

    Ok(FeeQuote {
        method,
        amount_local,
        amount_usd,
        exchange_rate: rate,
    })
}

/// Tax-inclusive rent over the deposit period, in USD.
pub fn deposit_period_total_usd(monthly: Decimal, schedule: &FeeSchedule) -> Decimal {
    monthly * schedule.tax_multiplier * schedule.deposit_months
}

fn deposit_usd(monthly: Decimal, schedule: &FeeSchedule) -> Decimal {
    deposit_period_total_usd(monthly, schedule) * schedule.deposit_share
}

pub fn monthly_price(listing: &PropertyListing) -> Result<Decimal> {
    match listing.price_per_month {
        Some(price) if price > Decimal::ZERO => Ok(price),
        _ => Err(UnlockError::MethodNotSupported {
            property_id: listing.property_id.clone(),
            reason: "address unlock requires a monthly price".to_string(),
        }),
    }
}
