use crate::domain::money::{ExchangeRate, LocalAmount};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Fee tiers and multipliers used to price an unlock.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    /// Monthly price (USD) at which the flat fee moves to the upper tier.
    pub tier_threshold_usd: Decimal,
    pub lower_tier_fee: LocalAmount,
    pub upper_tier_fee: LocalAmount,
    /// Tax and platform markup applied to rent.
    pub tax_multiplier: Decimal,
    pub deposit_months: Decimal,
    pub deposit_share: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            tier_threshold_usd: dec!(300),
            lower_tier_fee: LocalAmount::units(8_000),
            upper_tier_fee: LocalAmount::units(15_000),
            tax_multiplier: dec!(1.14),
            deposit_months: dec!(3),
            deposit_share: dec!(0.30),
        }
    }
}

/// Knobs of the unlock orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub fees: FeeSchedule,
    /// Kept from the deposit when a refund is computed.
    pub service_fee: LocalAmount,
    /// ISO code of the settlement currency.
    pub local_currency: String,
    pub deal_code_validity: chrono::Duration,
    pub rate_ttl: Duration,
    /// Used when the rate feed has never answered.
    pub default_rate: ExchangeRate,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            service_fee: LocalAmount::units(15_000),
            local_currency: "RWF".to_string(),
            deal_code_validity: chrono::Duration::days(90),
            rate_ttl: Duration::from_secs(60 * 60),
            default_rate: ExchangeRate::new_unchecked(dec!(1300)),
        }
    }
}
