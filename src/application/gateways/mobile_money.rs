use super::phone::normalize_phone;
use crate::domain::ports::{
    ChargeReceipt, ChargeRequest, DepositRequest, MobileMoneyClient, PaymentGateway,
};
use crate::domain::unlock::{GatewayStatus, ProviderCode};
use crate::error::{GatewayError, Result, UnlockError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Longest statement description the wallet operators accept.
pub const DESCRIPTION_LIMIT: usize = 22;

/// Operator codes keyed by (operator, ISO country).
const OPERATORS: &[(&str, &str, &str, &str)] = &[
    // operator, country, operator code, dialing code
    ("MTN", "RW", "MTN_MOMO_RWA", "250"),
    ("AIRTEL", "RW", "AIRTEL_RWA", "250"),
    ("MTN", "UG", "MTN_MOMO_UGA", "256"),
    ("AIRTEL", "UG", "AIRTEL_OAPI_UGA", "256"),
    ("MPESA", "KE", "MPESA_KEN", "254"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub code: &'static str,
    pub dialing_code: &'static str,
}

/// Resolves a provider code such as `MTN_RW` to the wallet operator.
pub fn resolve_operator(provider: &ProviderCode) -> Option<Operator> {
    let (operator, country) = provider.operator_and_country();
    let country = country?;
    OPERATORS
        .iter()
        .find(|(op, c, _, _)| *op == operator && *c == country)
        .map(|&(_, _, code, dialing_code)| Operator {
            code,
            dialing_code,
        })
}

/// Keeps letters, digits and spaces, then cuts to the operator limit.
pub fn statement_description(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(DESCRIPTION_LIMIT)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Collects the fee from the guest's wallet.
pub struct MobileMoneyGateway {
    client: Arc<dyn MobileMoneyClient>,
}

impl MobileMoneyGateway {
    pub fn new(client: Arc<dyn MobileMoneyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PaymentGateway for MobileMoneyGateway {
    fn name(&self) -> &'static str {
        "mobile_money"
    }

    fn handles(&self, provider: &ProviderCode) -> bool {
        resolve_operator(provider).is_some()
    }

    fn preflight(&self, provider: &ProviderCode, payer_phone: Option<&str>) -> Result<()> {
        let operator = resolve_operator(provider)
            .ok_or_else(|| UnlockError::UnsupportedProvider(provider.to_string()))?;
        let phone = payer_phone
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(UnlockError::MissingPhoneNumber)?;
        normalize_phone(phone, operator.dialing_code)
            .map(|_| ())
            .ok_or_else(|| UnlockError::ValidationError(format!("invalid phone number '{phone}'")))
    }

    async fn dispatch(&self, charge: &ChargeRequest) -> std::result::Result<ChargeReceipt, GatewayError> {
        let operator = resolve_operator(&charge.provider).ok_or_else(|| {
            GatewayError::Rejected(format!("no operator for provider {}", charge.provider))
        })?;
        let phone = charge
            .payer_phone
            .as_deref()
            .and_then(|p| normalize_phone(p, operator.dialing_code))
            .ok_or_else(|| GatewayError::Rejected("payer phone missing or malformed".to_string()))?;

        let mut metadata = BTreeMap::new();
        metadata.insert("unlockId".to_string(), charge.unlock_id.to_string());
        metadata.insert("propertyId".to_string(), charge.property_id.clone());
        metadata.insert("userId".to_string(), charge.guest.user_id.clone());
        metadata.insert("paymentMethod".to_string(), charge.payment_method.to_string());

        let request = DepositRequest {
            reference: charge.reference.clone(),
            amount: charge.amount_local.value(),
            currency: charge.currency.clone(),
            payer_phone: phone.international,
            operator_code: operator.code.to_string(),
            description: statement_description(&format!("Unlock {}", charge.property_title)),
            metadata,
        };

        let response = self.client.initiate_deposit(request).await?;
        let status = match response.provider_status.as_deref() {
            None => GatewayStatus::Submitted,
            Some(raw) => GatewayStatus::parse(raw).unwrap_or_else(|| {
                tracing::warn!(reference = %charge.reference, provider_status = raw, "Unrecognised deposit status, treating as submitted");
                GatewayStatus::Submitted
            }),
        };

        Ok(ChargeReceipt {
            provider_reference: None,
            payment_url: None,
            status: Some(status),
        })
    }

    async fn fetch_status(&self, reference: &str) -> std::result::Result<Option<GatewayStatus>, GatewayError> {
        let raw = self.client.deposit_status(reference).await?;
        Ok(raw.as_deref().and_then(GatewayStatus::parse))
    }
}
