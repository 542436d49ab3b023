use super::phone::{NormalizedPhone, normalize_phone};
use crate::domain::ports::{CardClient, ChargeReceipt, ChargeRequest, CollectionRequest, PaymentGateway};
use crate::domain::unlock::{GatewayStatus, ProviderCode};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::sync::Arc;

pub const CARD_PROVIDER: &str = "XENTRIPAY_CARD";

/// Hosted-page card collection. The guest is redirected to `payment_url` and
/// the outcome arrives through the payment callback.
pub struct CardGateway {
    client: Arc<dyn CardClient>,
    redirect_url: String,
    dialing_code: String,
}

impl CardGateway {
    pub fn new(client: Arc<dyn CardClient>, redirect_url: impl Into<String>, dialing_code: impl Into<String>) -> Self {
        Self {
            client,
            redirect_url: redirect_url.into(),
            dialing_code: dialing_code.into(),
        }
    }

    fn redirect_for(&self, charge: &ChargeRequest) -> String {
        let separator = if self.redirect_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}unlockId={}", self.redirect_url, charge.unlock_id)
    }
}

#[async_trait]
impl PaymentGateway for CardGateway {
    fn name(&self) -> &'static str {
        "card"
    }

    fn handles(&self, provider: &ProviderCode) -> bool {
        provider.as_str() == CARD_PROVIDER || provider.as_str() == "CARD"
    }

    async fn dispatch(&self, charge: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let phone = charge
            .guest
            .phone
            .as_deref()
            .and_then(|p| normalize_phone(p, &self.dialing_code))
            .unwrap_or_else(|| NormalizedPhone::placeholder(&self.dialing_code));

        let request = CollectionRequest {
            customer_email: charge.guest.email.clone(),
            customer_name: charge.guest.name.clone(),
            amount_usd: charge.amount_usd.value(),
            phone_local: phone.local,
            phone_intl: phone.international,
            currency: "USD".to_string(),
            reference: charge.reference.clone(),
            redirect_url: self.redirect_for(charge),
        };

        let response = self.client.initiate_collection(request).await?;
        if response.payment_url.trim().is_empty() {
            return Err(GatewayError::InvalidResponse(
                "card provider returned no payment url".to_string(),
            ));
        }

        Ok(ChargeReceipt {
            provider_reference: Some(response.provider_reference).filter(|r| !r.trim().is_empty()),
            payment_url: Some(response.payment_url),
            status: None,
        })
    }

    async fn fetch_status(&self, reference: &str) -> Result<Option<GatewayStatus>, GatewayError> {
        let raw = self.client.collection_status(reference).await?;
        Ok(raw.as_deref().and_then(GatewayStatus::parse))
    }
}
