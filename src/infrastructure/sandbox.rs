//! Offline stand-ins for the providers, used when no endpoint is configured.
//!
//! Nothing leaves the process: deposits are accepted, card collections get a
//! local payment page, and statuses stay whatever the provider last "said"
//! until [`SandboxMobileMoney::settle`] or a callback moves them on.

use crate::domain::money::ExchangeRate;
use crate::domain::ports::{
    CardClient, CollectionRequest, CollectionResponse, DepositRequest, DepositResponse,
    ExchangeRateSource, MobileMoneyClient, RateQuote,
};
use crate::error::{GatewayError, RateError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default, Clone)]
pub struct SandboxMobileMoney {
    deposits: Arc<RwLock<HashMap<String, String>>>,
}

impl SandboxMobileMoney {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the status reported for `reference`.
    pub async fn settle(&self, reference: &str, status: &str) {
        self.deposits
            .write()
            .await
            .insert(reference.to_string(), status.to_string());
    }
}

#[async_trait]
impl MobileMoneyClient for SandboxMobileMoney {
    async fn initiate_deposit(&self, request: DepositRequest) -> Result<DepositResponse, GatewayError> {
        tracing::info!(reference = %request.reference, amount = %request.amount, operator = %request.operator_code, "Sandbox deposit accepted");
        self.deposits
            .write()
            .await
            .insert(request.reference, "ACCEPTED".to_string());
        Ok(DepositResponse {
            provider_status: Some("ACCEPTED".to_string()),
        })
    }

    async fn deposit_status(&self, reference: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.deposits.read().await.get(reference).cloned())
    }
}

#[derive(Clone)]
pub struct SandboxCard {
    page_url: String,
    collections: Arc<RwLock<HashMap<String, String>>>,
}

impl SandboxCard {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            collections: Arc::default(),
        }
    }
}

#[async_trait]
impl CardClient for SandboxCard {
    async fn initiate_collection(
        &self,
        request: CollectionRequest,
    ) -> Result<CollectionResponse, GatewayError> {
        let provider_reference = format!("SBX-{}", Uuid::now_v7().simple());
        tracing::info!(reference = %request.reference, provider_reference = %provider_reference, amount_usd = %request.amount_usd, "Sandbox card collection created");
        self.collections
            .write()
            .await
            .insert(provider_reference.clone(), "PENDING".to_string());
        Ok(CollectionResponse {
            payment_url: format!("{}/{provider_reference}", self.page_url.trim_end_matches('/')),
            provider_reference,
        })
    }

    async fn collection_status(&self, reference: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.collections.read().await.get(reference).cloned())
    }
}

/// Always quotes the same rate.
pub struct StaticRateSource {
    rate: ExchangeRate,
}

impl StaticRateSource {
    pub fn new(rate: ExchangeRate) -> Self {
        Self { rate }
    }
}

#[async_trait]
impl ExchangeRateSource for StaticRateSource {
    async fn get_rate(&self, _base: &str, _quote: &str) -> Result<RateQuote, RateError> {
        Ok(RateQuote {
            rate: self.rate,
            as_of: Utc::now(),
        })
    }
}
