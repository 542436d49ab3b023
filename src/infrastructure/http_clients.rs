//! reqwest adapters for the payment providers and the exchange-rate feed.

use crate::domain::money::ExchangeRate;
use crate::domain::ports::{
    CardClient, CollectionRequest, CollectionResponse, DepositRequest, DepositResponse,
    ExchangeRateSource, MobileMoneyClient, RateQuote,
};
use crate::error::{GatewayError, RateError, Result, UnlockError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Builds the shared client with rustls and a request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .build()
        .map_err(|e| UnlockError::internal(format!("failed to build HTTP client: {e}")))
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else if e.is_decode() {
        GatewayError::InvalidResponse(e.to_string())
    } else {
        GatewayError::Transport(e.to_string())
    }
}

/// Maps a non-2xx answer: 4xx is a refusal, anything else a transport fault.
async fn status_error(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        GatewayError::Rejected(format!("{status}: {body}"))
    } else {
        GatewayError::Transport(format!("{status}: {body}"))
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

// ---------------------------------------------------------------------------
// Mobile money deposits
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DepositBody<'a> {
    deposit_id: &'a str,
    amount: String,
    currency: &'a str,
    payer: Payer<'a>,
    customer_message: &'a str,
    metadata: Vec<MetadataField<'a>>,
}

#[derive(Serialize)]
struct Payer<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "accountDetails")]
    account_details: AccountDetails<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountDetails<'a> {
    phone_number: &'a str,
    provider: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataField<'a> {
    field_name: &'a str,
    field_value: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositAnswer {
    status: Option<String>,
    #[serde(default)]
    rejection_reason: Option<RejectionReason>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectionReason {
    #[serde(default)]
    rejection_message: Option<String>,
}

#[derive(Deserialize)]
struct DepositState {
    status: Option<String>,
}

/// Wallet deposit API (`POST /deposits`, `GET /deposits/{id}`).
pub struct HttpMobileMoneyClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpMobileMoneyClient {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl MobileMoneyClient for HttpMobileMoneyClient {
    async fn initiate_deposit(&self, request: DepositRequest) -> std::result::Result<DepositResponse, GatewayError> {
        let body = DepositBody {
            deposit_id: &request.reference,
            amount: request.amount.normalize().to_string(),
            currency: &request.currency,
            payer: Payer {
                kind: "MMO",
                account_details: AccountDetails {
                    phone_number: &request.payer_phone,
                    provider: &request.operator_code,
                },
            },
            customer_message: &request.description,
            metadata: request
                .metadata
                .iter()
                .map(|(k, v)| MetadataField {
                    field_name: k,
                    field_value: v,
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/deposits", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let answer: DepositAnswer = response.json().await.map_err(transport_error)?;
        if answer
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("REJECTED"))
        {
            let message = answer
                .rejection_reason
                .and_then(|r| r.rejection_message)
                .unwrap_or_else(|| "deposit rejected".to_string());
            return Err(GatewayError::Rejected(message));
        }
        Ok(DepositResponse {
            provider_status: answer.status,
        })
    }

    async fn deposit_status(&self, reference: &str) -> std::result::Result<Option<String>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/deposits/{reference}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let states: Vec<DepositState> = response.json().await.map_err(transport_error)?;
        Ok(states.into_iter().next().and_then(|s| s.status))
    }
}

// ---------------------------------------------------------------------------
// Hosted card collections
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CollectionBody<'a> {
    email: &'a str,
    cname: &'a str,
    amount: String,
    cnumber: &'a str,
    msisdn: &'a str,
    currency: &'a str,
    pmethod: &'static str,
    #[serde(rename = "chargesIncluded")]
    charges_included: &'static str,
    reference: &'a str,
    redirecturl: &'a str,
}

#[derive(Deserialize)]
struct CollectionAnswer {
    #[serde(default)]
    refid: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    reply: Option<String>,
}

#[derive(Deserialize)]
struct CollectionState {
    status: Option<String>,
}

/// Hosted-page card API (`POST /collections/initiate`, `GET /collections/status/{ref}`).
pub struct HttpCardClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpCardClient {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CardClient for HttpCardClient {
    async fn initiate_collection(
        &self,
        request: CollectionRequest,
    ) -> std::result::Result<CollectionResponse, GatewayError> {
        let body = CollectionBody {
            email: &request.customer_email,
            cname: &request.customer_name,
            amount: request.amount_usd.round_dp(2).to_string(),
            cnumber: &request.phone_local,
            msisdn: &request.phone_intl,
            currency: &request.currency,
            pmethod: "cc",
            charges_included: "true",
            reference: &request.reference,
            redirecturl: &request.redirect_url,
        };

        let response = self
            .client
            .post(format!("{}/collections/initiate", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let answer: CollectionAnswer = response.json().await.map_err(transport_error)?;
        match answer.url {
            Some(url) if !url.trim().is_empty() => Ok(CollectionResponse {
                provider_reference: answer.refid.unwrap_or_default(),
                payment_url: url,
            }),
            _ => Err(GatewayError::Rejected(
                answer
                    .reply
                    .unwrap_or_else(|| "collection not created".to_string()),
            )),
        }
    }

    async fn collection_status(&self, reference: &str) -> std::result::Result<Option<String>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/collections/status/{reference}", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let state: CollectionState = response.json().await.map_err(transport_error)?;
        Ok(state.status)
    }
}

// ---------------------------------------------------------------------------
// Exchange rates
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RateTable {
    #[serde(default)]
    time_last_update_unix: Option<i64>,
    rates: HashMap<String, Decimal>,
}

/// Open exchange-rate feed (`GET /latest/{base}`).
pub struct HttpRateSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateSource {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl ExchangeRateSource for HttpRateSource {
    async fn get_rate(&self, base: &str, quote: &str) -> std::result::Result<RateQuote, RateError> {
        let response = self
            .client
            .get(format!("{}/latest/{base}", self.base_url))
            .send()
            .await
            .map_err(|e| RateError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RateError::Unavailable(format!(
                "rate feed answered {}",
                response.status()
            )));
        }
        let table: RateTable = response
            .json()
            .await
            .map_err(|e| RateError::InvalidRate(e.to_string()))?;

        let value = table
            .rates
            .get(quote)
            .copied()
            .ok_or_else(|| RateError::InvalidRate(format!("no {quote} rate in feed")))?;
        let rate = ExchangeRate::new(value).map_err(|e| RateError::InvalidRate(e.to_string()))?;
        let as_of = table
            .time_last_update_unix
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);
        Ok(RateQuote { rate, as_of })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_body_wire_names() {
        let body = CollectionBody {
            email: "guest@example.com",
            cname: "Guest",
            amount: "6.15".to_string(),
            cnumber: "0788123456",
            msisdn: "250788123456",
            currency: "USD",
            pmethod: "cc",
            charges_included: "true",
            reference: "UNLOCK-1",
            redirecturl: "https://app.example.com/return",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["chargesIncluded"], "true");
        assert_eq!(value["msisdn"], "250788123456");
        assert_eq!(value["redirecturl"], "https://app.example.com/return");
    }

    #[test]
    fn test_deposit_answer_with_rejection() {
        let answer: DepositAnswer = serde_json::from_value(json!({
            "depositId": "UNLOCK-1",
            "status": "REJECTED",
            "rejectionReason": { "rejectionCode": "PAYER_LIMIT_REACHED", "rejectionMessage": "limit reached" }
        }))
        .unwrap();
        assert_eq!(answer.status.as_deref(), Some("REJECTED"));
        assert_eq!(
            answer.rejection_reason.and_then(|r| r.rejection_message).as_deref(),
            Some("limit reached")
        );
    }

    #[test]
    fn test_rate_table_parses() {
        let table: RateTable = serde_json::from_value(json!({
            "result": "success",
            "time_last_update_unix": 1760745601,
            "rates": { "USD": 1, "RWF": 1447.25 }
        }))
        .unwrap();
        assert_eq!(table.rates.get("RWF").copied(), Some(Decimal::new(144725, 2)));
        assert_eq!(table.time_last_update_unix, Some(1760745601));
    }
}
