use super::AppState;
use super::error::ApiResult;
use super::extract::CallerId;
use crate::application::views::{
    AppreciationOutcome, BookingOutcome, BookingRequest, CallbackOutcome, CancellationOutcome,
    InitiateUnlockOutcome, InitiateUnlockRequest, UnlockStatusView, UnlockSummary,
};
use crate::domain::deal_code::{DealCode, DealCodeUsage};
use crate::domain::refund::AddressUnlockRefund;
use crate::domain::unlock::{AppreciationLevel, GatewayStatus, UnlockId};
use crate::error::UnlockError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

fn data<T: Serialize>(data: T) -> Json<DataResponse<T>> {
    Json(DataResponse { data })
}

fn parse_unlock_id(raw: &str) -> ApiResult<UnlockId> {
    Ok(raw.parse::<UnlockId>()?)
}

#[derive(Debug, Deserialize)]
pub struct AppreciationBody {
    pub level: AppreciationLevel,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Provider callback. Wallet and card providers name the reference differently.
#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(alias = "depositId", alias = "refid", alias = "transactionReference")]
    pub reference: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    pub received: bool,
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DealCodeCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_code: Option<DealCode>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub async fn initiate_unlock(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(request): Json<InitiateUnlockRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<InitiateUnlockOutcome>>)> {
    let outcome = state
        .orchestrator
        .initiate_unlock_payment(&user_id, request)
        .await?;
    let status = if outcome.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, data(outcome)))
}

pub async fn list_unlocks(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> ApiResult<Json<DataResponse<Vec<UnlockSummary>>>> {
    Ok(data(state.orchestrator.list_unlocks(&user_id).await?))
}

pub async fn list_refunds(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> ApiResult<Json<DataResponse<Vec<AddressUnlockRefund>>>> {
    Ok(data(state.orchestrator.list_refunds(&user_id).await?))
}

pub async fn unlock_status(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(property_id): Path<String>,
) -> ApiResult<Json<DataResponse<UnlockStatusView>>> {
    Ok(data(
        state
            .orchestrator
            .get_unlock_status(&user_id, &property_id)
            .await?,
    ))
}

pub async fn submit_appreciation(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(unlock_id): Path<String>,
    Json(body): Json<AppreciationBody>,
) -> ApiResult<Json<DataResponse<AppreciationOutcome>>> {
    let unlock_id = parse_unlock_id(&unlock_id)?;
    Ok(data(
        state
            .orchestrator
            .submit_appreciation(&user_id, unlock_id, body.level, body.feedback)
            .await?,
    ))
}

pub async fn cancel_unlock(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(unlock_id): Path<String>,
    Json(body): Json<CancelBody>,
) -> ApiResult<Json<DataResponse<CancellationOutcome>>> {
    let unlock_id = parse_unlock_id(&unlock_id)?;
    Ok(data(
        state
            .orchestrator
            .cancel_unlock_request(&user_id, unlock_id, body.reason)
            .await?,
    ))
}

pub async fn create_booking(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(unlock_id): Path<String>,
    Json(body): Json<BookingRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<BookingOutcome>>)> {
    let unlock_id = parse_unlock_id(&unlock_id)?;
    let outcome = state
        .orchestrator
        .create_booking_from_unlock(&user_id, unlock_id, body)
        .await?;
    Ok((StatusCode::CREATED, data(outcome)))
}

pub async fn reconcile_unlock(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(unlock_id): Path<String>,
) -> ApiResult<Json<DataResponse<CallbackOutcome>>> {
    let unlock_id = parse_unlock_id(&unlock_id)?;
    Ok(data(
        state
            .orchestrator
            .reconcile_unlock(&user_id, unlock_id)
            .await?,
    ))
}

pub async fn list_deal_codes(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> ApiResult<Json<DataResponse<Vec<DealCode>>>> {
    Ok(data(state.orchestrator.ledger().codes_for_user(&user_id).await?))
}

/// Reports why a code cannot be used instead of failing the request.
pub async fn validate_deal_code(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(code): Path<String>,
) -> ApiResult<Json<DataResponse<DealCodeCheck>>> {
    let check = match state
        .orchestrator
        .ledger()
        .validate(&code, &user_id, Utc::now())
        .await
    {
        Ok(deal_code) => DealCodeCheck {
            valid: true,
            reason: None,
            message: None,
            deal_code: Some(deal_code),
        },
        Err(UnlockError::InvalidDealCode(reason)) => DealCodeCheck {
            valid: false,
            message: Some(reason.to_string()),
            reason: Some(reason.as_str()),
            deal_code: None,
        },
        Err(e) => return Err(e.into()),
    };
    Ok(data(check))
}

pub async fn deal_code_usages(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(code): Path<String>,
) -> ApiResult<Json<DataResponse<Vec<DealCodeUsage>>>> {
    Ok(data(
        state
            .orchestrator
            .ledger()
            .usage_history(&code, &user_id)
            .await?,
    ))
}

/// Header carrying the shared callback secret.
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// Always acknowledges, so providers stop retrying; problems are logged.
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<CallbackAck> {
    let token = headers.get(CALLBACK_TOKEN_HEADER).map(|v| v.as_bytes());
    if !state.callback_authorized(token) {
        tracing::warn!(token_present = token.is_some(), "Payment callback failed authentication");
        return Json(CallbackAck {
            received: true,
            outcome: "rejected",
        });
    }

    let outcome = match serde_json::from_slice::<CallbackBody>(&body) {
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable payment callback");
            "rejected"
        }
        Ok(callback) => match GatewayStatus::parse(&callback.status) {
            None => {
                tracing::warn!(reference = %callback.reference, status = %callback.status, "Unknown payment callback status");
                "rejected"
            }
            Some(status) => match state
                .orchestrator
                .process_payment_callback(&callback.reference, status)
                .await
            {
                Ok(outcome) => outcome.label(),
                Err(e) => {
                    tracing::error!(reference = %callback.reference, error = %e, "Payment callback failed");
                    "error"
                }
            },
        },
    };
    Json(CallbackAck {
        received: true,
        outcome,
    })
}
