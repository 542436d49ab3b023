//! JSON API over the unlock orchestrator.
//!
//! Guest routes read the caller from the `x-user-id` header and trust it, so
//! the router belongs behind an authenticating gateway. The provider webhook
//! is always acknowledged; when a callback secret is configured, callbacks
//! without a matching `x-callback-token` header are dropped unapplied.

pub mod error;
pub mod extract;
pub mod handlers;

use crate::application::UnlockOrchestrator;
use axum::Router;
use axum::http::HeaderName;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<UnlockOrchestrator>,
    callback_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<UnlockOrchestrator>) -> Self {
        Self {
            orchestrator,
            callback_secret: None,
        }
    }

    /// Requires provider callbacks to carry `secret` in `x-callback-token`.
    pub fn with_callback_secret(mut self, secret: impl Into<Arc<str>>) -> Self {
        self.callback_secret = Some(secret.into());
        self
    }

    /// Whether a callback presenting `token` may be applied.
    pub(crate) fn callback_authorized(&self, token: Option<&[u8]>) -> bool {
        match (&self.callback_secret, token) {
            (None, _) => true,
            (Some(secret), Some(token)) => constant_time_eq(secret.as_bytes(), token),
            (Some(_), None) => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Builds the full application [`Router`] with its middleware.
///
/// Routes under `/unlocks/{id}` share one parameter name: `id` is the
/// property for `status` and the unlock everywhere else.
pub fn build_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(handlers::health))
        .route("/unlocks", get(handlers::list_unlocks))
        .route("/unlocks/initiate", post(handlers::initiate_unlock))
        .route("/unlocks/{id}/status", get(handlers::unlock_status))
        .route(
            "/unlocks/{id}/appreciation",
            post(handlers::submit_appreciation),
        )
        .route("/unlocks/{id}/cancel", post(handlers::cancel_unlock))
        .route("/unlocks/{id}/booking", post(handlers::create_booking))
        .route(
            "/unlocks/{id}/reconcile",
            post(handlers::reconcile_unlock),
        )
        .route("/refunds", get(handlers::list_refunds))
        .route("/deal-codes", get(handlers::list_deal_codes))
        .route(
            "/deal-codes/{code}/validate",
            get(handlers::validate_deal_code),
        )
        .route("/deal-codes/{code}/usages", get(handlers::deal_code_usages))
        .route(
            "/webhooks/payment-callback",
            post(handlers::payment_callback),
        )
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}
