use crate::error::UnlockError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error type for HTTP handlers.
///
/// Wraps [`UnlockError`] and adds the missing-caller case. Renders as
/// `{ "error": message, "code": CODE }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Unlock(#[from] UnlockError),

    /// No caller identity on the request.
    #[error("missing x-user-id header")]
    Unauthenticated,
}

pub type ApiResult<T> = Result<T, ApiError>;

fn status_of(error: &UnlockError) -> StatusCode {
    match error {
        UnlockError::AlreadyUnlocked { .. }
        | UnlockError::AlreadyAppreciated
        | UnlockError::PendingPaymentNotCancellable(_)
        | UnlockError::PaymentNotCompleted(_)
        | UnlockError::BookingAlreadyCreated(_)
        | UnlockError::InvalidTransition { .. }
        | UnlockError::Conflict(_) => StatusCode::CONFLICT,
        UnlockError::InvalidDealCode(_)
        | UnlockError::MissingPhoneNumber
        | UnlockError::UnsupportedProvider(_)
        | UnlockError::ValidationError(_) => StatusCode::BAD_REQUEST,
        UnlockError::MethodNotSupported { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        UnlockError::GatewayDispatchFailed { .. } => StatusCode::BAD_GATEWAY,
        UnlockError::UnlockNotFound(_)
        | UnlockError::PropertyNotFound(_)
        | UnlockError::GuestNotFound(_) => StatusCode::NOT_FOUND,
        UnlockError::Unauthorized => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unlock(error) => {
                let status = status_of(error);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %error, "Internal error");
                    (status, error.code(), "An internal error occurred".to_string())
                } else {
                    (status, error.code(), error.to_string())
                }
            }
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                self.to_string(),
            ),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deal_code::DealCodeRejection;
    use crate::domain::unlock::StatusKind;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(&UnlockError::AlreadyUnlocked {
                property_id: "p1".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(&UnlockError::InvalidDealCode(DealCodeRejection::Exhausted)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(&UnlockError::Unauthorized), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(&UnlockError::PendingPaymentNotCancellable(StatusKind::Pending)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(&UnlockError::internal("boom")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
