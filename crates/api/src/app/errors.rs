use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use nimbus_infra::command_dispatcher::DispatchError;
use nimbus_infra::event_store::EventStoreError;
use nimbus_infra::exchange::ExchangeError;
use nimbus_infra::services::ServiceError;
use nimbus_security::AuthzError;

/// Every failure a handler can return; rendered as
/// `{"error": <code>, "message": <text>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid bearer token")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_id(what: &str) -> Self {
        ApiError::BadRequest(format!("invalid {what} id"))
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        json_error(status, code, self.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ServiceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ServiceError::Conflict(msg) => ApiError::Conflict(msg),
            ServiceError::InvariantViolation(msg) => ApiError::Unprocessable(msg),
            ServiceError::Dispatch(e) => e.into(),
            ServiceError::Store(e) => e.into(),
            ServiceError::Projection(e) => ApiError::Internal(e.to_string()),
            ServiceError::Unavailable(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(msg) => ApiError::BadRequest(msg),
            DispatchError::InvariantViolation(msg) => ApiError::Unprocessable(msg),
            DispatchError::Concurrency(msg) | DispatchError::Conflict(msg) => ApiError::Conflict(msg),
            DispatchError::TenantIsolation(msg) => ApiError::Forbidden(msg),
            DispatchError::NotFound(_) => ApiError::NotFound(err.to_string()),
            DispatchError::Store(e) => e.into(),
            DispatchError::Deserialize(_) | DispatchError::Publish(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<EventStoreError> for ApiError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::Concurrency(msg) => ApiError::Conflict(msg),
            EventStoreError::TenantIsolation(msg) => ApiError::Forbidden(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::UnknownEntity(_) => ApiError::NotFound(err.to_string()),
            ExchangeError::MissingColumns(_) | ExchangeError::Csv(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ExchangeError::Encoding => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let status = |e: ServiceError| ApiError::from(e).parts().0;
        assert_eq!(status(ServiceError::validation("bad")), StatusCode::BAD_REQUEST);
        assert_eq!(status(ServiceError::NotFound("lead")), StatusCode::NOT_FOUND);
        assert_eq!(status(ServiceError::conflict("taken")), StatusCode::CONFLICT);
        assert_eq!(
            status(ServiceError::InvariantViolation("closed".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(ServiceError::Store(EventStoreError::Concurrency("stale".into()))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(ServiceError::Store(EventStoreError::Storage("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_message_names_the_record() {
        let err = ApiError::from(ServiceError::NotFound("security group"));
        assert_eq!(err.to_string(), "security group not found");
    }
}
