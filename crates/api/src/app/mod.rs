//! HTTP API application wiring (axum router + back end assembly).
//!
//! - `services.rs`: builds the `Crm` back end from configuration
//! - `routes/`: HTTP routes + handlers (one file per resource family)
//! - `dto.rs`: request DTOs and JSON views of the records
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use nimbus_infra::Crm;
use nimbus_security::Hs256JwtValidator;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over an assembled back end.
pub fn build_app(crm: Arc<Crm>, jwt_secret: &str) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require auth + tenant context.
    let protected = routes::router()
        .layer(Extension(crm))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
