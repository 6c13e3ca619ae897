use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    response::{IntoResponse, Response},
    routing::post,
};

use nimbus_infra::Crm;

use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/replay", post(replay))
}

/// Rebuilds every read model from the event log. Only the `*` grant covers
/// `admin.replay`.
pub async fn replay(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "admin.replay")?;
    let report = crm.replay()?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        events = report.events,
        "read models rebuilt"
    );
    Ok(Json(report).into_response())
}
