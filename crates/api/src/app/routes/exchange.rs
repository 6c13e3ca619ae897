use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use nimbus_infra::Crm;
use nimbus_infra::exchange::ExchangeEntity;

use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, command_context};

pub fn router() -> Router {
    Router::new()
        .route("/:entity/export", get(export_csv))
        .route("/:entity/import", post(import_csv))
}

pub async fn export_csv(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(entity): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "exchange.read")?;
    let entity: ExchangeEntity = entity.parse()?;
    let body = crm.exchange().export_csv(tenant.tenant_id(), entity)?;
    let disposition = format!("attachment; filename=\"{}.csv\"", entity.as_str());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Body is the raw CSV file. Bad rows are reported, not fatal.
pub async fn import_csv(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(entity): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "exchange.import")?;
    let entity: ExchangeEntity = entity.parse()?;
    let report = crm
        .exchange()
        .import_csv(&command_context(&tenant, &principal), entity, &body)?;
    Ok(Json(report).into_response())
}
