use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use nimbus_infra::Crm;
use nimbus_infra::services::{NewOpportunity, OpportunityChanges};
use nimbus_pipeline::OpportunityId;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, command_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_opportunity).get(list_opportunities))
        .route("/pipeline", get(pipeline_summary))
        .route("/default-fields", post(ensure_default_fields))
        .route(
            "/:id",
            get(get_opportunity)
                .patch(update_opportunity)
                .delete(delete_opportunity),
        )
        .route("/:id/restore", post(restore_opportunity))
        .route("/:id/custom-fields", post(set_custom_fields))
        .route("/:id/metrics", get(opportunity_metrics))
}

pub async fn create_opportunity(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewOpportunity>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "opportunities.write")?;
    let opportunity = crm
        .opportunities()
        .create(&command_context(&tenant, &principal), body)?;
    Ok((StatusCode::CREATED, Json(dto::opportunity_to_json(&opportunity))).into_response())
}

pub async fn list_opportunities(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "opportunities.read")?;
    let items = crm
        .opportunities()
        .list(tenant.tenant_id())
        .iter()
        .map(dto::opportunity_to_json)
        .collect();
    Ok(Json(dto::items(items)).into_response())
}

pub async fn get_opportunity(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "opportunities.read")?;
    let opportunity_id: OpportunityId = dto::parse_id(&id, "opportunity")?;
    let opportunity = crm.opportunities().get(tenant.tenant_id(), opportunity_id)?;
    if opportunity.is_deleted() {
        return Err(ApiError::NotFound("opportunity not found".into()));
    }
    Ok(Json(dto::opportunity_to_json(&opportunity)).into_response())
}

pub async fn update_opportunity(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<OpportunityChanges>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "opportunities.write")?;
    let opportunity_id: OpportunityId = dto::parse_id(&id, "opportunity")?;
    let opportunity = crm.opportunities().update(
        &command_context(&tenant, &principal),
        opportunity_id,
        body,
    )?;
    Ok(Json(dto::opportunity_to_json(&opportunity)).into_response())
}

pub async fn set_custom_fields(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CustomValuesRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "opportunities.write")?;
    let opportunity_id: OpportunityId = dto::parse_id(&id, "opportunity")?;
    let opportunity = crm.opportunities().set_custom_fields(
        &command_context(&tenant, &principal),
        opportunity_id,
        body.values,
    )?;
    Ok(Json(dto::opportunity_to_json(&opportunity)).into_response())
}

pub async fn delete_opportunity(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "opportunities.delete")?;
    let opportunity_id: OpportunityId = dto::parse_id(&id, "opportunity")?;
    crm.opportunities()
        .delete(&command_context(&tenant, &principal), opportunity_id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn restore_opportunity(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "opportunities.delete")?;
    let opportunity_id: OpportunityId = dto::parse_id(&id, "opportunity")?;
    let opportunity = crm
        .opportunities()
        .restore(&command_context(&tenant, &principal), opportunity_id)?;
    Ok(Json(dto::opportunity_to_json(&opportunity)).into_response())
}

pub async fn opportunity_metrics(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "opportunities.read")?;
    let opportunity_id: OpportunityId = dto::parse_id(&id, "opportunity")?;
    let metrics = crm.metrics().metrics(tenant.tenant_id(), opportunity_id)?;
    Ok(Json(metrics).into_response())
}

pub async fn pipeline_summary(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "opportunities.read")?;
    Ok(Json(crm.metrics().pipeline_summary(tenant.tenant_id())).into_response())
}

/// Registers the standard amount/probability/close date/stage/forecast
/// fields the tenant is missing.
pub async fn ensure_default_fields(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "custom_fields.write")?;
    let created = crm
        .metrics()
        .ensure_default_fields(&command_context(&tenant, &principal))?;
    Ok(Json(serde_json::json!({ "items": created })).into_response())
}
