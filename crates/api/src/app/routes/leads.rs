use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use nimbus_infra::Crm;
use nimbus_infra::services::ConvertOptions;
use nimbus_pipeline::{DuplicateQuery, LeadDetails, LeadId, LeadStatus};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, command_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_lead).get(list_leads))
        .route("/:id", get(get_lead).put(update_lead).delete(delete_lead))
        .route("/:id/status", post(change_lead_status))
        .route("/:id/restore", post(restore_lead))
        .route("/:id/duplicates", get(find_duplicates))
        .route("/:id/convert", post(convert_lead))
}

pub async fn create_lead(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<LeadDetails>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "leads.write")?;
    let lead = crm.leads().create(&command_context(&tenant, &principal), body)?;
    Ok((StatusCode::CREATED, Json(dto::lead_to_json(&lead))).into_response())
}

pub async fn list_leads(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::LeadListQuery>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "leads.read")?;
    let items = crm
        .leads()
        .list(tenant.tenant_id(), query.status)
        .iter()
        .map(dto::lead_to_json)
        .collect();
    Ok(Json(dto::items(items)).into_response())
}

pub async fn get_lead(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "leads.read")?;
    let lead_id: LeadId = dto::parse_id(&id, "lead")?;
    let lead = crm.leads().get(tenant.tenant_id(), lead_id)?;
    if lead.is_deleted() {
        return Err(ApiError::NotFound("lead not found".into()));
    }
    Ok(Json(dto::lead_to_json(&lead)).into_response())
}

pub async fn update_lead(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<LeadDetails>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "leads.write")?;
    let lead_id: LeadId = dto::parse_id(&id, "lead")?;
    let lead = crm
        .leads()
        .update(&command_context(&tenant, &principal), lead_id, body)?;
    Ok(Json(dto::lead_to_json(&lead)).into_response())
}

pub async fn change_lead_status(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::StatusRequest<LeadStatus>>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "leads.write")?;
    let lead_id: LeadId = dto::parse_id(&id, "lead")?;
    let lead = crm
        .leads()
        .change_status(&command_context(&tenant, &principal), lead_id, body.status)?;
    Ok(Json(dto::lead_to_json(&lead)).into_response())
}

pub async fn delete_lead(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "leads.delete")?;
    let lead_id: LeadId = dto::parse_id(&id, "lead")?;
    crm.leads().delete(&command_context(&tenant, &principal), lead_id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn restore_lead(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "leads.delete")?;
    let lead_id: LeadId = dto::parse_id(&id, "lead")?;
    let lead = crm.leads().restore(&command_context(&tenant, &principal), lead_id)?;
    Ok(Json(dto::lead_to_json(&lead)).into_response())
}

/// Live duplicate search; threshold and limit default to the server settings.
pub async fn find_duplicates(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::DuplicateSearchQuery>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "leads.read")?;
    let lead_id: LeadId = dto::parse_id(&id, "lead")?;
    let defaults = crm.settings().duplicates;
    let query = DuplicateQuery {
        threshold: query.threshold.unwrap_or(defaults.threshold),
        limit: query.limit.unwrap_or(defaults.limit),
    };
    crm.leads().get(tenant.tenant_id(), lead_id)?;
    // Detection problems (a bad threshold included) read as "no duplicates".
    let matches = crm.duplicates().try_find(tenant.tenant_id(), lead_id, Some(query));
    Ok(Json(serde_json::json!({ "items": matches })).into_response())
}

pub async fn convert_lead(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ConvertOptions>>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "leads.convert")?;
    let lead_id: LeadId = dto::parse_id(&id, "lead")?;
    let options = body.map(|Json(o)| o).unwrap_or_default();
    let result = crm
        .leads()
        .convert(&command_context(&tenant, &principal), lead_id, options)?;
    Ok((StatusCode::CREATED, Json(dto::conversion_to_json(&result))).into_response())
}
