use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use nimbus_contacts::CompanyId;
use nimbus_infra::Crm;
use nimbus_infra::services::{CompanyChanges, NewCompany};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, command_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_company).get(list_companies))
        .route("/:id", get(get_company).patch(update_company).delete(delete_company))
        .route("/:id/restore", post(restore_company))
}

pub async fn create_company(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewCompany>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "companies.write")?;
    let company = crm
        .contacts()
        .create_company(&command_context(&tenant, &principal), body)?;
    Ok((StatusCode::CREATED, Json(dto::company_to_json(&company))).into_response())
}

pub async fn list_companies(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::CompanyListQuery>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "companies.read")?;
    let items = crm
        .contacts()
        .list_companies(tenant.tenant_id(), query.kind)
        .iter()
        .map(dto::company_to_json)
        .collect();
    Ok(Json(dto::items(items)).into_response())
}

pub async fn get_company(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "companies.read")?;
    let company_id: CompanyId = dto::parse_id(&id, "company")?;
    let company = crm.contacts().live_company(tenant.tenant_id(), company_id)?;
    Ok(Json(dto::company_to_json(&company)).into_response())
}

pub async fn update_company(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CompanyChanges>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "companies.write")?;
    let company_id: CompanyId = dto::parse_id(&id, "company")?;
    let company = crm
        .contacts()
        .update_company(&command_context(&tenant, &principal), company_id, body)?;
    Ok(Json(dto::company_to_json(&company)).into_response())
}

pub async fn delete_company(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "companies.delete")?;
    let company_id: CompanyId = dto::parse_id(&id, "company")?;
    crm.contacts()
        .delete_company(&command_context(&tenant, &principal), company_id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn restore_company(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "companies.delete")?;
    let company_id: CompanyId = dto::parse_id(&id, "company")?;
    let company = crm
        .contacts()
        .restore_company(&command_context(&tenant, &principal), company_id)?;
    Ok(Json(dto::company_to_json(&company)).into_response())
}
