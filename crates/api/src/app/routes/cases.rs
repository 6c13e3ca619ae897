use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use nimbus_infra::Crm;
use nimbus_infra::services::NewCase;
use nimbus_support::{CaseDetails, CaseStatus, SupportCase, SupportCaseId};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, command_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_case).get(list_cases))
        .route("/:id", get(get_case).put(update_case).delete(delete_case))
        .route("/:id/restore", post(restore_case))
        .route("/:id/assign", post(assign_case))
        .route("/:id/status", post(change_case_status))
        .route("/:id/resolve", post(resolve_case))
        .route("/:id/reopen", post(reopen_case))
}

fn case_id(raw: &str) -> Result<SupportCaseId, ApiError> {
    dto::parse_id(raw, "support case")
}

fn case_response(status: StatusCode, case: &SupportCase) -> Response {
    (status, Json(dto::case_to_json(case))).into_response()
}

pub async fn open_case(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewCase>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.write")?;
    let case = crm.support().open(&command_context(&tenant, &principal), body)?;
    Ok(case_response(StatusCode::CREATED, &case))
}

pub async fn list_cases(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::CaseListQuery>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.read")?;
    let items = crm
        .support()
        .list(tenant.tenant_id(), query.status, query.assignee)
        .iter()
        .map(dto::case_to_json)
        .collect();
    Ok(Json(dto::items(items)).into_response())
}

pub async fn get_case(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.read")?;
    let case = crm.support().get(tenant.tenant_id(), case_id(&id)?)?;
    if case.is_deleted() {
        return Err(ApiError::NotFound("support case not found".into()));
    }
    Ok(case_response(StatusCode::OK, &case))
}

pub async fn update_case(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CaseDetails>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.write")?;
    let case = crm
        .support()
        .update_details(&command_context(&tenant, &principal), case_id(&id)?, body)?;
    Ok(case_response(StatusCode::OK, &case))
}

pub async fn assign_case(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignCaseRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.write")?;
    let case = crm
        .support()
        .assign(&command_context(&tenant, &principal), case_id(&id)?, body.assignee)?;
    Ok(case_response(StatusCode::OK, &case))
}

pub async fn change_case_status(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::StatusRequest<CaseStatus>>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.write")?;
    let case = crm
        .support()
        .change_status(&command_context(&tenant, &principal), case_id(&id)?, body.status)?;
    Ok(case_response(StatusCode::OK, &case))
}

pub async fn resolve_case(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ResolveCaseRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.write")?;
    let case = crm
        .support()
        .resolve(&command_context(&tenant, &principal), case_id(&id)?, body.resolution)?;
    Ok(case_response(StatusCode::OK, &case))
}

pub async fn reopen_case(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.write")?;
    let case = crm
        .support()
        .reopen(&command_context(&tenant, &principal), case_id(&id)?)?;
    Ok(case_response(StatusCode::OK, &case))
}

pub async fn delete_case(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.delete")?;
    crm.support()
        .delete(&command_context(&tenant, &principal), case_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn restore_case(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "cases.delete")?;
    let case = crm
        .support()
        .restore(&command_context(&tenant, &principal), case_id(&id)?)?;
    Ok(case_response(StatusCode::OK, &case))
}
