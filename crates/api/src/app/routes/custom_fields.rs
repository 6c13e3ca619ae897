use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use nimbus_custom_fields::CustomFieldId;
use nimbus_infra::Crm;
use nimbus_infra::services::{CustomFieldChanges, NewCustomField};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, command_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(define_field).get(list_fields))
        .route("/:id", get(get_field).patch(revise_field))
}

pub async fn define_field(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewCustomField>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "custom_fields.write")?;
    let definition = crm
        .custom_fields()
        .define(&command_context(&tenant, &principal), body)?;
    Ok((StatusCode::CREATED, Json(definition)).into_response())
}

pub async fn list_fields(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::FieldListQuery>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "custom_fields.read")?;
    let definitions = crm.custom_fields().list(tenant.tenant_id(), query.entity);
    Ok(Json(serde_json::json!({ "items": definitions })).into_response())
}

pub async fn get_field(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "custom_fields.read")?;
    let id: CustomFieldId = dto::parse_id(&id, "custom field")?;
    let definition = crm.custom_fields().get(tenant.tenant_id(), id)?;
    Ok(Json(definition).into_response())
}

pub async fn revise_field(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CustomFieldChanges>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "custom_fields.write")?;
    let id: CustomFieldId = dto::parse_id(&id, "custom field")?;
    let definition = crm
        .custom_fields()
        .revise(&command_context(&tenant, &principal), id, body)?;
    Ok(Json(definition).into_response())
}
