use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use nimbus_contacts::PersonId;
use nimbus_infra::Crm;
use nimbus_infra::services::{NewPerson, PersonChanges};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, command_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_person).get(list_people))
        .route("/:id", get(get_person).patch(update_person).delete(delete_person))
        .route("/:id/restore", post(restore_person))
}

pub async fn create_person(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewPerson>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "people.write")?;
    let person = crm
        .contacts()
        .create_person(&command_context(&tenant, &principal), body)?;
    Ok((StatusCode::CREATED, Json(dto::person_to_json(&person))).into_response())
}

pub async fn list_people(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::PersonListQuery>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "people.read")?;
    let items = crm
        .contacts()
        .list_people(tenant.tenant_id(), query.company_id)
        .iter()
        .map(dto::person_to_json)
        .collect();
    Ok(Json(dto::items(items)).into_response())
}

pub async fn get_person(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "people.read")?;
    let person_id: PersonId = dto::parse_id(&id, "person")?;
    let person = crm.contacts().live_person(tenant.tenant_id(), person_id)?;
    Ok(Json(dto::person_to_json(&person)).into_response())
}

pub async fn update_person(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<PersonChanges>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "people.write")?;
    let person_id: PersonId = dto::parse_id(&id, "person")?;
    let person = crm
        .contacts()
        .update_person(&command_context(&tenant, &principal), person_id, body)?;
    Ok(Json(dto::person_to_json(&person)).into_response())
}

pub async fn delete_person(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "people.delete")?;
    let person_id: PersonId = dto::parse_id(&id, "person")?;
    crm.contacts()
        .delete_person(&command_context(&tenant, &principal), person_id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn restore_person(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "people.delete")?;
    let person_id: PersonId = dto::parse_id(&id, "person")?;
    let person = crm
        .contacts()
        .restore_person(&command_context(&tenant, &principal), person_id)?;
    Ok(Json(dto::person_to_json(&person)).into_response())
}
