use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};

use nimbus_core::UserId;
use nimbus_infra::Crm;
use nimbus_infra::services::{GroupChanges, NewGroup};
use nimbus_security::{AccessLevel, RecordRef, SecurityGroup, SecurityGroupId};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, command_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_group).get(list_groups))
        .route("/tree", get(group_tree))
        .route("/access", get(effective_access))
        .route("/:id", get(get_group).patch(update_group).delete(delete_group))
        .route("/:id/restore", post(restore_group))
        .route("/:id/members", post(add_member))
        .route("/:id/members/:user_id", delete(remove_member))
        .route("/:id/grants", post(grant_access).delete(revoke_access))
}

fn group_id(raw: &str) -> Result<SecurityGroupId, ApiError> {
    dto::parse_id(raw, "security group")
}

fn group_response(status: StatusCode, group: &SecurityGroup) -> Response {
    (status, Json(dto::group_to_json(group))).into_response()
}

pub async fn create_group(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewGroup>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.write")?;
    let group = crm
        .security_groups()
        .create(&command_context(&tenant, &principal), body)?;
    Ok(group_response(StatusCode::CREATED, &group))
}

pub async fn list_groups(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.read")?;
    let items = crm
        .security_groups()
        .list(tenant.tenant_id())
        .iter()
        .map(dto::group_to_json)
        .collect();
    Ok(Json(dto::items(items)).into_response())
}

pub async fn group_tree(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.read")?;
    let roots = crm.security_groups().tree(tenant.tenant_id());
    Ok(Json(serde_json::json!({ "items": roots })).into_response())
}

pub async fn get_group(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.read")?;
    let group = crm.security_groups().get(tenant.tenant_id(), group_id(&id)?)?;
    if group.is_deleted() {
        return Err(ApiError::NotFound("security group not found".into()));
    }
    Ok(group_response(StatusCode::OK, &group))
}

/// Field edits and re-parenting. `"parent_id": null` moves the group to the
/// root; omitting the key leaves the parent unchanged.
pub async fn update_group(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<GroupChanges>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.write")?;
    let group = crm
        .security_groups()
        .update(&command_context(&tenant, &principal), group_id(&id)?, body)?;
    Ok(group_response(StatusCode::OK, &group))
}

pub async fn delete_group(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.write")?;
    crm.security_groups()
        .delete(&command_context(&tenant, &principal), group_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn restore_group(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.write")?;
    let group = crm
        .security_groups()
        .restore(&command_context(&tenant, &principal), group_id(&id)?)?;
    Ok(group_response(StatusCode::OK, &group))
}

pub async fn add_member(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::MemberRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.write")?;
    let group = crm.security_groups().add_member(
        &command_context(&tenant, &principal),
        group_id(&id)?,
        body.user_id,
    )?;
    Ok(group_response(StatusCode::OK, &group))
}

pub async fn remove_member(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.write")?;
    let user_id: UserId = dto::parse_id(&user_id, "user")?;
    let group = crm.security_groups().remove_member(
        &command_context(&tenant, &principal),
        group_id(&id)?,
        user_id,
    )?;
    Ok(group_response(StatusCode::OK, &group))
}

pub async fn grant_access(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordAccessRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.write")?;
    let level = body
        .level
        .ok_or_else(|| ApiError::BadRequest("level is required when granting access".into()))?;
    let group = crm.security_groups().grant_record_access(
        &command_context(&tenant, &principal),
        group_id(&id)?,
        body.record_type,
        &body.record_ids,
        level,
    )?;
    Ok(group_response(StatusCode::OK, &group))
}

pub async fn revoke_access(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordAccessRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.write")?;
    let group = crm.security_groups().revoke_record_access(
        &command_context(&tenant, &principal),
        group_id(&id)?,
        body.record_type,
        &body.record_ids,
    )?;
    Ok(group_response(StatusCode::OK, &group))
}

/// Strongest access a user holds on one record through group membership.
pub async fn effective_access(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::EffectiveAccessQuery>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "groups.read")?;
    let record = RecordRef {
        record_type: query.record_type,
        record_id: query.record_id,
    };
    let level: Option<AccessLevel> =
        crm.security_groups()
            .effective_access(tenant.tenant_id(), query.user_id, &record);
    Ok(Json(serde_json::json!({
        "user_id": query.user_id,
        "record_type": record.record_type,
        "record_id": record.record_id,
        "level": level,
    }))
    .into_response())
}
