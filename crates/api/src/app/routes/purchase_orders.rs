use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use nimbus_infra::Crm;
use nimbus_infra::services::NewPurchaseOrder;
use nimbus_purchasing::{LineInput, Payment, PurchaseOrderId, PurchaseOrderStatus};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, command_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order).delete(delete_order))
        .route("/:id/restore", post(restore_order))
        .route("/:id/lines", post(add_line))
        .route("/:id/lines/:line_no", put(update_line).delete(remove_line))
        .route("/:id/adjustments", put(set_adjustments))
        .route("/:id/status", post(change_status))
        .route("/:id/payments", post(record_payment))
}

fn order_id(raw: &str) -> Result<PurchaseOrderId, ApiError> {
    dto::parse_id(raw, "purchase order")
}

fn order_response(status: StatusCode, order: &nimbus_purchasing::PurchaseOrder) -> Response {
    (status, Json(dto::purchase_order_to_json(order))).into_response()
}

pub async fn create_order(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewPurchaseOrder>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.write")?;
    let order = crm
        .purchase_orders()
        .create(&command_context(&tenant, &principal), body)?;
    Ok(order_response(StatusCode::CREATED, &order))
}

pub async fn list_orders(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::OrderListQuery>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.read")?;
    let items = crm
        .purchase_orders()
        .list(tenant.tenant_id(), query.status)
        .iter()
        .map(dto::purchase_order_to_json)
        .collect();
    Ok(Json(dto::items(items)).into_response())
}

pub async fn get_order(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.read")?;
    let order = crm.purchase_orders().get(tenant.tenant_id(), order_id(&id)?)?;
    if order.is_deleted() {
        return Err(ApiError::NotFound("purchase order not found".into()));
    }
    Ok(order_response(StatusCode::OK, &order))
}

pub async fn add_line(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<LineInput>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.write")?;
    let order = crm.purchase_orders().add_line(
        &command_context(&tenant, &principal),
        order_id(&id)?,
        body,
    )?;
    Ok(order_response(StatusCode::OK, &order))
}

pub async fn update_line(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
    Json(body): Json<LineInput>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.write")?;
    let order = crm.purchase_orders().update_line(
        &command_context(&tenant, &principal),
        order_id(&id)?,
        line_no,
        body,
    )?;
    Ok(order_response(StatusCode::OK, &order))
}

pub async fn remove_line(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.write")?;
    let order = crm.purchase_orders().remove_line(
        &command_context(&tenant, &principal),
        order_id(&id)?,
        line_no,
    )?;
    Ok(order_response(StatusCode::OK, &order))
}

pub async fn set_adjustments(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustmentsRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.write")?;
    let order = crm.purchase_orders().set_adjustments(
        &command_context(&tenant, &principal),
        order_id(&id)?,
        body.order_discount_minor,
        body.shipping_minor,
    )?;
    Ok(order_response(StatusCode::OK, &order))
}

pub async fn change_status(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::StatusRequest<PurchaseOrderStatus>>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.approve")?;
    let order = crm.purchase_orders().change_status(
        &command_context(&tenant, &principal),
        order_id(&id)?,
        body.status,
    )?;
    Ok(order_response(StatusCode::OK, &order))
}

pub async fn record_payment(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PaymentRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.write")?;
    let payment = Payment {
        amount_minor: body.amount_minor,
        paid_on: body.paid_on,
        reference: body.reference,
    };
    let order = crm.purchase_orders().record_payment(
        &command_context(&tenant, &principal),
        order_id(&id)?,
        payment,
    )?;
    Ok(order_response(StatusCode::OK, &order))
}

pub async fn delete_order(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.delete")?;
    crm.purchase_orders()
        .delete(&command_context(&tenant, &principal), order_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn restore_order(
    Extension(crm): Extension<Arc<Crm>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "purchase_orders.delete")?;
    let order = crm
        .purchase_orders()
        .restore(&command_context(&tenant, &principal), order_id(&id)?)?;
    Ok(order_response(StatusCode::OK, &order))
}
