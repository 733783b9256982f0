use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::common::created;
use crate::auth::{Action, AuthUser};
use crate::errors::ServiceError;
use crate::models::PurchaseOrder;
use crate::services::purchase_orders::{CreatePurchaseOrder, UpdatePurchaseOrder};
use crate::{ApiResponse, ApiResult, AppState};

pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(purchase_request_id): Path<String>,
) -> ApiResult<Vec<PurchaseOrder>> {
    user.require(Action::View)?;
    let orders = state
        .services
        .purchase_orders
        .list_for(&purchase_request_id)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(purchase_request_id): Path<String>,
    Json(payload): Json<CreatePurchaseOrder>,
) -> Result<(StatusCode, Json<ApiResponse<PurchaseOrder>>), ServiceError> {
    let order = state
        .services
        .purchase_orders
        .create(&user, &purchase_request_id, payload)
        .await?;
    Ok(created(order))
}

pub async fn update_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePurchaseOrder>,
) -> ApiResult<PurchaseOrder> {
    let order = state
        .services
        .purchase_orders
        .update(&user, &id, payload)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn delete_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.services.purchase_orders.delete(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
