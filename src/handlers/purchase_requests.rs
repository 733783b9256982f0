use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::common::created;
use crate::auth::{Action, AuthUser};
use crate::errors::ServiceError;
use crate::models::{HistoryEntry, PurchaseRequest};
use crate::services::purchase_requests::{
    CancelRequest, ChangeStateRequest, CreatePurchaseRequest, PurchaseRequestFilters,
    UpdatePurchaseRequest,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

pub async fn list_purchase_requests(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filters): Query<PurchaseRequestFilters>,
) -> ApiResult<PaginatedResponse<PurchaseRequest>> {
    user.require(Action::View)?;
    let page = state.services.purchase_requests.list(filters).await?;
    Ok(Json(ApiResponse::success(page.into())))
}

pub async fn get_purchase_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<PurchaseRequest> {
    user.require(Action::View)?;
    let record = state.services.purchase_requests.get(&id).await?;
    Ok(Json(ApiResponse::success(record)))
}

pub async fn create_purchase_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePurchaseRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PurchaseRequest>>), ServiceError> {
    let record = state
        .services
        .purchase_requests
        .create(&user, payload)
        .await?;
    Ok(created(record))
}

pub async fn update_purchase_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePurchaseRequest>,
) -> ApiResult<PurchaseRequest> {
    let record = state
        .services
        .purchase_requests
        .update(&user, &id, payload)
        .await?;
    Ok(Json(ApiResponse::success(record)))
}

pub async fn change_state(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<ChangeStateRequest>,
) -> ApiResult<PurchaseRequest> {
    let record = state
        .services
        .purchase_requests
        .change_state(&user, &id, payload.estado)
        .await?;
    Ok(Json(ApiResponse::success(record)))
}

pub async fn cancel_purchase_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<CancelRequest>,
) -> ApiResult<PurchaseRequest> {
    let record = state
        .services
        .purchase_requests
        .cancel(&user, &id, payload)
        .await?;
    Ok(Json(ApiResponse::success(record)))
}

pub async fn delete_purchase_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.services.purchase_requests.delete(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Vec<HistoryEntry>> {
    user.require(Action::View)?;
    let entries = state.services.history.list_for(&id).await?;
    Ok(Json(ApiResponse::success(entries)))
}
