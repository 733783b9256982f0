use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::common::created;
use crate::auth::{Action, AuthUser};
use crate::errors::ServiceError;
use crate::models::Reception;
use crate::services::receptions::{
    CancelReception, CreateReception, ReceptionFilters, ReceptionView, UpdateReception,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[derive(Debug, Serialize)]
pub struct NextFolio {
    pub folio: String,
}

pub async fn list_receptions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filters): Query<ReceptionFilters>,
) -> ApiResult<PaginatedResponse<Reception>> {
    user.require(Action::View)?;
    let page = state.services.receptions.list(filters).await?;
    Ok(Json(ApiResponse::success(page.into())))
}

pub async fn get_reception(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ReceptionView> {
    user.require(Action::View)?;
    let reception = state.services.receptions.get(&id).await?;
    Ok(Json(ApiResponse::success(reception)))
}

/// Preview only; the folio is assigned for real when the reception is saved.
pub async fn next_folio(State(state): State<AppState>, user: AuthUser) -> ApiResult<NextFolio> {
    user.require(Action::View)?;
    let folio = state.services.receptions.next_folio().await?;
    Ok(Json(ApiResponse::success(NextFolio { folio })))
}

pub async fn create_reception(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateReception>,
) -> Result<(StatusCode, Json<ApiResponse<ReceptionView>>), ServiceError> {
    let reception = state.services.receptions.create(&user, payload).await?;
    Ok(created(reception))
}

pub async fn update_reception(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateReception>,
) -> ApiResult<ReceptionView> {
    let reception = state
        .services
        .receptions
        .update(&user, &id, payload)
        .await?;
    Ok(Json(ApiResponse::success(reception)))
}

pub async fn cancel_reception(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<CancelReception>,
) -> ApiResult<ReceptionView> {
    let reception = state
        .services
        .receptions
        .cancel(&user, &id, payload)
        .await?;
    Ok(Json(ApiResponse::success(reception)))
}
