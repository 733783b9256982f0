use axum::extract::State;
use axum::Json;

use crate::auth::{Action, AuthUser};
use crate::models::{RequestingUnit, Subsidy, User};
use crate::{ApiResponse, ApiResult, AppState};

pub async fn list_requesting_units(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<RequestingUnit>> {
    user.require(Action::View)?;
    let units = state.services.catalog.requesting_units().await?;
    Ok(Json(ApiResponse::success(units)))
}

pub async fn list_subsidies(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<Subsidy>> {
    user.require(Action::View)?;
    let subsidies = state.services.catalog.subsidies().await?;
    Ok(Json(ApiResponse::success(subsidies)))
}

pub async fn list_buyers(State(state): State<AppState>, user: AuthUser) -> ApiResult<Vec<User>> {
    user.require(Action::View)?;
    let buyers = state.services.catalog.buyers().await?;
    Ok(Json(ApiResponse::success(buyers)))
}
