use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::common::current_year;
use crate::auth::{Action, AuthUser};
use crate::errors::ServiceError;
use crate::services::dashboard::DashboardStats;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, Default)]
pub struct DashboardQuery {
    /// Defaults to the current year
    pub year: Option<i32>,
}

pub async fn get_dashboard(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<DashboardStats> {
    user.require(Action::View)?;
    let year = query.year.unwrap_or_else(current_year);
    if !(2000..=2100).contains(&year) {
        return Err(ServiceError::ValidationError(format!(
            "year: {} is out of range",
            year
        )));
    }

    let stats = state.services.dashboard.stats_for_year(year).await?;
    Ok(Json(ApiResponse::success(stats)))
}
