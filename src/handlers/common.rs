use axum::{http::StatusCode, Json};
use chrono::{Datelike, Utc};
use serde::Serialize;

use crate::store::RecordPage;
use crate::{ApiResponse, PaginatedResponse};

/// Success envelope with `201 Created`.
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

impl<T> From<RecordPage<T>> for PaginatedResponse<T> {
    fn from(page: RecordPage<T>) -> Self {
        Self {
            items: page.items,
            total: page.total_items,
            page: u64::from(page.page),
            limit: u64::from(page.per_page),
            total_pages: u64::from(page.total_pages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_pages_map_to_the_response_shape() {
        let page = RecordPage {
            page: 2,
            per_page: 30,
            total_items: 45,
            total_pages: 2,
            items: vec!["a", "b"],
        };
        let response = PaginatedResponse::from(page);
        assert_eq!(response.total, 45);
        assert_eq!(response.page, 2);
        assert_eq!(response.limit, 30);
        assert_eq!(response.total_pages, 2);
        assert_eq!(response.items, vec!["a", "b"]);
    }
}
