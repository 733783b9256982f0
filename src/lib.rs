//! Compras API Library
//!
//! Purchase request tracking on top of a PocketBase record store: folio
//! numbering for receptions, the yearly dashboard and the change history.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod models;
pub mod services;
pub mod store;
pub mod tracing;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use http::HeaderValue;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::config::AppConfig;
use crate::store::RecordStore;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn RecordStore>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn RecordStore>) -> Self {
        let services = handlers::AppServices::new(store.clone(), &config);
        Self {
            config,
            store,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!meta.timestamp.is_empty());
    }

    #[test]
    fn validation_errors_are_listed() {
        let response = ApiResponse::<()>::validation_errors(vec!["motivo: blank".into()]);
        assert!(!response.success);
        assert_eq!(response.errors, Some(vec!["motivo: blank".to_string()]));
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`. Every handler authenticates through `AuthUser`.
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{catalog, dashboard, purchase_orders, purchase_requests, receptions};

    Router::new()
        .route("/dashboard", get(dashboard::get_dashboard))
        // Compras
        .route(
            "/compras",
            get(purchase_requests::list_purchase_requests)
                .post(purchase_requests::create_purchase_request),
        )
        .route(
            "/compras/:id",
            get(purchase_requests::get_purchase_request)
                .patch(purchase_requests::update_purchase_request)
                .delete(purchase_requests::delete_purchase_request),
        )
        .route("/compras/:id/estado", post(purchase_requests::change_state))
        .route(
            "/compras/:id/anular",
            post(purchase_requests::cancel_purchase_request),
        )
        .route("/compras/:id/historial", get(purchase_requests::get_history))
        // Purchase orders
        .route(
            "/compras/:id/ordenes",
            get(purchase_orders::list_orders).post(purchase_orders::create_order),
        )
        .route(
            "/ordenes/:id",
            axum::routing::patch(purchase_orders::update_order)
                .delete(purchase_orders::delete_order),
        )
        // Receptions
        .route(
            "/recepciones",
            get(receptions::list_receptions).post(receptions::create_reception),
        )
        .route("/recepciones/siguiente-folio", get(receptions::next_folio))
        .route(
            "/recepciones/:id",
            get(receptions::get_reception).patch(receptions::update_reception),
        )
        .route("/recepciones/:id/anular", post(receptions::cancel_reception))
        // Lookup lists
        .route("/catalogos/requirentes", get(catalog::list_requesting_units))
        .route("/catalogos/subvenciones", get(catalog::list_subsidies))
        .route("/catalogos/compradores", get(catalog::list_buyers))
}

/// CORS policy derived from configuration.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if config.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if config.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        // load_config rejects this combination; keep the router closed if it slips through
        ::tracing::error!("Missing CORS configuration; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

/// Full application router: health probes, the v1 API and the HTTP layers.
pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout();
    let cors = cors_layer(&state.config);

    Router::<AppState>::new()
        .route("/", get(|| async { "compras-api up" }))
        .merge(handlers::health::health_routes())
        .nest("/api/v1", api_v1_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

pub mod prelude {
    pub use crate::errors::*;
    pub use crate::models::*;
    pub use crate::store::{RecordStore, StoreError};
    pub use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};
}
