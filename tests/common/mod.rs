//! Shared harness: the real router and PocketBase client, pointed at a
//! `wiremock` server standing in for PocketBase.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use compras_api::{config::AppConfig, store::PocketBaseClient, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, Request as MockRequest, ResponseTemplate,
};

pub const TIMESTAMP: &str = "2026-05-04 12:00:00.000Z";

pub struct TestApp {
    pub server: MockServer,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let config = AppConfig::new(server.uri());
        let client = PocketBaseClient::new(config.pocketbase_config())
            .expect("client should build against the mock server");
        let state = AppState::new(config, Arc::new(client));
        let router = compras_api::build_router(state);
        Self { server, router }
    }

    /// Makes `token` resolve to a user with `role`.
    pub async fn login(&self, token: &str, user_id: &str, role: &str) {
        Mock::given(method("POST"))
            .and(path("/api/collections/users/auth-refresh"))
            .and(header("authorization", token))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": token,
                "record": {
                    "id": user_id,
                    "name": format!("Usuario {}", user_id),
                    "email": format!("{}@example.cl", user_id),
                    "role": role
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Every create on `collection` succeeds and echoes the body back as the stored record.
    pub async fn echo_creates(&self, collection: &str, id_prefix: &'static str) {
        Mock::given(method("POST"))
            .and(path(records_path(collection)))
            .respond_with(move |request: &MockRequest| {
                ResponseTemplate::new(200).set_body_json(stored(request, id_prefix))
            })
            .mount(&self.server)
            .await;
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    /// Bodies PocketBase received on `POST` to `collection`, in arrival order.
    pub async fn created_bodies(&self, collection: &str) -> Vec<Value> {
        let wanted = records_path(collection);
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == wanted)
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }
}

pub fn records_path(collection: &str) -> String {
    format!("/api/collections/{}/records", collection)
}

pub fn record_path(collection: &str, id: &str) -> String {
    format!("{}/{}", records_path(collection), id)
}

fn stored(request: &MockRequest, id_prefix: &str) -> Value {
    let mut record: Value = serde_json::from_slice(&request.body).unwrap_or_else(|_| json!({}));
    record["id"] = json!(format!("{}1", id_prefix));
    record["created"] = json!(TIMESTAMP);
    record["updated"] = json!(TIMESTAMP);
    record
}

/// PocketBase list envelope.
pub fn page(items: Vec<Value>) -> Value {
    let total = items.len();
    json!({
        "page": 1,
        "perPage": total.max(1),
        "totalItems": total,
        "totalPages": if total == 0 { 0 } else { 1 },
        "items": items
    })
}

pub fn compra(id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "numero_ordinal": 12,
        "unidad_requirente": "req1",
        "comprador": "u9",
        "subvencion": "s1",
        "descripcion": "Resmas de papel",
        "presupuesto": 150000,
        "estado": state,
        "fecha_solicitud": "2026-03-01 00:00:00.000Z",
        "created": "2026-03-01 10:00:00.000Z",
        "updated": "2026-03-02 10:00:00.000Z"
    })
}

/// Validation failure PocketBase returns for a duplicated unique field.
pub fn not_unique(field: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "code": 400,
        "message": "Failed to create record.",
        "data": { field: { "code": "validation_not_unique", "message": "Value must be unique." } }
    }))
}
