use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{ListQuery, RecordPage, RecordStore, StoreError};

#[derive(Debug, Clone)]
pub struct PocketBaseConfig {
    /// Base URL, e.g. `http://127.0.0.1:8090`
    pub base_url: String,
    /// Superuser/service token used for data access
    pub token: Option<String>,
    pub timeout: Duration,
}

impl PocketBaseConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// PocketBase error envelope: `{"code":400,"message":"...","data":{"field":{"code":"...","message":"..."}}}`
#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: HashMap<String, FieldError>,
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    record: Value,
}

/// REST client for the PocketBase records API.
#[derive(Clone)]
pub struct PocketBaseClient {
    client: reqwest::Client,
    config: PocketBaseConfig,
}

impl PocketBaseClient {
    pub fn new(config: PocketBaseConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("compras-api/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn records_url(&self, collection: &str) -> String {
        format!("{}/api/collections/{}/records", self.base(), collection)
    }

    /// Ids are PocketBase-generated; anything else could rewrite the path.
    fn record_url(&self, collection: &str, id: &str) -> Result<String, StoreError> {
        if !is_record_id(id) {
            warn!(collection, id, "refusing malformed record id");
            return Err(StoreError::NotFound(format!("{}/{}", collection, id)));
        }
        Ok(format!("{}/{}", self.records_url(collection), id))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.token {
            Some(token) => builder.header(AUTHORIZATION, token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, StoreError> {
        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, target_record = what, "PocketBase request failed");
            StoreError::Transport(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        Err(map_error(status, body, what))
    }

    async fn json(&self, builder: RequestBuilder, what: &str) -> Result<Value, StoreError> {
        self.send(builder, what)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

fn map_error(status: StatusCode, body: ErrorBody, what: &str) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        return StoreError::NotFound(what.to_string());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return StoreError::Unauthorized(body.message);
    }
    if let Some((field, _)) = body
        .data
        .iter()
        .find(|(_, err)| err.code == "validation_not_unique")
    {
        return StoreError::UniqueViolation {
            field: field.clone(),
        };
    }

    let mut details: Vec<String> = body
        .data
        .iter()
        .map(|(field, err)| format!("{}: {}", field, err.code))
        .collect();
    details.sort();
    let message = if details.is_empty() {
        body.message
    } else {
        format!("{} ({})", body.message, details.join(", "))
    };
    StoreError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl RecordStore for PocketBaseClient {
    #[instrument(skip(self, query), fields(page = query.page))]
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<RecordPage, StoreError> {
        let mut params: Vec<(&str, String)> = vec![
            ("page", query.page.to_string()),
            ("perPage", query.per_page.to_string()),
        ];
        if let Some(filter) = &query.filter {
            params.push(("filter", filter.clone()));
        }
        if let Some(sort) = &query.sort {
            params.push(("sort", sort.clone()));
        }
        if let Some(expand) = &query.expand {
            params.push(("expand", expand.clone()));
        }
        debug!(filter = ?query.filter, "listing records");

        let builder = self
            .request(Method::GET, self.records_url(collection))
            .query(&params);
        let value = self.json(builder, collection).await?;
        serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn get_one(
        &self,
        collection: &str,
        id: &str,
        expand: Option<String>,
    ) -> Result<Value, StoreError> {
        let mut builder = self.request(Method::GET, self.record_url(collection, id)?);
        if let Some(expand) = expand {
            builder = builder.query(&[("expand", expand)]);
        }
        self.json(builder, &format!("{}/{}", collection, id)).await
    }

    #[instrument(skip(self, body))]
    async fn create(&self, collection: &str, body: Value) -> Result<Value, StoreError> {
        let builder = self
            .request(Method::POST, self.records_url(collection))
            .json(&body);
        self.json(builder, collection).await
    }

    #[instrument(skip(self, body))]
    async fn update(&self, collection: &str, id: &str, body: Value) -> Result<Value, StoreError> {
        let builder = self
            .request(Method::PATCH, self.record_url(collection, id)?)
            .json(&body);
        self.json(builder, &format!("{}/{}", collection, id)).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let builder = self.request(Method::DELETE, self.record_url(collection, id)?);
        self.send(builder, &format!("{}/{}", collection, id)).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn authenticate(&self, token: &str) -> Result<Value, StoreError> {
        let url = format!(
            "{}/api/collections/{}/auth-refresh",
            self.base(),
            super::collections::USERS
        );
        let response = self
            .send(
                self.client.post(url).header(AUTHORIZATION, token),
                "auth-refresh",
            )
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) | StoreError::Api { .. } => {
                    StoreError::Unauthorized("invalid or expired token".to_string())
                }
                other => other,
            })?;
        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(auth.record)
    }

    fn file_url(&self, collection: &str, record_id: &str, filename: &str) -> String {
        let raw = format!("{}/api/files/{}/{}", self.base(), collection, record_id);
        match url::Url::parse(&raw) {
            Ok(mut url) => {
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments.push(filename);
                }
                url.to_string()
            }
            Err(_) => format!("{}/{}", raw, filename),
        }
    }
}

fn is_record_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> ErrorBody {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn unique_violation_is_recognised() {
        let err = map_error(
            StatusCode::BAD_REQUEST,
            body(json!({
                "code": 400,
                "message": "Failed to create record.",
                "data": { "folio": { "code": "validation_not_unique", "message": "Value must be unique." } }
            })),
            "recepciones",
        );
        assert_eq!(
            err,
            StoreError::UniqueViolation {
                field: "folio".into()
            }
        );
    }

    #[test]
    fn other_validation_errors_keep_field_codes() {
        let err = map_error(
            StatusCode::BAD_REQUEST,
            body(json!({
                "code": 400,
                "message": "Failed to create record.",
                "data": { "monto": { "code": "validation_required", "message": "Missing required value." } }
            })),
            "ordenes_compra",
        );
        assert_eq!(
            err,
            StoreError::Api {
                status: 400,
                message: "Failed to create record. (monto: validation_required)".into()
            }
        );
    }

    #[rstest::rstest]
    #[case("abc123", true)]
    #[case("a_b-C9", true)]
    #[case("", false)]
    #[case("..", false)]
    #[case("../../users/records/x", false)]
    #[case("x?expand=comprador", false)]
    fn record_ids_are_restricted(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(is_record_id(id), valid);
    }

    #[test]
    fn file_url_encodes_the_file_name() {
        let client =
            PocketBaseClient::new(PocketBaseConfig::new("http://127.0.0.1:8090/")).unwrap();
        assert_eq!(
            client.file_url("recepciones", "abc123", "guia despacho.pdf"),
            "http://127.0.0.1:8090/api/files/recepciones/abc123/guia%20despacho.pdf"
        );
    }
}
