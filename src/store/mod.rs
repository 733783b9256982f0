/*!
 * # Record Store
 *
 * Persistence is delegated to a PocketBase backend. Services only see the
 * [`RecordStore`] trait, which speaks raw JSON records; typed decoding lives
 * in the service layer.
 */

pub mod filter;
pub mod pocketbase;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use filter::Filter;
pub use pocketbase::{PocketBaseClient, PocketBaseConfig};

/// Collection names as configured in PocketBase.
pub mod collections {
    pub const COMPRAS: &str = "compras";
    pub const ORDENES_COMPRA: &str = "ordenes_compra";
    pub const RECEPCIONES: &str = "recepciones";
    pub const RECEPCION_DETALLES: &str = "recepcion_detalles";
    pub const HISTORIAL_COMPRAS: &str = "historial_compras";
    pub const REQUIRENTES: &str = "requirentes";
    pub const SUBVENCIONES: &str = "subvenciones";
    pub const USERS: &str = "users";
    pub const RRHH_SEP: &str = "rrhh_sep";
    pub const PROYECCION_SEP: &str = "proyeccion_sep";
}

/// Largest page PocketBase serves in one list call.
pub const MAX_PAGE_SIZE: u32 = 500;
const FULL_LIST_PAGE_SIZE: u32 = 200;

/// Record store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("value for '{field}' must be unique")]
    UniqueViolation { field: String },
    #[error("store rejected the request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("authentication rejected: {0}")]
    Unauthorized(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed record: {0}")]
    Decode(String),
}

/// List parameters understood by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub expand: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 30,
            filter: None,
            sort: None,
            expand: None,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page.max(1);
        self.per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.filter = if filter.is_empty() { None } else { Some(filter) };
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }
}

/// One page of records as returned by PocketBase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage<T = Value> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub items: Vec<T>,
}

impl RecordPage<Value> {
    /// Decodes every item into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<RecordPage<T>, StoreError> {
        let items = self
            .items
            .into_iter()
            .map(decode_record)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(RecordPage {
            page: self.page,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            items,
        })
    }
}

pub fn decode_record<T: DeserializeOwned>(value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<RecordPage, StoreError>;

    async fn get_one(
        &self,
        collection: &str,
        id: &str,
        expand: Option<String>,
    ) -> Result<Value, StoreError>;

    async fn create(&self, collection: &str, body: Value) -> Result<Value, StoreError>;

    async fn update(&self, collection: &str, id: &str, body: Value) -> Result<Value, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Resolves a user auth token into the user record it belongs to.
    async fn authenticate(&self, token: &str) -> Result<Value, StoreError>;

    fn file_url(&self, collection: &str, record_id: &str, filename: &str) -> String;
}

/// Fetches every page matching `query`, ignoring its paging fields.
pub async fn list_all(
    store: &dyn RecordStore,
    collection: &str,
    query: &ListQuery,
) -> Result<Vec<Value>, StoreError> {
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let request = query.clone().page(page, FULL_LIST_PAGE_SIZE);
        let result = store.list(collection, &request).await?;
        let fetched = result.items.len();
        items.extend(result.items);
        if fetched == 0 || page >= result.total_pages {
            break;
        }
        page += 1;
    }
    Ok(items)
}

/// Fetches the first record matching `query`, if any.
pub async fn first(
    store: &dyn RecordStore,
    collection: &str,
    query: &ListQuery,
) -> Result<Option<Value>, StoreError> {
    let request = query.clone().page(1, 1);
    let result = store.list(collection, &request).await?;
    Ok(result.items.into_iter().next())
}

#[cfg(test)]
pub(crate) fn page_of(items: Vec<Value>) -> RecordPage {
    let total = items.len() as u64;
    RecordPage {
        page: 1,
        per_page: items.len().max(1) as u32,
        total_items: total,
        total_pages: if total == 0 { 0 } else { 1 },
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn list_all_walks_every_page() {
        let mut store = MockRecordStore::new();
        store
            .expect_list()
            .withf(|collection, _| collection == "compras")
            .times(2)
            .returning(|_, q| {
                Ok(RecordPage {
                    page: q.page,
                    per_page: q.per_page,
                    total_items: 2,
                    total_pages: 2,
                    items: vec![json!({ "id": format!("r{}", q.page) })],
                })
            });

        let items = list_all(&store, "compras", &ListQuery::new()).await.unwrap();
        assert_eq!(items, vec![json!({"id": "r1"}), json!({"id": "r2"})]);
    }

    #[tokio::test]
    async fn first_requests_a_single_record() {
        let mut store = MockRecordStore::new();
        store
            .expect_list()
            .withf(|_, q| q.per_page == 1 && q.sort.as_deref() == Some("-folio"))
            .returning(|_, _| Ok(page_of(vec![json!({"folio": "REC-LU26-004"})])));

        let found = first(&store, "recepciones", &ListQuery::new().sort("-folio"))
            .await
            .unwrap();
        assert_eq!(found, Some(json!({"folio": "REC-LU26-004"})));
    }

    #[test]
    fn list_query_clamps_paging() {
        let q = ListQuery::new().page(0, 10_000);
        assert_eq!(q.page, 1);
        assert_eq!(q.per_page, MAX_PAGE_SIZE);
        assert_eq!(ListQuery::new().filter("").filter, None);
    }
}
