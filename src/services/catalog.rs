use std::sync::Arc;
use tracing::instrument;

use crate::auth::Role;
use crate::errors::ServiceError;
use crate::models::{RequestingUnit, Subsidy, User};
use crate::store::{collections, decode_record, list_all, Filter, ListQuery, RecordStore};

/// Lookup lists used by the purchase request forms.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn RecordStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn all<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        query: ListQuery,
    ) -> Result<Vec<T>, ServiceError> {
        let raw = list_all(self.store.as_ref(), collection, &query).await?;
        raw.into_iter()
            .map(|value| decode_record(value).map_err(ServiceError::from))
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn requesting_units(&self) -> Result<Vec<RequestingUnit>, ServiceError> {
        self.all(collections::REQUIRENTES, ListQuery::new().sort("nombre"))
            .await
    }

    #[instrument(skip(self))]
    pub async fn subsidies(&self) -> Result<Vec<Subsidy>, ServiceError> {
        self.all(collections::SUBVENCIONES, ListQuery::new().sort("nombre"))
            .await
    }

    /// Users that can be assigned as buyer.
    #[instrument(skip(self))]
    pub async fn buyers(&self) -> Result<Vec<User>, ServiceError> {
        let filter = Filter::eq("role", Role::Comprador.to_string())
            .or(Filter::eq("role", Role::Admin.to_string()));
        self.all(
            collections::USERS,
            ListQuery::new().filter(filter.to_string()).sort("name"),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{page_of, MockRecordStore};
    use serde_json::json;

    #[tokio::test]
    async fn buyers_are_filtered_by_role() {
        let mut store = MockRecordStore::new();
        store
            .expect_list()
            .withf(|collection, q| {
                collection == "users"
                    && q.filter.as_deref() == Some("(role = 'comprador' || role = 'admin')")
            })
            .returning(|_, _| {
                Ok(page_of(vec![json!({
                    "id": "u1", "name": "Ana Pérez", "email": "ana@example.cl", "role": "comprador"
                })]))
            });

        let buyers = CatalogService::new(Arc::new(store)).buyers().await.unwrap();
        assert_eq!(buyers[0].display_name(), "Ana Pérez");
    }

    #[tokio::test]
    async fn units_are_sorted_by_name() {
        let mut store = MockRecordStore::new();
        store
            .expect_list()
            .withf(|collection, q| collection == "requirentes" && q.sort.as_deref() == Some("nombre"))
            .returning(|_, _| Ok(page_of(vec![json!({ "id": "r1", "nombre": "Liceo A-12" })])));

        let units = CatalogService::new(Arc::new(store))
            .requesting_units()
            .await
            .unwrap();
        assert_eq!(units[0].name, "Liceo A-12");
    }
}
