use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument};
use validator::Validate;

use crate::auth::{Action, AuthUser};
use crate::errors::ServiceError;
use crate::models::dates::format_date;
use crate::models::purchase_request::decimal_json;
use crate::models::{HistoryAction, PurchaseOrder, PurchaseRequest, PurchaseState};
use crate::services::history::{diff, HistoryService};
use crate::services::purchase_requests::{
    validate_non_negative, validate_not_blank, PurchaseRequestService,
};
use crate::store::{collections, decode_record, list_all, Filter, ListQuery, RecordStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrder {
    #[validate(
        length(min = 1, max = 50, message = "Order code is required"),
        custom = "validate_not_blank"
    )]
    pub oc: String,
    pub fecha_emision: NaiveDate,
    #[validate(custom = "validate_non_negative")]
    pub monto: Decimal,
    /// Business days
    #[validate(range(min = 0, max = 365))]
    pub plazo_entrega: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdatePurchaseOrder {
    #[validate(length(min = 1, max = 50), custom = "validate_not_blank")]
    pub oc: Option<String>,
    pub fecha_emision: Option<NaiveDate>,
    #[validate(custom = "validate_non_negative")]
    pub monto: Option<Decimal>,
    #[validate(range(min = 0, max = 365))]
    pub plazo_entrega: Option<i64>,
}

impl UpdatePurchaseOrder {
    fn to_patch(&self) -> Map<String, Value> {
        let mut patch = Map::new();
        if let Some(code) = &self.oc {
            patch.insert("oc".into(), json!(code.trim()));
        }
        if let Some(date) = self.fecha_emision {
            patch.insert("fecha_emision".into(), json!(format_date(date)));
        }
        if let Some(amount) = self.monto {
            patch.insert("monto".into(), decimal_json(amount));
        }
        if let Some(days) = self.plazo_entrega {
            patch.insert("plazo_entrega".into(), json!(days));
        }
        patch
    }
}

fn order_snapshot(order: &PurchaseOrder) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("oc".into(), json!(order.code));
    map.insert(
        "fecha_emision".into(),
        json!(order.issued_on().map(format_date)),
    );
    map.insert("monto".into(), decimal_json(order.amount));
    map.insert("plazo_entrega".into(), json!(order.delivery_days));
    map
}

/// Prefixes order fields so they read as `orden_compra.monto` in the history
/// of the owning compra.
fn prefixed(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(field, value)| (format!("orden_compra.{}", field), value))
        .collect()
}

/// Purchase orders issued against a compra.
#[derive(Clone)]
pub struct PurchaseOrderService {
    store: Arc<dyn RecordStore>,
    purchases: PurchaseRequestService,
    history: HistoryService,
}

impl PurchaseOrderService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        purchases: PurchaseRequestService,
        history: HistoryService,
    ) -> Self {
        Self {
            store,
            purchases,
            history,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_for(&self, purchase_request_id: &str) -> Result<Vec<PurchaseOrder>, ServiceError> {
        let query = ListQuery::new()
            .filter(Filter::eq("compra", purchase_request_id).to_string())
            .sort("fecha_emision");
        let raw = list_all(self.store.as_ref(), collections::ORDENES_COMPRA, &query).await?;
        raw.into_iter()
            .map(|value| decode_record(value).map_err(ServiceError::from))
            .collect()
    }

    async fn get(&self, id: &str) -> Result<PurchaseOrder, ServiceError> {
        let value = self
            .store
            .get_one(collections::ORDENES_COMPRA, id, None)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    ServiceError::NotFound(format!("Orden de compra {} not found", id))
                }
                other => other.into(),
            })?;
        Ok(decode_record(value)?)
    }

    /// The owning compra, refusing terminal ones.
    async fn open_purchase(&self, purchase_request_id: &str) -> Result<PurchaseRequest, ServiceError> {
        let purchase = self.purchases.get(purchase_request_id).await?;
        if purchase.state.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Compra in state '{}' does not accept order changes",
                purchase.state
            )));
        }
        Ok(purchase)
    }

    /// Adds an order. The first order of an `Asignado` compra marks it as
    /// `Comprado`.
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn create(
        &self,
        actor: &AuthUser,
        purchase_request_id: &str,
        request: CreatePurchaseOrder,
    ) -> Result<PurchaseOrder, ServiceError> {
        actor.require(Action::ManageOrders)?;
        request.validate()?;
        let purchase = self.open_purchase(purchase_request_id).await?;

        let body = json!({
            "compra": purchase.id,
            "oc": request.oc.trim(),
            "fecha_emision": format_date(request.fecha_emision),
            "monto": decimal_json(request.monto),
            "plazo_entrega": request.plazo_entrega,
        });
        let created = self
            .store
            .create(collections::ORDENES_COMPRA, body)
            .await
            .map_err(|e| {
                error!(error = %e, compra = %purchase.id, "failed to create purchase order");
                ServiceError::from(e)
            })?;
        let order: PurchaseOrder = decode_record(created)?;

        let changes = diff(&Map::new(), &prefixed(order_snapshot(&order)));
        self.history
            .record(
                &purchase.id,
                Some(&actor.user_id),
                HistoryAction::Modificacion,
                changes,
                None,
            )
            .await?;

        if purchase.state == PurchaseState::Assigned {
            self.purchases
                .apply_transition(&purchase, PurchaseState::Purchased, Some(&actor.user_id))
                .await?;
        }

        info!(compra = %purchase.id, oc = %order.code, "purchase order created");
        Ok(order)
    }

    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn update(
        &self,
        actor: &AuthUser,
        id: &str,
        request: UpdatePurchaseOrder,
    ) -> Result<PurchaseOrder, ServiceError> {
        actor.require(Action::ManageOrders)?;
        request.validate()?;

        let order = self.get(id).await?;
        self.open_purchase(&order.purchase_request).await?;

        let new = request.to_patch();
        let old: Map<String, Value> = order_snapshot(&order)
            .into_iter()
            .filter(|(field, _)| new.contains_key(field))
            .collect();
        let changes = diff(&old, &new);
        if changes.is_empty() {
            return Ok(order);
        }

        let body: Map<String, Value> = new
            .into_iter()
            .filter(|(field, _)| changes.contains_key(field))
            .collect();
        let updated = self
            .store
            .update(collections::ORDENES_COMPRA, id, Value::Object(body))
            .await?;

        let changes = diff(&prefixed(old), &prefixed(request.to_patch()));
        self.history
            .record(
                &order.purchase_request,
                Some(&actor.user_id),
                HistoryAction::Modificacion,
                changes,
                None,
            )
            .await?;

        Ok(decode_record(updated)?)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete(&self, actor: &AuthUser, id: &str) -> Result<(), ServiceError> {
        actor.require(Action::ManageOrders)?;

        let order = self.get(id).await?;
        self.open_purchase(&order.purchase_request).await?;

        self.store.delete(collections::ORDENES_COMPRA, id).await?;

        let changes = diff(&prefixed(order_snapshot(&order)), &Map::new());
        self.history
            .record(
                &order.purchase_request,
                Some(&actor.user_id),
                HistoryAction::Modificacion,
                changes,
                None,
            )
            .await?;

        info!(compra = %order.purchase_request, oc = %order.code, "purchase order deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::store::MockRecordStore;
    use assert_matches::assert_matches;
    use std::sync::Mutex;

    fn buyer() -> AuthUser {
        AuthUser {
            user_id: "u1".into(),
            name: "Compradora".into(),
            email: "c@example.cl".into(),
            role: Role::Comprador,
        }
    }

    fn compra(state: &'static str) -> Value {
        json!({
            "id": "c1",
            "numero_ordinal": 3,
            "descripcion": "Notebooks",
            "presupuesto": 900000,
            "estado": state
        })
    }

    fn service(store: MockRecordStore) -> PurchaseOrderService {
        let store: Arc<dyn RecordStore> = Arc::new(store);
        let history = HistoryService::new(store.clone());
        let purchases = PurchaseRequestService::new(store.clone(), history.clone(), 3);
        PurchaseOrderService::new(store, purchases, history)
    }

    fn request() -> CreatePurchaseOrder {
        CreatePurchaseOrder {
            oc: "2345-12-SE26".into(),
            fecha_emision: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            monto: Decimal::from(880_000),
            plazo_entrega: Some(10),
        }
    }

    #[tokio::test]
    async fn first_order_moves_compra_to_comprado() {
        let mut store = MockRecordStore::new();
        store
            .expect_get_one()
            .returning(|_, _, _| Ok(compra("Asignado")));
        store
            .expect_create()
            .withf(|collection, _| collection == "ordenes_compra")
            .times(1)
            .returning(|_, mut body| {
                body["id"] = json!("o1");
                Ok(body)
            });
        let history = Arc::new(Mutex::new(Vec::new()));
        let log = history.clone();
        store
            .expect_create()
            .withf(|collection, _| collection == "historial_compras")
            .times(2)
            .returning(move |_, body| {
                log.lock().unwrap().push(body.clone());
                Ok(body)
            });
        store
            .expect_update()
            .withf(|collection, id, body| {
                collection == "compras" && id == "c1" && body["estado"] == "Comprado"
            })
            .times(1)
            .returning(|_, _, body| Ok(body));

        let order = service(store).create(&buyer(), "c1", request()).await.unwrap();
        assert_eq!(order.code, "2345-12-SE26");

        let history = history.lock().unwrap();
        assert_eq!(history[0]["cambios"]["orden_compra.oc"]["nuevo"], "2345-12-SE26");
        assert_eq!(history[1]["cambios"]["estado"]["nuevo"], "Comprado");
    }

    #[tokio::test]
    async fn later_orders_leave_the_state_alone() {
        let mut store = MockRecordStore::new();
        store
            .expect_get_one()
            .returning(|_, _, _| Ok(compra("En Bodega")));
        store
            .expect_create()
            .times(2)
            .returning(|_, mut body| {
                body["id"] = json!("x");
                Ok(body)
            });
        store.expect_update().never();

        service(store).create(&buyer(), "c1", request()).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_compras_reject_orders() {
        let mut store = MockRecordStore::new();
        store
            .expect_get_one()
            .returning(|_, _, _| Ok(compra("Anulado")));
        store.expect_create().never();

        let result = service(store).create(&buyer(), "c1", request()).await;
        assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn update_patches_changed_fields_only() {
        let mut store = MockRecordStore::new();
        store
            .expect_get_one()
            .withf(|collection, _, _| collection == "ordenes_compra")
            .returning(|_, _, _| {
                Ok(json!({
                    "id": "o1", "compra": "c1", "oc": "2345-12-SE26",
                    "fecha_emision": "2026-03-09 00:00:00.000Z", "monto": 880000, "plazo_entrega": 10
                }))
            });
        store
            .expect_get_one()
            .withf(|collection, _, _| collection == "compras")
            .returning(|_, _, _| Ok(compra("Comprado")));
        store
            .expect_update()
            .withf(|_, _, body| *body == json!({ "monto": 875000 }))
            .times(1)
            .returning(|_, _, _| {
                Ok(json!({
                    "id": "o1", "compra": "c1", "oc": "2345-12-SE26",
                    "fecha_emision": "2026-03-09 00:00:00.000Z", "monto": 875000, "plazo_entrega": 10
                }))
            });
        store
            .expect_create()
            .withf(|_, body| body["cambios"]["orden_compra.monto"]["anterior"] == 880000)
            .times(1)
            .returning(|_, body| Ok(body));

        let updated = service(store)
            .update(
                &buyer(),
                "o1",
                UpdatePurchaseOrder {
                    monto: Some(Decimal::from(875_000)),
                    plazo_entrega: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.amount, Decimal::from(875_000));
    }

    #[tokio::test]
    async fn warehouse_staff_cannot_manage_orders() {
        let mut actor = buyer();
        actor.role = Role::Bodega;
        let result = service(MockRecordStore::new())
            .delete(&actor, "o1")
            .await;
        assert_matches!(result, Err(ServiceError::Forbidden(_)));
    }
}
