use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::auth::{permissions, Action, AuthUser};
use crate::errors::ServiceError;
use crate::models::dates::format_date;
use crate::models::purchase_request::{decimal_json, FULL_EXPAND};
use crate::models::{HistoryAction, PurchaseField, PurchaseRequest, PurchaseState};
use crate::services::history::{diff, HistoryService};
use crate::store::{
    collections, decode_record, first, Filter, ListQuery, RecordPage, RecordStore, StoreError,
};

pub(crate) fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Amount must not be negative".into());
        Err(err)
    }
}

pub(crate) fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Filters accepted by the purchase request listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PurchaseRequestFilters {
    pub estado: Option<PurchaseState>,
    pub comprador: Option<String>,
    pub unidad_requirente: Option<String>,
    pub subvencion: Option<String>,
    #[validate(range(min = 2000, max = 2100))]
    pub year: Option<i32>,
    /// Free text matched against the description
    #[validate(length(max = 200))]
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PurchaseRequestFilters {
    pub fn to_filter(&self) -> Option<Filter> {
        let mut parts = Vec::new();
        if let Some(state) = self.estado {
            parts.push(Filter::eq("estado", state.to_string()));
        }
        if let Some(buyer) = non_empty(&self.comprador) {
            parts.push(Filter::eq("comprador", buyer));
        }
        if let Some(unit) = non_empty(&self.unidad_requirente) {
            parts.push(Filter::eq("unidad_requirente", unit));
        }
        if let Some(subsidy) = non_empty(&self.subvencion) {
            parts.push(Filter::eq("subvencion", subsidy));
        }
        if let Some(year) = self.year {
            parts.push(Filter::within_year("created", year));
        }
        if let Some(text) = non_empty(&self.search) {
            parts.push(Filter::contains("descripcion", text));
        }
        Filter::all(parts)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseRequest {
    #[validate(length(min = 1, message = "Requesting unit is required"))]
    pub unidad_requirente: String,
    pub comprador: Option<String>,
    pub subvencion: Option<String>,
    #[validate(
        length(min = 1, max = 2000, message = "Description is required"),
        custom = "validate_not_blank"
    )]
    pub descripcion: String,
    #[validate(custom = "validate_non_negative")]
    pub presupuesto: Decimal,
    pub fecha_solicitud: Option<NaiveDate>,
}

/// Partial update; absent fields are left untouched and `""` clears a
/// relation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdatePurchaseRequest {
    pub unidad_requirente: Option<String>,
    pub comprador: Option<String>,
    pub subvencion: Option<String>,
    #[validate(length(max = 2000), custom = "validate_not_blank")]
    pub descripcion: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub presupuesto: Option<Decimal>,
    pub fecha_solicitud: Option<NaiveDate>,
}

impl UpdatePurchaseRequest {
    /// Provided fields as a store patch.
    pub fn to_patch(&self) -> Vec<(PurchaseField, Value)> {
        let mut patch = Vec::new();
        if let Some(unit) = &self.unidad_requirente {
            patch.push((PurchaseField::UnidadRequirente, json!(unit.trim())));
        }
        if let Some(buyer) = &self.comprador {
            patch.push((PurchaseField::Comprador, json!(buyer.trim())));
        }
        if let Some(subsidy) = &self.subvencion {
            patch.push((PurchaseField::Subvencion, json!(subsidy.trim())));
        }
        if let Some(description) = &self.descripcion {
            patch.push((PurchaseField::Descripcion, json!(description.trim())));
        }
        if let Some(budget) = self.presupuesto {
            patch.push((PurchaseField::Presupuesto, decimal_json(budget)));
        }
        if let Some(date) = self.fecha_solicitud {
            patch.push((PurchaseField::FechaSolicitud, json!(format_date(date))));
        }
        patch
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStateRequest {
    pub estado: PurchaseState,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(
        length(min = 1, max = 500, message = "A cancellation reason is required"),
        custom = "validate_not_blank"
    )]
    pub motivo: String,
}

/// Purchase request lifecycle: creation, edits, state changes, cancellation
/// and deletion. Every mutation is written to the history.
#[derive(Clone)]
pub struct PurchaseRequestService {
    store: Arc<dyn RecordStore>,
    history: HistoryService,
    max_retries: u32,
}

impl PurchaseRequestService {
    pub fn new(store: Arc<dyn RecordStore>, history: HistoryService, max_retries: u32) -> Self {
        Self {
            store,
            history,
            max_retries: max_retries.max(1),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filters: PurchaseRequestFilters,
    ) -> Result<RecordPage<PurchaseRequest>, ServiceError> {
        filters.validate()?;
        let mut query = ListQuery::new()
            .page(filters.page.unwrap_or(1), filters.per_page.unwrap_or(30))
            .sort("-numero_ordinal")
            .expand(FULL_EXPAND);
        if let Some(filter) = filters.to_filter() {
            query = query.filter(filter.to_string());
        }
        let page = self.store.list(collections::COMPRAS, &query).await?;
        Ok(page.decode()?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<PurchaseRequest, ServiceError> {
        let value = self
            .store
            .get_one(collections::COMPRAS, id, Some(FULL_EXPAND.to_string()))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => ServiceError::NotFound(format!("Compra {} not found", id)),
                other => other.into(),
            })?;
        Ok(decode_record(value)?)
    }

    async fn next_ordinal(&self) -> Result<i64, ServiceError> {
        let query = ListQuery::new().sort("-numero_ordinal");
        let last = first(self.store.as_ref(), collections::COMPRAS, &query).await?;
        Ok(last
            .and_then(|record| record.get("numero_ordinal").and_then(Value::as_i64))
            .unwrap_or(0)
            + 1)
    }

    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn create(
        &self,
        actor: &AuthUser,
        request: CreatePurchaseRequest,
    ) -> Result<PurchaseRequest, ServiceError> {
        actor.require(Action::CreatePurchase)?;
        request.validate()?;

        let mut body = json!({
            "unidad_requirente": request.unidad_requirente.trim(),
            "comprador": request.comprador.as_deref().map(str::trim).unwrap_or_default(),
            "subvencion": request.subvencion.as_deref().map(str::trim).unwrap_or_default(),
            "descripcion": request.descripcion.trim(),
            "presupuesto": decimal_json(request.presupuesto),
            "estado": PurchaseState::Assigned,
            "fecha_solicitud": request.fecha_solicitud.map(format_date).unwrap_or_default(),
        });

        let mut attempt = 0;
        let created = loop {
            attempt += 1;
            body["numero_ordinal"] = json!(self.next_ordinal().await?);
            match self.store.create(collections::COMPRAS, body.clone()).await {
                Ok(created) => break created,
                Err(StoreError::UniqueViolation { field })
                    if field == "numero_ordinal" && attempt < self.max_retries =>
                {
                    warn!(attempt, "ordinal taken concurrently, retrying");
                }
                Err(e) => {
                    error!(error = %e, "failed to create purchase request");
                    return Err(e.into());
                }
            }
        };
        let created: PurchaseRequest = decode_record(created)?;

        let changes = diff(&Map::new(), &created.snapshot());
        self.history
            .record(
                &created.id,
                Some(&actor.user_id),
                HistoryAction::Creacion,
                changes,
                None,
            )
            .await?;

        info!(compra = %created.id, ordinal = created.ordinal, "purchase request created");
        Ok(created)
    }

    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn update(
        &self,
        actor: &AuthUser,
        id: &str,
        request: UpdatePurchaseRequest,
    ) -> Result<PurchaseRequest, ServiceError> {
        actor.require(Action::EditPurchase)?;
        request.validate()?;

        let current = self.get(id).await?;
        if current.state.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Compra in state '{}' can no longer be edited",
                current.state
            )));
        }

        let patch = request.to_patch();
        if let Some((field, _)) = patch
            .iter()
            .find(|(field, _)| !permissions::can_edit_field(actor.role, *field))
        {
            return Err(ServiceError::Forbidden(format!(
                "role '{}' may not edit '{}'",
                actor.role, field
            )));
        }

        let new: Map<String, Value> = patch
            .into_iter()
            .map(|(field, value)| (field.to_string(), value))
            .collect();
        let old: Map<String, Value> = current
            .snapshot()
            .into_iter()
            .filter(|(field, _)| new.contains_key(field))
            .collect();

        let changes = diff(&old, &new);
        if changes.is_empty() {
            return Ok(current);
        }

        let body: Map<String, Value> = changes
            .keys()
            .filter_map(|field| new.get(field).map(|v| (field.clone(), v.clone())))
            .collect();
        self.store
            .update(collections::COMPRAS, id, Value::Object(body))
            .await
            .map_err(|e| {
                error!(error = %e, compra = id, "failed to update purchase request");
                ServiceError::from(e)
            })?;

        self.history
            .record(
                id,
                Some(&actor.user_id),
                HistoryAction::Modificacion,
                changes,
                None,
            )
            .await?;

        self.get(id).await
    }

    /// Moves `current` to `target` and records it. Callers have already
    /// checked permissions.
    pub(crate) async fn apply_transition(
        &self,
        current: &PurchaseRequest,
        target: PurchaseState,
        user_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        if !current.state.can_transition_to(target) {
            return Err(ServiceError::InvalidTransition(format!(
                "'{}' → '{}'",
                current.state, target
            )));
        }

        self.store
            .update(collections::COMPRAS, &current.id, json!({ "estado": target }))
            .await?;

        let changes = diff(
            &json_map(json!({ "estado": current.state })),
            &json_map(json!({ "estado": target })),
        );
        self.history
            .record(&current.id, user_id, HistoryAction::Modificacion, changes, None)
            .await?;

        info!(compra = %current.id, from = %current.state, to = %target, "state changed");
        Ok(())
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn change_state(
        &self,
        actor: &AuthUser,
        id: &str,
        target: PurchaseState,
    ) -> Result<PurchaseRequest, ServiceError> {
        actor.require(Action::ChangePurchaseState)?;
        if target == PurchaseState::Cancelled {
            return Err(ServiceError::InvalidOperation(
                "Use the cancellation endpoint to cancel a compra".to_string(),
            ));
        }

        let current = self.get(id).await?;
        self.apply_transition(&current, target, Some(&actor.user_id))
            .await?;
        self.get(id).await
    }

    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn cancel(
        &self,
        actor: &AuthUser,
        id: &str,
        request: CancelRequest,
    ) -> Result<PurchaseRequest, ServiceError> {
        actor.require(Action::CancelPurchase)?;
        request.validate()?;

        let current = self.get(id).await?;
        if current.state.is_terminal() {
            return Err(ServiceError::InvalidTransition(format!(
                "Compra in state '{}' cannot be cancelled",
                current.state
            )));
        }

        self.store
            .update(
                collections::COMPRAS,
                id,
                json!({ "estado": PurchaseState::Cancelled }),
            )
            .await?;

        let changes = diff(
            &json_map(json!({ "estado": current.state })),
            &json_map(json!({ "estado": PurchaseState::Cancelled })),
        );
        self.history
            .record(
                id,
                Some(&actor.user_id),
                HistoryAction::Anulacion,
                changes,
                Some(request.motivo.trim()),
            )
            .await?;

        info!(compra = id, "purchase request cancelled");
        self.get(id).await
    }

    /// Deletes a compra. The history entry is written first so the deletion
    /// is on record even if the delete itself fails halfway.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete(&self, actor: &AuthUser, id: &str) -> Result<(), ServiceError> {
        actor.require(Action::DeletePurchase)?;

        let current = self.get(id).await?;
        let changes = diff(&current.snapshot(), &Map::new());
        self.history
            .record(
                id,
                Some(&actor.user_id),
                HistoryAction::Eliminacion,
                changes,
                None,
            )
            .await?;

        self.store
            .delete(collections::COMPRAS, id)
            .await
            .map_err(|e| {
                error!(error = %e, compra = id, "failed to delete purchase request");
                ServiceError::from(e)
            })?;

        info!(compra = id, "purchase request deleted");
        Ok(())
    }
}

fn json_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
