//! Change diffs and the append-only audit trail of purchase requests.

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, instrument};

use crate::errors::ServiceError;
use crate::models::{ChangeSet, FieldChange, HistoryAction, HistoryEntry};
use crate::store::{collections, decode_record, list_all, Filter, ListQuery, RecordStore};

/// `null`, a missing key and `""` all mean "no value".
fn normalize(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(s)) if s.is_empty() => Value::Null,
        Some(other) => other.clone(),
    }
}

fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // 1000 and 1000.0 are the same amount
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Fields whose value differs between `old` and `new`, keyed by field name.
pub fn diff(old: &Map<String, Value>, new: &Map<String, Value>) -> ChangeSet {
    let fields: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    fields
        .into_iter()
        .filter_map(|field| {
            let before = normalize(old.get(field));
            let after = normalize(new.get(field));
            (!same(&before, &after)).then(|| {
                (
                    field.clone(),
                    FieldChange {
                        anterior: before,
                        nuevo: after,
                    },
                )
            })
        })
        .collect()
}

/// Human-readable line stored with each history entry.
pub fn summary(action: HistoryAction, changes: &ChangeSet, reason: Option<&str>) -> String {
    match action {
        HistoryAction::Creacion => "Compra creada".to_string(),
        HistoryAction::Modificacion => match changes.len() {
            0 => "Sin cambios".to_string(),
            1 => "Se modificó 1 campo".to_string(),
            n => format!("Se modificaron {} campos", n),
        },
        HistoryAction::Anulacion => match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("Compra anulada: {}", reason),
            None => "Compra anulada".to_string(),
        },
        HistoryAction::Eliminacion => "Compra eliminada".to_string(),
    }
}

/// Writes and reads `historial_compras`. Entries are only ever appended.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn RecordStore>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, changes, reason), fields(changed = changes.len()))]
    pub async fn record(
        &self,
        purchase_request_id: &str,
        user_id: Option<&str>,
        action: HistoryAction,
        changes: ChangeSet,
        reason: Option<&str>,
    ) -> Result<HistoryEntry, ServiceError> {
        let body = json!({
            "compra": purchase_request_id,
            "usuario": user_id.unwrap_or_default(),
            "accion": action,
            "descripcion": summary(action, &changes, reason),
            "cambios": changes,
        });

        let created = self
            .store
            .create(collections::HISTORIAL_COMPRAS, body)
            .await
            .map_err(|e| {
                error!(error = %e, compra = purchase_request_id, "failed to append history entry");
                ServiceError::from(e)
            })?;
        Ok(decode_record(created)?)
    }

    /// Entries for one purchase request, newest first.
    #[instrument(skip(self))]
    pub async fn list_for(&self, purchase_request_id: &str) -> Result<Vec<HistoryEntry>, ServiceError> {
        let query = ListQuery::new()
            .filter(Filter::eq("compra", purchase_request_id).to_string())
            .sort("-created")
            .expand("usuario");
        let raw = list_all(self.store.as_ref(), collections::HISTORIAL_COMPRAS, &query).await?;
        raw.into_iter()
            .map(|value| decode_record(value).map_err(ServiceError::from))
            .collect()
    }
}
