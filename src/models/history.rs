use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumString};

use super::catalog::User;
use super::dates::empty_as_none;

fn null_as_empty<'de, D>(deserializer: D) -> Result<ChangeSet, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<ChangeSet>::deserialize(deserializer)?.unwrap_or_default())
}

/// Kind of mutation recorded in the audit trail.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HistoryAction {
    Creacion,
    Modificacion,
    Anulacion,
    Eliminacion,
}

/// Before/after pair for one changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub anterior: Value,
    pub nuevo: Value,
}

/// Field name → change. Ordered so stored payloads are deterministic.
pub type ChangeSet = BTreeMap<String, FieldChange>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntryExpand {
    #[serde(rename = "usuario", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// Audit record (`historial_compras`). Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "compra")]
    pub purchase_request: String,
    #[serde(rename = "usuario", default, deserialize_with = "empty_as_none")]
    pub user: Option<String>,
    #[serde(rename = "accion")]
    pub action: HistoryAction,
    #[serde(rename = "cambios", default, deserialize_with = "null_as_empty")]
    pub changes: ChangeSet,
    #[serde(rename = "descripcion", default)]
    pub summary: String,
    #[serde(default)]
    pub created: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<HistoryEntryExpand>,
}
