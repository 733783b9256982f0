use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::catalog::{RequestingUnit, Subsidy, User};
use super::dates::{empty_as_none, format_date, parse_date, parse_datetime};
use super::purchase_order::PurchaseOrder;

/// Lifecycle state of a purchase request.
///
/// `Asignado → Comprado → En Bodega → Entregado`, and `Anulado` from any
/// non-terminal state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum PurchaseState {
    #[serde(rename = "Asignado")]
    #[strum(serialize = "Asignado")]
    Assigned,
    #[serde(rename = "Comprado")]
    #[strum(serialize = "Comprado")]
    Purchased,
    #[serde(rename = "En Bodega")]
    #[strum(serialize = "En Bodega")]
    InWarehouse,
    #[serde(rename = "Entregado")]
    #[strum(serialize = "Entregado")]
    Delivered,
    #[serde(rename = "Anulado")]
    #[strum(serialize = "Anulado")]
    Cancelled,
}

impl PurchaseState {
    /// No further transitions once here.
    pub const TERMINAL: [PurchaseState; 2] = [PurchaseState::Delivered, PurchaseState::Cancelled];

    /// States counted as the last stage of the dashboard funnel.
    pub const COMPLETED: [PurchaseState; 2] =
        [PurchaseState::InWarehouse, PurchaseState::Delivered];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn is_completed(self) -> bool {
        Self::COMPLETED.contains(&self)
    }

    /// The forward step of the normal lifecycle, if any.
    pub fn next(self) -> Option<PurchaseState> {
        match self {
            PurchaseState::Assigned => Some(PurchaseState::Purchased),
            PurchaseState::Purchased => Some(PurchaseState::InWarehouse),
            PurchaseState::InWarehouse => Some(PurchaseState::Delivered),
            PurchaseState::Delivered | PurchaseState::Cancelled => None,
        }
    }

    pub fn can_transition_to(self, target: PurchaseState) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == PurchaseState::Cancelled || self.next() == Some(target)
    }
}

/// Editable fields of a purchase request, as named in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseField {
    UnidadRequirente,
    Comprador,
    Subvencion,
    Descripcion,
    Presupuesto,
    FechaSolicitud,
    Estado,
}

/// Relations PocketBase expands into a purchase request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequestExpand {
    #[serde(rename = "comprador", default, skip_serializing_if = "Option::is_none")]
    pub buyer: Option<User>,
    #[serde(
        rename = "unidad_requirente",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub requesting_unit: Option<RequestingUnit>,
    #[serde(rename = "subvencion", default, skip_serializing_if = "Option::is_none")]
    pub subsidy: Option<Subsidy>,
    #[serde(
        rename = "ordenes_compra_via_compra",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub orders: Vec<PurchaseOrder>,
}

impl PurchaseRequestExpand {
    pub fn is_empty(&self) -> bool {
        self.buyer.is_none()
            && self.requesting_unit.is_none()
            && self.subsidy.is_none()
            && self.orders.is_empty()
    }
}

/// Expand clause that pulls every relation the dashboard and detail views need.
pub const FULL_EXPAND: &str = "comprador,unidad_requirente,subvencion,ordenes_compra_via_compra";

/// Purchase request (`compras`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: String,
    #[serde(rename = "numero_ordinal", default)]
    pub ordinal: i64,
    #[serde(rename = "unidad_requirente", default, deserialize_with = "empty_as_none")]
    pub requesting_unit: Option<String>,
    #[serde(rename = "comprador", default, deserialize_with = "empty_as_none")]
    pub buyer: Option<String>,
    #[serde(rename = "subvencion", default, deserialize_with = "empty_as_none")]
    pub subsidy: Option<String>,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "presupuesto", default, with = "rust_decimal::serde::float")]
    pub budget: Decimal,
    #[serde(rename = "estado")]
    pub state: PurchaseState,
    #[serde(rename = "fecha_solicitud", default, deserialize_with = "empty_as_none")]
    pub request_date: Option<String>,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default, skip_serializing_if = "PurchaseRequestExpand::is_empty")]
    pub expand: PurchaseRequestExpand,
}

impl PurchaseRequest {
    pub fn requested_on(&self) -> Option<NaiveDate> {
        self.request_date.as_deref().and_then(parse_date)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        parse_datetime(&self.updated)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_datetime(&self.created)
    }

    /// Issue date of the earliest order with a parseable date.
    pub fn earliest_order_date(&self) -> Option<NaiveDate> {
        self.expand
            .orders
            .iter()
            .filter_map(PurchaseOrder::issued_on)
            .min()
    }

    /// Field values keyed by store field name; input to the change diff.
    /// Dates are normalised to the store's midnight format.
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            PurchaseField::UnidadRequirente.to_string(),
            json!(self.requesting_unit),
        );
        map.insert(PurchaseField::Comprador.to_string(), json!(self.buyer));
        map.insert(PurchaseField::Subvencion.to_string(), json!(self.subsidy));
        map.insert(
            PurchaseField::Descripcion.to_string(),
            json!(self.description),
        );
        map.insert(
            PurchaseField::Presupuesto.to_string(),
            decimal_json(self.budget),
        );
        map.insert(
            PurchaseField::FechaSolicitud.to_string(),
            json!(self.requested_on().map(format_date)),
        );
        map.insert(PurchaseField::Estado.to_string(), json!(self.state));
        map
    }
}

/// Money as a JSON number, the way the store keeps it.
pub fn decimal_json(value: Decimal) -> Value {
    use rust_decimal::prelude::ToPrimitive;
    match value.normalize().to_i64() {
        Some(int) if Decimal::from(int) == value => json!(int),
        _ => value.to_f64().map(|f| json!(f)).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn decodes_a_store_record_with_expansions() {
        let record: PurchaseRequest = serde_json::from_value(json!({
            "id": "c1",
            "numero_ordinal": 12,
            "unidad_requirente": "u1",
            "comprador": "",
            "subvencion": "s1",
            "descripcion": "Resmas de papel",
            "presupuesto": 150000,
            "estado": "En Bodega",
            "fecha_solicitud": "2026-02-01 00:00:00.000Z",
            "created": "2026-02-01 10:00:00.000Z",
            "updated": "2026-02-10 10:00:00.000Z",
            "expand": {
                "unidad_requirente": { "id": "u1", "nombre": "Escuela Básica 1" },
                "ordenes_compra_via_compra": [
                    { "id": "o1", "compra": "c1", "oc": "1234-56-SE26", "fecha_emision": "2026-02-09", "monto": 149990.5 },
                    { "id": "o2", "compra": "c1", "oc": "1234-57-SE26", "fecha_emision": "2026-02-05", "monto": 10 }
                ]
            }
        }))
        .unwrap();

        assert_eq!(record.buyer, None);
        assert_eq!(record.state, PurchaseState::InWarehouse);
        assert_eq!(record.budget, dec("150000"));
        assert_eq!(record.expand.orders[0].amount, dec("149990.5"));
        assert_eq!(
            record.earliest_order_date(),
            NaiveDate::from_ymd_opt(2026, 2, 5)
        );
        assert_eq!(
            record.expand.requesting_unit.unwrap().name,
            "Escuela Básica 1"
        );
    }

    #[test]
    fn transitions_follow_the_lifecycle() {
        use PurchaseState::*;
        assert!(Assigned.can_transition_to(Purchased));
        assert!(Purchased.can_transition_to(InWarehouse));
        assert!(InWarehouse.can_transition_to(Delivered));
        assert!(Assigned.can_transition_to(Cancelled));
        assert!(InWarehouse.can_transition_to(Cancelled));

        assert!(!Assigned.can_transition_to(Delivered));
        assert!(!Purchased.can_transition_to(Assigned));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Assigned));
    }

    #[test]
    fn state_strings_match_the_store() {
        assert_eq!(PurchaseState::InWarehouse.to_string(), "En Bodega");
        assert_eq!(
            PurchaseState::from_str("Anulado").unwrap(),
            PurchaseState::Cancelled
        );
        assert_eq!(json!(PurchaseState::Delivered), json!("Entregado"));
        assert_eq!(PurchaseField::FechaSolicitud.to_string(), "fecha_solicitud");
    }

    #[test]
    fn money_serialises_as_plain_numbers() {
        assert_eq!(decimal_json(dec("1000")), json!(1000));
        assert_eq!(decimal_json(dec("1000.00")), json!(1000));
        assert_eq!(decimal_json(dec("99.5")), json!(99.5));
    }
}
