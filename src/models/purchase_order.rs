use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::dates::{empty_as_none, parse_date};

/// Purchase order (`ordenes_compra`) issued against one purchase request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: String,
    #[serde(rename = "compra")]
    pub purchase_request: String,
    /// Order code as issued by the public procurement portal
    #[serde(rename = "oc", default)]
    pub code: String,
    #[serde(rename = "fecha_emision", default, deserialize_with = "empty_as_none")]
    pub issue_date: Option<String>,
    #[serde(rename = "monto", default, with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Delivery term in business days
    #[serde(rename = "plazo_entrega", default)]
    pub delivery_days: Option<i64>,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

impl PurchaseOrder {
    pub fn issued_on(&self) -> Option<NaiveDate> {
        self.issue_date.as_deref().and_then(parse_date)
    }
}
