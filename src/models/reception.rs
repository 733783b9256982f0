use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::dates::{empty_as_none, parse_date};
use super::purchase_order::PurchaseOrder;
use super::purchase_request::PurchaseRequest;

/// Reception state. `Anulado` is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum ReceptionState {
    #[serde(rename = "Conforme")]
    #[strum(serialize = "Conforme")]
    Accepted,
    #[serde(rename = "Anulado")]
    #[strum(serialize = "Anulado")]
    Cancelled,
}

/// Supporting document handed over with the goods.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum DocumentType {
    #[serde(rename = "Factura")]
    #[strum(serialize = "Factura")]
    Invoice,
    #[serde(rename = "Guía de Despacho")]
    #[strum(serialize = "Guía de Despacho")]
    DispatchGuide,
    #[serde(rename = "Boleta")]
    #[strum(serialize = "Boleta")]
    Receipt,
    #[serde(rename = "Otro", other)]
    #[strum(serialize = "Otro")]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceptionExpand {
    #[serde(rename = "compra", default, skip_serializing_if = "Option::is_none")]
    pub purchase_request: Option<Box<PurchaseRequest>>,
    #[serde(rename = "orden_compra", default, skip_serializing_if = "Option::is_none")]
    pub purchase_order: Option<PurchaseOrder>,
    #[serde(
        rename = "recepcion_detalles_via_recepcion",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub details: Vec<ReceptionDetail>,
}

impl ReceptionExpand {
    pub fn is_empty(&self) -> bool {
        self.purchase_request.is_none() && self.purchase_order.is_none() && self.details.is_empty()
    }
}

pub const RECEPTION_EXPAND: &str = "compra,orden_compra,recepcion_detalles_via_recepcion";

/// Warehouse reception (`recepciones`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reception {
    pub id: String,
    #[serde(rename = "compra")]
    pub purchase_request: String,
    #[serde(rename = "orden_compra", default, deserialize_with = "empty_as_none")]
    pub purchase_order: Option<String>,
    pub folio: String,
    #[serde(rename = "fecha_recepcion", default, deserialize_with = "empty_as_none")]
    pub received_date: Option<String>,
    #[serde(rename = "tipo_documento")]
    pub document_type: DocumentType,
    #[serde(rename = "numero_documento", default)]
    pub document_number: String,
    #[serde(rename = "observaciones", default)]
    pub notes: String,
    #[serde(rename = "estado")]
    pub state: ReceptionState,
    #[serde(rename = "motivo_anulacion", default, deserialize_with = "empty_as_none")]
    pub cancellation_reason: Option<String>,
    #[serde(rename = "recibido_por", default, deserialize_with = "empty_as_none")]
    pub received_by: Option<String>,
    /// Attachment file names as stored
    #[serde(rename = "documentos", default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default, skip_serializing_if = "ReceptionExpand::is_empty")]
    pub expand: ReceptionExpand,
}

impl Reception {
    pub fn received_on(&self) -> Option<NaiveDate> {
        self.received_date.as_deref().and_then(parse_date)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == ReceptionState::Cancelled
    }
}

/// One received line (`recepcion_detalles`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptionDetail {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "recepcion")]
    pub reception: String,
    #[serde(rename = "cantidad", with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(rename = "descripcion", default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_reception_with_details() {
        let reception: Reception = serde_json::from_value(json!({
            "id": "r1",
            "compra": "c1",
            "orden_compra": "",
            "folio": "REC-LU26-003",
            "fecha_recepcion": "2026-04-02 00:00:00.000Z",
            "tipo_documento": "Guía de Despacho",
            "numero_documento": "88123",
            "observaciones": "",
            "estado": "Conforme",
            "motivo_anulacion": "",
            "documentos": ["guia_88123.pdf"],
            "expand": {
                "recepcion_detalles_via_recepcion": [
                    { "id": "d1", "recepcion": "r1", "cantidad": 12, "descripcion": "Cajas de lápices" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(reception.purchase_order, None);
        assert_eq!(reception.document_type, DocumentType::DispatchGuide);
        assert_eq!(reception.cancellation_reason, None);
        assert!(!reception.is_cancelled());
        assert_eq!(reception.expand.details.len(), 1);
        assert_eq!(reception.received_on(), NaiveDate::from_ymd_opt(2026, 4, 2));
    }

    #[test]
    fn unknown_document_types_decode_as_other() {
        let kind: DocumentType = serde_json::from_value(json!("Nota de crédito")).unwrap();
        assert_eq!(kind, DocumentType::Other);
        assert_eq!(json!(DocumentType::Other), json!("Otro"));
    }
}
