//! Typed views of the PocketBase collections.
//!
//! Rust field names are English; the `serde` renames carry the field names
//! used by the store.

pub mod catalog;
pub mod dates;
pub mod history;
pub mod purchase_order;
pub mod purchase_request;
pub mod reception;

pub use catalog::{RequestingUnit, Subsidy, User};
pub use history::{ChangeSet, FieldChange, HistoryAction, HistoryEntry};
pub use purchase_order::PurchaseOrder;
pub use purchase_request::{PurchaseField, PurchaseRequest, PurchaseState};
pub use reception::{DocumentType, Reception, ReceptionDetail, ReceptionState};
