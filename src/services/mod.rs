// Numbering and pure computations
pub mod dashboard;
pub mod folio;
pub mod history;

// Record lifecycle services
pub mod catalog;
pub mod purchase_orders;
pub mod purchase_requests;
pub mod receptions;
