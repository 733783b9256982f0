pub mod catalog;
pub mod common;
pub mod dashboard;
pub mod health;
pub mod purchase_orders;
pub mod purchase_requests;
pub mod receptions;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    catalog::CatalogService,
    dashboard::{AggregationSettings, DashboardService},
    history::HistoryService,
    purchase_orders::PurchaseOrderService,
    purchase_requests::PurchaseRequestService,
    receptions::ReceptionService,
};
use crate::store::RecordStore;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub dashboard: Arc<DashboardService>,
    pub history: Arc<HistoryService>,
    pub purchase_requests: Arc<PurchaseRequestService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub receptions: Arc<ReceptionService>,
    pub catalog: Arc<CatalogService>,
}

impl AppServices {
    /// Wires every service on top of one record store.
    pub fn new(store: Arc<dyn RecordStore>, config: &AppConfig) -> Self {
        let history = HistoryService::new(store.clone());
        let purchase_requests =
            PurchaseRequestService::new(store.clone(), history.clone(), config.folio_max_retries);
        let purchase_orders =
            PurchaseOrderService::new(store.clone(), purchase_requests.clone(), history.clone());
        let receptions = ReceptionService::new(
            store.clone(),
            purchase_requests.clone(),
            history.clone(),
            config.folio_max_retries,
        );
        let dashboard = DashboardService::new(
            store.clone(),
            AggregationSettings {
                stagnation_days: config.stagnation_days,
                ranking_limit: config.ranking_limit,
            },
        );

        Self {
            dashboard: Arc::new(dashboard),
            history: Arc::new(history),
            purchase_requests: Arc::new(purchase_requests),
            purchase_orders: Arc::new(purchase_orders),
            receptions: Arc::new(receptions),
            catalog: Arc::new(CatalogService::new(store)),
        }
    }
}
