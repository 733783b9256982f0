//! Dashboard KPIs computed from one year of purchase requests.
//!
//! [`aggregate`] is pure: the same records and `now` always give the same
//! statistics, and malformed dates only drop a record from the cycle-time
//! figures.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::models::purchase_request::FULL_EXPAND;
use crate::models::PurchaseRequest;
use crate::store::{collections, decode_record, list_all, Filter, ListQuery, RecordStore};

pub const UNASSIGNED_BUYER: &str = "Sin asignar";
pub const UNKNOWN_UNIT: &str = "Sin unidad";
pub const UNKNOWN_SUBSIDY: &str = "Sin subvención";

const MONTHS_ES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationSettings {
    /// Days without an update before an open request counts as stagnant
    pub stagnation_days: i64,
    /// Entries kept in the buyer and unit rankings
    pub ranking_limit: usize,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            stagnation_days: 10,
            ranking_limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleTimePoint {
    /// `YYYY-MM`
    pub period: String,
    pub month: String,
    pub avg_days: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub stage: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_spent: Decimal,
    pub total_orders: u64,
    pub by_buyer: Vec<RankingEntry>,
    pub by_unit: Vec<RankingEntry>,
    pub by_subsidy: Vec<RankingEntry>,
    pub avg_cycle_time: f64,
    pub cycle_time_trend: Vec<CycleTimePoint>,
    pub funnel_data: Vec<FunnelStage>,
    pub stagnation_count: u64,
}

#[derive(Default)]
struct Ranking {
    groups: HashMap<String, (Decimal, u64)>,
}

impl Ranking {
    fn add(&mut self, name: &str, amount: Decimal) {
        let slot = self.groups.entry(name.to_string()).or_default();
        slot.0 += amount;
        slot.1 += 1;
    }

    fn entries(self) -> Vec<RankingEntry> {
        self.groups
            .into_iter()
            .map(|(name, (amount, count))| RankingEntry {
                name,
                amount,
                count,
            })
            .collect()
    }

    /// Count descending, top `limit`.
    fn by_count(self, limit: usize) -> Vec<RankingEntry> {
        let mut entries = self.entries();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        entries.truncate(limit);
        entries
    }

    /// Amount descending, all groups.
    fn by_amount(self) -> Vec<RankingEntry> {
        let mut entries = self.entries();
        entries.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.name.cmp(&b.name)));
        entries
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn average(total: i64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        round1(total as f64 / count as f64)
    }
}

/// Days from request to first issued order; `None` when either date is
/// missing or the order predates the request.
pub fn cycle_days(record: &PurchaseRequest) -> Option<(i64, chrono::NaiveDate)> {
    let requested = record.requested_on()?;
    let first_order = record.earliest_order_date()?;
    let days = (first_order - requested).num_days();
    (days >= 0).then_some((days, first_order))
}

/// Non-terminal and untouched for more than `stagnation_days` calendar days.
pub fn is_stagnant(record: &PurchaseRequest, now: DateTime<Utc>, stagnation_days: i64) -> bool {
    if record.state.is_terminal() {
        return false;
    }
    match record.updated_at() {
        Some(updated) => {
            (now.date_naive() - updated.date_naive()).num_days() > stagnation_days
        }
        None => false,
    }
}

pub fn aggregate(
    records: &[PurchaseRequest],
    now: DateTime<Utc>,
    settings: AggregationSettings,
) -> DashboardStats {
    let mut total_spent = Decimal::ZERO;
    let mut buyers = Ranking::default();
    let mut units = Ranking::default();
    let mut subsidies = Ranking::default();

    let mut cycle_total: i64 = 0;
    let mut cycle_count: u64 = 0;
    let mut monthly: BTreeMap<(i32, u32), (i64, u64)> = BTreeMap::new();

    let mut with_buyer = 0u64;
    let mut with_order = 0u64;
    let mut completed = 0u64;
    let mut stagnation_count = 0u64;

    for record in records {
        total_spent += record.budget;

        let buyer = record
            .expand
            .buyer
            .as_ref()
            .map(|u| u.display_name())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNASSIGNED_BUYER);
        buyers.add(buyer, record.budget);

        let unit = record
            .expand
            .requesting_unit
            .as_ref()
            .map(|u| u.name.as_str())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_UNIT);
        units.add(unit, record.budget);

        let subsidy = record
            .expand
            .subsidy
            .as_ref()
            .map(|s| s.name.as_str())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_SUBSIDY);
        subsidies.add(subsidy, record.budget);

        if let Some((days, first_order)) = cycle_days(record) {
            cycle_total += days;
            cycle_count += 1;
            let slot = monthly
                .entry((first_order.year(), first_order.month()))
                .or_default();
            slot.0 += days;
            slot.1 += 1;
        }

        if record.buyer.is_some() {
            with_buyer += 1;
        }
        if !record.expand.orders.is_empty() {
            with_order += 1;
        }
        if record.state.is_completed() {
            completed += 1;
        }
        if is_stagnant(record, now, settings.stagnation_days) {
            stagnation_count += 1;
        }
    }

    let cycle_time_trend = monthly
        .into_iter()
        .map(|((year, month), (total, count))| CycleTimePoint {
            period: format!("{:04}-{:02}", year, month),
            month: MONTHS_ES[(month as usize).saturating_sub(1) % 12].to_string(),
            avg_days: average(total, count),
            count,
        })
        .collect();

    let total_orders = records.len() as u64;
    let funnel_data = [
        ("Total", total_orders),
        ("Con comprador", with_buyer),
        ("Con orden de compra", with_order),
        ("Completadas", completed),
    ]
    .into_iter()
    .map(|(stage, count)| FunnelStage {
        stage: stage.to_string(),
        count,
    })
    .collect();

    DashboardStats {
        total_spent,
        total_orders,
        by_buyer: buyers.by_count(settings.ranking_limit),
        by_unit: units.by_count(settings.ranking_limit),
        by_subsidy: subsidies.by_amount(),
        avg_cycle_time: average(cycle_total, cycle_count),
        cycle_time_trend,
        funnel_data,
        stagnation_count,
    }
}

/// Loads a year of purchase requests and aggregates them.
#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn RecordStore>,
    settings: AggregationSettings,
}

impl DashboardService {
    pub fn new(store: Arc<dyn RecordStore>, settings: AggregationSettings) -> Self {
        Self { store, settings }
    }

    #[instrument(skip(self))]
    pub async fn stats_for_year(&self, year: i32) -> Result<DashboardStats, ServiceError> {
        let query = ListQuery::new()
            .filter(Filter::within_year("created", year).to_string())
            .sort("-numero_ordinal")
            .expand(FULL_EXPAND);
        let raw = list_all(self.store.as_ref(), collections::COMPRAS, &query).await?;

        let fetched = raw.len();
        let records: Vec<PurchaseRequest> = raw
            .into_iter()
            .filter_map(|value| match decode_record::<PurchaseRequest>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping malformed purchase request");
                    None
                }
            })
            .collect();

        let stats = aggregate(&records, Utc::now(), self.settings);
        info!(
            year,
            fetched,
            aggregated = records.len(),
            stagnant = stats.stagnation_count,
            "dashboard computed"
        );
        Ok(stats)
    }
}
