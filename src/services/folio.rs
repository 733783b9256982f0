//! Reception folio numbering: `REC-LU{YY}-{NNN}`, restarting every year.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::store::{collections, first, Filter, ListQuery, RecordStore};

const FOLIO_PREFIX: &str = "REC-LU";
/// Largest counter that still fits the three-digit suffix; beyond it the
/// lexicographic sort used by the lookup would stop finding the newest folio.
pub const MAX_COUNTER: u32 = 999;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FolioError {
    #[error("folio sequence for {year} is exhausted")]
    Exhausted { year: i32 },
}

/// `REC-LU26` for 2026.
pub fn folio_prefix(year: i32) -> String {
    format!("{}{:02}", FOLIO_PREFIX, year.rem_euclid(100))
}

/// Numeric segment after the last `-`, if it parses.
pub fn parse_counter(folio: &str) -> Option<u32> {
    folio.rsplit('-').next()?.trim().parse().ok()
}

pub fn format_folio(year: i32, counter: u32) -> Result<String, FolioError> {
    if counter == 0 || counter > MAX_COUNTER {
        return Err(FolioError::Exhausted { year });
    }
    Ok(format!("{}-{:03}", folio_prefix(year), counter))
}

/// Produces the next free folio by looking at the newest one issued this year.
#[derive(Clone)]
pub struct FolioGenerator {
    store: Arc<dyn RecordStore>,
}

impl FolioGenerator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Next folio for `year`. A failed lookup restarts the counter at 1; the
    /// unique constraint on `folio` catches any resulting duplicate.
    #[instrument(skip(self))]
    pub async fn next_folio(&self, year: i32) -> Result<String, FolioError> {
        let prefix = format!("{}-", folio_prefix(year));
        let query = ListQuery::new()
            .filter(Filter::starts_with("folio", &prefix).to_string())
            .sort("-folio");

        let counter = match first(self.store.as_ref(), collections::RECEPCIONES, &query).await {
            Ok(Some(record)) => {
                let last = record.get("folio").and_then(|v| v.as_str()).unwrap_or_default();
                match parse_counter(last) {
                    Some(n) => n.saturating_add(1),
                    None => {
                        warn!(folio = last, "unparsable folio, restarting counter");
                        1
                    }
                }
            }
            Ok(None) => 1,
            Err(e) => {
                warn!(error = %e, "folio lookup failed, restarting counter");
                1
            }
        };

        let folio = format_folio(year, counter)?;
        debug!(%folio, "generated folio");
        Ok(folio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{page_of, MockRecordStore, StoreError};
    use assert_matches::assert_matches;
    use rstest::rstest;
    use serde_json::json;

    fn generator_returning(folios: Vec<&'static str>) -> FolioGenerator {
        let mut store = MockRecordStore::new();
        store
            .expect_list()
            .withf(|collection, q| {
                collection == "recepciones"
                    && q.sort.as_deref() == Some("-folio")
                    && q.per_page == 1
            })
            .returning(move |_, q| {
                // Mirrors the store: only folios matching the prefix filter come back.
                let filter = q.filter.clone().unwrap_or_default();
                let items = folios
                    .iter()
                    .filter(|f| filter.contains(&f[..9]))
                    .map(|f| json!({ "folio": f }))
                    .collect();
                Ok(page_of(items))
            });
        FolioGenerator::new(Arc::new(store))
    }

    #[tokio::test]
    async fn first_folio_of_the_year() {
        let generator = generator_returning(vec![]);
        assert_eq!(generator.next_folio(2026).await.unwrap(), "REC-LU26-001");
    }

    #[tokio::test]
    async fn increments_the_newest_folio() {
        let generator = generator_returning(vec!["REC-LU26-007"]);
        assert_eq!(generator.next_folio(2026).await.unwrap(), "REC-LU26-008");
    }

    #[tokio::test]
    async fn prior_year_folios_do_not_carry_over() {
        let generator = generator_returning(vec!["REC-LU25-120"]);
        assert_eq!(generator.next_folio(2026).await.unwrap(), "REC-LU26-001");
    }

    #[tokio::test]
    async fn lookup_failure_restarts_at_one() {
        let mut store = MockRecordStore::new();
        store
            .expect_list()
            .returning(|_, _| Err(StoreError::Transport("connection refused".into())));
        let generator = FolioGenerator::new(Arc::new(store));
        assert_eq!(generator.next_folio(2026).await.unwrap(), "REC-LU26-001");
    }

    #[tokio::test]
    async fn refuses_a_four_digit_counter() {
        let generator = generator_returning(vec!["REC-LU26-999"]);
        assert_matches!(
            generator.next_folio(2026).await,
            Err(FolioError::Exhausted { year: 2026 })
        );
    }

    #[rstest]
    #[case("REC-LU26-007", Some(7))]
    #[case("REC-LU26-120", Some(120))]
    #[case("REC-LU26-", None)]
    #[case("REC-LU26-abc", None)]
    #[case("", None)]
    fn parses_the_trailing_counter(#[case] folio: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_counter(folio), expected);
    }

    #[test]
    fn prefix_uses_two_digit_year() {
        assert_eq!(folio_prefix(2026), "REC-LU26");
        assert_eq!(folio_prefix(2105), "REC-LU05");
    }
}
