//! Backing stores for distribution rows.
//!
//! Three tiers are tried in order: a direct Postgres pool (feature `db`),
//! the Supabase PostgREST endpoint, and finally local JSON files.

pub mod local;
#[cfg(feature = "db")]
pub mod postgres;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::metrics;
use crate::types::RawRow;

pub use local::LocalFileSource;
#[cfg(feature = "db")]
pub use postgres::PostgresSource;
pub use rest::RestSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    #[serde(rename = "db")]
    Database,
    #[serde(rename = "supabase-rest")]
    SupabaseRest,
    #[serde(rename = "local")]
    Local,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Database => "db",
            SourceKind::SupabaseRest => "supabase-rest",
            SourceKind::Local => "local",
        }
    }
}

/// Filters pushed down to the backing store to reduce volume. Only
/// filters that can be evaluated on raw columns belong here; canonical
/// labels are filtered after normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFilter {
    pub ano: Option<i32>,
    pub mes: Option<u32>,
    /// Case-insensitive substring of `TX_SIGLA` (raw values look like `SES-PR`).
    pub uf: Option<String>,
}

impl SourceFilter {
    /// In-memory evaluation, for sources that cannot filter server-side.
    pub fn matches(&self, row: &RawRow) -> bool {
        if let Some(ano) = self.ano {
            if row.ano != Some(ano) {
                return false;
            }
        }
        if let Some(mes) = self.mes {
            if row.mes != Some(mes) {
                return false;
            }
        }
        if let Some(uf) = &self.uf {
            let needle = uf.to_lowercase();
            match &row.tx_sigla {
                Some(sigla) if sigla.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        true
    }
}

#[async_trait]
pub trait RowSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch_rows(&self, table: &str, filter: &SourceFilter) -> Result<Vec<RawRow>>;
}

/// Tiered row fetcher: pool if configured, otherwise REST (when it returns
/// rows), otherwise local files.
pub struct DataSource {
    table: String,
    database: Option<Arc<dyn RowSource>>,
    rest: Option<Arc<dyn RowSource>>,
    local: Arc<dyn RowSource>,
}

impl DataSource {
    pub fn new(table: impl Into<String>, local: Arc<dyn RowSource>) -> Self {
        Self {
            table: table.into(),
            database: None,
            rest: None,
            local,
        }
    }

    pub fn with_database(mut self, source: Arc<dyn RowSource>) -> Self {
        self.database = Some(source);
        self
    }

    pub fn with_rest(mut self, source: Arc<dyn RowSource>) -> Self {
        self.rest = Some(source);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The tier requests are currently served from.
    pub fn kind(&self) -> SourceKind {
        if self.database.is_some() {
            SourceKind::Database
        } else if self.rest.is_some() {
            SourceKind::SupabaseRest
        } else {
            SourceKind::Local
        }
    }

    pub async fn fetch_rows(&self, filter: &SourceFilter) -> Result<Vec<RawRow>> {
        if let Some(db) = &self.database {
            let rows = db.fetch_rows(&self.table, filter).await?;
            metrics::record_source_fetch(db.kind().as_str(), rows.len());
            return Ok(rows);
        }

        if let Some(rest) = &self.rest {
            match rest.fetch_rows(&self.table, filter).await {
                Ok(rows) if !rows.is_empty() => {
                    metrics::record_source_fetch(rest.kind().as_str(), rows.len());
                    return Ok(rows);
                }
                Ok(_) => debug!("Supabase REST returned no rows, using local data"),
                Err(e) => warn!("Supabase REST fetch failed, using local data: {}", e),
            }
        }

        let rows = self.local.fetch_rows(&self.table, filter).await?;
        metrics::record_source_fetch(self.local.kind().as_str(), rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    struct FixedSource {
        kind: SourceKind,
        rows: Vec<RawRow>,
        fail: bool,
    }

    #[async_trait]
    impl RowSource for FixedSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch_rows(&self, _table: &str, _filter: &SourceFilter) -> Result<Vec<RawRow>> {
            if self.fail {
                return Err(ServiceError::Database {
                    message: "boom".to_string(),
                });
            }
            Ok(self.rows.clone())
        }
    }

    fn row(qtde: i64) -> RawRow {
        RawRow {
            qtde,
            ..Default::default()
        }
    }

    fn fixed(kind: SourceKind, rows: Vec<RawRow>, fail: bool) -> Arc<dyn RowSource> {
        Arc::new(FixedSource { kind, rows, fail })
    }

    #[tokio::test]
    async fn test_rest_empty_falls_back_to_local() {
        let source = DataSource::new("t", fixed(SourceKind::Local, vec![row(7)], false))
            .with_rest(fixed(SourceKind::SupabaseRest, vec![], false));
        assert_eq!(source.kind(), SourceKind::SupabaseRest);
        let rows = source.fetch_rows(&SourceFilter::default()).await.unwrap();
        assert_eq!(rows, vec![row(7)]);
    }

    #[tokio::test]
    async fn test_rest_error_falls_back_to_local() {
        let source = DataSource::new("t", fixed(SourceKind::Local, vec![row(1)], false))
            .with_rest(fixed(SourceKind::SupabaseRest, vec![row(2)], true));
        let rows = source.fetch_rows(&SourceFilter::default()).await.unwrap();
        assert_eq!(rows, vec![row(1)]);
    }

    #[tokio::test]
    async fn test_database_wins_and_errors_propagate() {
        let source = DataSource::new("t", fixed(SourceKind::Local, vec![row(1)], false))
            .with_rest(fixed(SourceKind::SupabaseRest, vec![row(2)], false))
            .with_database(fixed(SourceKind::Database, vec![row(3)], false));
        assert_eq!(source.kind(), SourceKind::Database);
        assert_eq!(
            source.fetch_rows(&SourceFilter::default()).await.unwrap(),
            vec![row(3)]
        );

        let failing = DataSource::new("t", fixed(SourceKind::Local, vec![row(1)], false))
            .with_database(fixed(SourceKind::Database, vec![], true));
        assert!(failing.fetch_rows(&SourceFilter::default()).await.is_err());
    }

    #[test]
    fn test_filter_matches_raw_sigla_substring() {
        let filter = SourceFilter {
            ano: Some(2023),
            mes: None,
            uf: Some("pr".to_string()),
        };
        let hit = RawRow {
            tx_sigla: Some("SES-PR".to_string()),
            ano: Some(2023),
            ..Default::default()
        };
        let wrong_year = RawRow {
            ano: Some(2022),
            ..hit.clone()
        };
        let no_sigla = RawRow {
            tx_sigla: None,
            ..hit.clone()
        };
        assert!(filter.matches(&hit));
        assert!(!filter.matches(&wrong_year));
        assert!(!filter.matches(&no_sigla));
    }
}
