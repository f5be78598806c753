use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{RowSource, SourceFilter, SourceKind};
use crate::error::{Result, ServiceError};
use crate::types::RawRow;

/// Rows from the first existing file of a candidate list. Each file holds a
/// JSON array of row objects, typically the output of the `normalize` command.
pub struct LocalFileSource {
    candidates: Vec<PathBuf>,
}

impl LocalFileSource {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    fn load(&self) -> Result<Vec<RawRow>> {
        let Some(path) = self.candidates.iter().find(|p| p.exists()) else {
            debug!("No local data file found among {:?}", self.candidates);
            return Ok(Vec::new());
        };

        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        let items = value.as_array().ok_or_else(|| {
            ServiceError::Configuration(format!(
                "local data file '{}' is not a JSON array",
                path.display()
            ))
        })?;

        let rows: Vec<RawRow> = items.iter().filter_map(RawRow::from_json).collect();
        info!(path = %path.display(), rows = rows.len(), "Loaded local rows");
        Ok(rows)
    }
}

#[async_trait]
impl RowSource for LocalFileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn fetch_rows(&self, _table: &str, filter: &SourceFilter) -> Result<Vec<RawRow>> {
        let mut rows = self.load()?;
        rows.retain(|row| filter.matches(row));
        Ok(rows)
    }
}
