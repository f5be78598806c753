use std::sync::Arc;

use crate::error::Result;
use crate::metrics;
use crate::normalize::Normalizer;
use crate::rpc::SupabaseRpc;
use crate::sources::{DataSource, SourceFilter};
use crate::types::NormalizedRow;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub normalizer: Arc<Normalizer>,
    pub data: Arc<DataSource>,
    /// Present only when Supabase credentials are configured.
    pub rpc: Option<Arc<SupabaseRpc>>,
}

impl AppState {
    pub fn new(normalizer: Arc<Normalizer>, data: Arc<DataSource>) -> Self {
        Self {
            normalizer,
            data,
            rpc: None,
        }
    }

    pub fn with_rpc(mut self, rpc: Arc<SupabaseRpc>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    /// Fetch rows for `filter` and attach canonical labels.
    pub async fn normalized_rows(&self, filter: &SourceFilter) -> Result<Vec<NormalizedRow>> {
        let rows = self.data.fetch_rows(filter).await?;
        Ok(rows
            .into_iter()
            .map(|raw| {
                let row = NormalizedRow::from_raw(raw, &self.normalizer);
                if row.raw.tx_insumo_norm.is_none() {
                    metrics::record_insumo_pass(row.insumo_pass);
                }
                row
            })
            .collect())
    }
}
