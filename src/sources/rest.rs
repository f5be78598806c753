use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{RowSource, SourceFilter, SourceKind};
use crate::config::SupabaseConfig;
use crate::error::Result;
use crate::types::RawRow;

const SELECT_COLUMNS: &str = "TX_SIGLA,TX_INSUMO,ANO,MES,QTDE";

/// Rows through the Supabase PostgREST endpoint (`/rest/v1/<table>`).
pub struct RestSource {
    client: reqwest::Client,
    base_url: String,
    service_role_key: String,
}

impl RestSource {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
        })
    }

    /// PostgREST query parameters for a pushed-down filter.
    pub fn query_params(filter: &SourceFilter) -> Vec<(&'static str, String)> {
        let mut params = vec![("select", SELECT_COLUMNS.to_string())];
        if let Some(ano) = filter.ano {
            params.push(("ANO", format!("eq.{}", ano)));
        }
        if let Some(mes) = filter.mes {
            params.push(("MES", format!("eq.{}", mes)));
        }
        if let Some(uf) = &filter.uf {
            params.push(("TX_SIGLA", format!("ilike.*{}*", uf)));
        }
        params
    }
}

#[async_trait]
impl RowSource for RestSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SupabaseRest
    }

    async fn fetch_rows(&self, table: &str, filter: &SourceFilter) -> Result<Vec<RawRow>> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        debug!(url = %url, ?filter, "Fetching rows from Supabase REST");

        let resp = self
            .client
            .get(&url)
            .query(&Self::query_params(filter))
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Supabase request failed: {} {}", status, body);
            return Ok(Vec::new());
        }

        let data: Value = resp.json().await?;
        let rows = data
            .as_array()
            .map(|items| items.iter().filter_map(RawRow::from_json).collect())
            .unwrap_or_default();
        Ok(rows)
    }
}
