//! Client for the statistical procedures of the Supabase project.
//!
//! Each procedure is posted to `/rest/v1/rpc/<name>`. Deployed functions do
//! not agree on argument naming, so every call carries two payloads: the
//! plain one (`ano`, `uf`, ...) is tried first and the underscored one
//! (`_ano`, `_uf`, ...) second.

pub mod coerce;

use std::ops::RangeInclusive;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::aggregate::forecast::median;
use crate::config::SupabaseConfig;
use crate::constants::{FIELD_QTDE, RPC_COMPARACAO, RPC_SOMA_POR_ANO};
use crate::error::{Result, ServiceError};
use crate::metrics;

pub use coerce::{coerce_number, extract_number, normalize_rpc_row, unwrap_rpc_list, RpcRow};

/// Status reported when the request never produced an HTTP response.
const TRANSPORT_FAILURE_STATUS: u16 = 502;

/// Arguments of one procedure call, in both naming conventions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcPayload {
    pub plain: Map<String, Value>,
    pub underscored: Map<String, Value>,
}

impl RpcPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` and `_key` to the same value; `None` leaves both unset.
    pub fn with(mut self, key: &str, value: Option<impl Into<Value>>) -> Self {
        if let Some(value) = value {
            let value = value.into();
            self.underscored.insert(format!("_{key}"), value.clone());
            self.plain.insert(key.to_string(), value);
        }
        self
    }

    /// Set `key` and `_key` to different values.
    pub fn with_split(
        mut self,
        key: &str,
        plain: impl Into<Value>,
        underscored: impl Into<Value>,
    ) -> Self {
        self.plain.insert(key.to_string(), plain.into());
        self.underscored.insert(format!("_{key}"), underscored.into());
        self
    }

    /// Like `with`, but a missing value is sent as an explicit `null`.
    pub fn with_nullable(self, key: &str, value: Option<impl Into<Value>>) -> Self {
        let value: Value = value.map(Into::into).unwrap_or(Value::Null);
        self.with(key, Some(value))
    }

    pub fn plain_value(&self, key: &str) -> Option<&Value> {
        self.plain.get(key).filter(|v| !v.is_null())
    }
}

pub struct SupabaseRpc {
    client: reqwest::Client,
    base_url: String,
    service_role_key: String,
    table: String,
}

impl SupabaseRpc {
    pub fn new(config: &SupabaseConfig, table: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
            table: table.into(),
        })
    }

    /// Invoke procedure `name`, falling back to the underscored payload when
    /// the plain one is rejected. The error carries the last status and body.
    pub async fn call(&self, name: &'static str, payload: &RpcPayload) -> Result<Value> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, name);
        debug!(rpc = name, "Calling Supabase RPC");

        let (status, body) = self.post(&url, &payload.plain).await;
        if is_success(status) {
            metrics::record_rpc_call(name, true);
            return Ok(body);
        }

        let (status, body) = if payload.underscored != payload.plain {
            debug!(rpc = name, status, "Plain payload rejected, retrying with underscored");
            let (status2, body2) = self.post(&url, &payload.underscored).await;
            if is_success(status2) {
                metrics::record_rpc_call(name, true);
                return Ok(body2);
            }
            (status2, body2)
        } else {
            (status, body)
        };

        metrics::record_rpc_call(name, false);
        warn!(rpc = name, status, "Supabase RPC failed");
        Err(ServiceError::Rpc {
            rpc: name.to_string(),
            status,
            details: body,
        })
    }

    async fn post(&self, url: &str, body: &Map<String, Value>) -> (u16, Value) {
        let sent = self
            .client
            .post(url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await;

        match sent {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let text = resp.text().await.unwrap_or_default();
                let parsed = serde_json::from_str(&text).unwrap_or(Value::String(text));
                (status, parsed)
            }
            Err(e) => (TRANSPORT_FAILURE_STATUS, Value::String(e.to_string())),
        }
    }

    /// Total doses for the payload's filters via `obter_soma_por_ano`.
    ///
    /// When the procedure is unavailable the `QTDE` column is summed through
    /// the table endpoint instead. Returns the total (if one could be read)
    /// and the raw body it came from.
    pub async fn soma_por_ano(&self, payload: &RpcPayload) -> Result<(Option<f64>, Value)> {
        match self.call(RPC_SOMA_POR_ANO, payload).await {
            Ok(data) => Ok((extract_number(&data), data)),
            Err(rpc_err) => match self.table_sum(payload).await {
                Ok((total, rows)) => {
                    debug!(total, "Summed quantities through the table endpoint");
                    Ok((Some(total), rows))
                }
                Err(e) => {
                    warn!("Table sum fallback failed: {}", e);
                    Err(rpc_err)
                }
            },
        }
    }

    async fn table_sum(&self, payload: &RpcPayload) -> Result<(f64, Value)> {
        let url = format!("{}/rest/v1/{}", self.base_url, self.table);
        let resp = self
            .client
            .get(&url)
            .query(&table_sum_params(payload))
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Rpc {
                rpc: format!("{} (table)", self.table),
                status: status.as_u16(),
                details: Value::String(resp.text().await.unwrap_or_default()),
            });
        }

        let rows: Value = resp.json().await?;
        let total = rows
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|row| row.get(FIELD_QTDE))
                    .filter_map(coerce_number)
                    .sum()
            })
            .unwrap_or(0.0);
        Ok((total, rows))
    }

    /// Quantity reported for `year` by `obter_comparacao_dados`.
    pub async fn projecao_ano(
        &self,
        payload: &RpcPayload,
        year: i32,
    ) -> Result<(Option<f64>, Value)> {
        let data = self.call(RPC_COMPARACAO, payload).await?;
        let projection = unwrap_rpc_list(&data).and_then(|items| {
            items
                .iter()
                .filter_map(normalize_rpc_row)
                .find(|row| row.ano == Some(i64::from(year)))
                .and_then(|row| row.quantidade)
        });
        Ok((projection, data))
    }

    /// Median of the annual totals over `years`, used as the projection when
    /// no product is selected. Years whose total cannot be read are skipped;
    /// the per-year raw bodies are returned for debugging.
    pub async fn median_projection_totals(
        &self,
        base: &RpcPayload,
        years: RangeInclusive<i32>,
    ) -> (Option<f64>, Value) {
        let mut totals = Vec::new();
        let mut raw = Vec::new();

        for year in years {
            let payload = base.clone().with("ano", Some(year));
            match self.soma_por_ano(&payload).await {
                Ok((total, body)) => {
                    raw.push(json!({ "ano": year, "raw": body }));
                    totals.extend(total);
                }
                Err(e) => raw.push(json!({ "ano": year, "raw": { "error": e.to_string() } })),
            }
        }

        (median(&totals), Value::Array(raw))
    }
}

fn is_success(status: u16) -> bool {
    matches!(status, 200 | 201)
}

/// PostgREST filters equivalent to the plain payload of a sum request.
fn table_sum_params(payload: &RpcPayload) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", FIELD_QTDE.to_string())];
    let text = |key: &str| payload.plain_value(key).map(value_text);
    if let Some(ano) = text("ano") {
        params.push(("ANO", format!("eq.{ano}")));
    }
    if let Some(mes) = text("mes") {
        params.push(("MES", format!("eq.{mes}")));
    }
    if let Some(uf) = text("uf") {
        params.push(("TX_SIGLA", format!("ilike.*{uf}*")));
    }
    if let Some(insumo) = text("insumo_nome") {
        params.push(("TX_INSUMO", format!("ilike.*{insumo}*")));
    }
    params
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_conventions() {
        let payload = RpcPayload::new()
            .with("ano", Some(2024))
            .with("uf", None::<String>)
            .with_split("insumo_nome", "BCG", "BCG.*")
            .with_nullable("mes", None::<i64>);

        assert_eq!(payload.plain.get("ano"), Some(&json!(2024)));
        assert_eq!(payload.underscored.get("_ano"), Some(&json!(2024)));
        assert!(!payload.plain.contains_key("uf"));
        assert_eq!(payload.plain.get("insumo_nome"), Some(&json!("BCG")));
        assert_eq!(payload.underscored.get("_insumo_nome"), Some(&json!("BCG.*")));
        assert_eq!(payload.plain.get("mes"), Some(&Value::Null));
        assert!(payload.plain_value("mes").is_none());
    }

    #[test]
    fn test_table_sum_params_follow_plain_payload() {
        let payload = RpcPayload::new()
            .with("ano", Some(2024))
            .with("uf", Some("PR"))
            .with_split("insumo_nome", "BCG", "ignored");
        assert_eq!(
            table_sum_params(&payload),
            vec![
                ("select", "QTDE".to_string()),
                ("ANO", "eq.2024".to_string()),
                ("TX_SIGLA", "ilike.*PR*".to_string()),
                ("TX_INSUMO", "ilike.*BCG*".to_string()),
            ]
        );
    }
}
