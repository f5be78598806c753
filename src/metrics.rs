use std::net::SocketAddr;

use tracing::{info, warn};

use crate::normalize::MatchPass;

/// Installs the Prometheus exporter on `0.0.0.0:<port>`. Failure is logged
/// and otherwise ignored so the API keeps serving without metrics.
pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed: {}", e),
    }
}

/// Count one normalized row by the pass that classified its product text.
pub fn record_insumo_pass(pass: Option<MatchPass>) {
    let label = pass.map_or("unmatched", MatchPass::as_str);
    ::metrics::counter!("normalizer_rows_total", "pass" => label).increment(1);
}

pub fn record_source_fetch(source: &'static str, rows: usize) {
    ::metrics::counter!("source_fetch_total", "source" => source).increment(1);
    ::metrics::histogram!("source_fetch_rows", "source" => source).record(rows as f64);
}

pub fn record_rpc_call(rpc: &'static str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    ::metrics::counter!("rpc_calls_total", "rpc" => rpc, "outcome" => outcome).increment(1);
}
