//! History + forecast endpoints backed by the Supabase procedures.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::handlers::{parse_param, present, ApiError, ApiResult};
use super::state::AppState;
use crate::aggregate::{classify_projection_unit, ProjectionUnit};
use crate::constants::{BASE_YEAR, FORECAST_YEAR, HISTORY_YEARS, RPC_COMPARACAO};
use crate::error::ServiceError;
use crate::normalize::Normalizer;
use crate::rpc::{normalize_rpc_row, unwrap_rpc_list, RpcPayload, SupabaseRpc};

const MSG_INSUMO_REQUIRED: &str =
    "É obrigatório informar o nome da vacina (insumo_nome) para plotar o gráfico de previsão.";
const MSG_NOT_CONFIGURED: &str = "Supabase não está configurado no servidor (verifique SUPABASE_URL e SUPABASE_SERVICE_ROLE_KEY).";
const MSG_NO_DATA: &str = "Nenhum dado encontrado para os filtros fornecidos.";
const MSG_BASE_YEAR: &str = "Para gerar a comparação de previsão, o ano base precisa ser 2024.";

#[derive(Debug, Default, Deserialize)]
pub struct PrevisaoParams {
    pub insumo_nome: Option<String>,
    pub uf: Option<String>,
    pub mes: Option<String>,
    pub ano: Option<String>,
    pub debug: Option<String>,
}

impl PrevisaoParams {
    fn debug(&self) -> bool {
        self.debug.as_deref().is_some_and(|v| {
            matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonPoint {
    pub ano: i32,
    pub quantidade: Option<f64>,
    pub tipo: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResponse {
    pub insumo: String,
    pub projecao_unidade: ProjectionUnit,
    pub dados_comparacao: Vec<ComparisonPoint>,
    /// Always emitted; `null` unless `debug` was requested.
    pub rpc_raw_soma: Option<Value>,
    pub rpc_raw_previsao: Option<Value>,
}

fn rpc_client(state: &AppState) -> ApiResult<Arc<SupabaseRpc>> {
    state
        .rpc
        .clone()
        .ok_or_else(|| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, MSG_NOT_CONFIGURED))
}

fn not_found(debug: bool, raw: &Value) -> ApiError {
    let err = ApiError::new(StatusCode::NOT_FOUND, MSG_NO_DATA);
    if debug {
        err.with("rpc_raw", raw.clone())
    } else {
        err
    }
}

/// A lone forecast row without quantity means the procedure found no history.
fn is_empty_forecast(items: &[Value]) -> bool {
    match items {
        [] => true,
        [only] => normalize_rpc_row(only).is_some_and(|row| {
            row.tipo_dado.as_deref() == Some("previsao")
                && row.quantidade.map_or(true, |q| q == 0.0)
        }),
        _ => false,
    }
}

/// `GET /api/previsao`: history and forecast rows for one product, passed
/// through from `obter_comparacao_dados`.
pub async fn previsao(
    State(state): State<AppState>,
    Query(params): Query<PrevisaoParams>,
) -> ApiResult<Response> {
    let debug = params.debug();
    let Some(insumo) = present(params.insumo_nome) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, MSG_INSUMO_REQUIRED));
    };
    let rpc = rpc_client(&state)?;
    let mes: Option<i64> = parse_param("mes", params.mes)?;

    let payload = RpcPayload::new()
        .with("insumo_nome", Some(insumo))
        .with("uf", present(params.uf))
        .with("mes", mes);

    let data = rpc.call(RPC_COMPARACAO, &payload).await.map_err(|e| match e {
        ServiceError::Rpc {
            status, details, ..
        } => ApiError::new(
            StatusCode::BAD_GATEWAY,
            "Falha ao chamar RPC via HTTP no Supabase.",
        )
        .with(
            "details",
            json!({ "error": "http_rpc_failed", "status": status, "details": details }),
        ),
        other => ApiError::from(other),
    })?;

    let Some(items) = unwrap_rpc_list(&data) else {
        return Err(not_found(debug, &data));
    };
    if is_empty_forecast(items) {
        return Err(not_found(debug, &data));
    }

    let body = match (&data, debug) {
        (Value::Array(_), false) => data.clone(),
        (Value::Array(_), true) => json!({ "rpc_raw": data }),
        (_, false) => Value::Array(items.clone()),
        (_, true) => json!({ "rpc_raw": data, "result": items }),
    };
    Ok(Json(body).into_response())
}

/// Value sent as the product argument of the procedures: the pattern of the
/// rule owning the normalized label, else the first pattern matching the raw
/// text, else the label, else the raw text.
pub fn rpc_insumo_argument(normalizer: &Normalizer, raw: &str) -> String {
    let label = normalizer.normalize_insumo(Some(raw));
    let rules = normalizer.rules();
    label
        .and_then(|l| rules.pattern_for_label(l))
        .or_else(|| rules.first_pattern_matching(raw))
        .or(label)
        .unwrap_or(raw)
        .to_string()
}

fn non_zero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

/// `GET /api/previsao/comparacao`: base-year total against the projection
/// for the forecast year, for one product or for all of them.
pub async fn comparacao(
    State(state): State<AppState>,
    Query(params): Query<PrevisaoParams>,
) -> ApiResult<Json<ComparisonResponse>> {
    let debug = params.debug();
    let ano: Option<i32> = parse_param("ano", params.ano)?;
    if ano != Some(BASE_YEAR) {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, MSG_BASE_YEAR));
    }
    let rpc = rpc_client(&state)?;
    let mes: Option<i64> = parse_param("mes", params.mes)?;
    let uf = present(params.uf);
    let insumo = present(params.insumo_nome);

    let argument = insumo
        .as_deref()
        .map(|raw| rpc_insumo_argument(&state.normalizer, raw));

    let mut soma_payload = RpcPayload::new().with("ano", Some(BASE_YEAR));
    if let (Some(raw), Some(arg)) = (&insumo, &argument) {
        soma_payload = soma_payload.with_split("insumo_nome", raw.as_str(), arg.as_str());
    }
    let soma_payload = soma_payload.with("uf", uf.clone()).with("mes", mes);

    let previsao_payload = RpcPayload::new()
        .with_nullable("insumo_nome", argument.clone())
        .with("uf", uf)
        .with("mes", mes);

    let (soma, soma_raw) = rpc.soma_por_ano(&soma_payload).await.map_err(|e| match e {
        ServiceError::Rpc {
            status, details, ..
        } => ApiError::new(
            StatusCode::BAD_GATEWAY,
            "Falha ao chamar RPC obter_soma_por_ano no Supabase.",
        )
        .with(
            "details",
            json!({ "error": "rpc_failed", "status": status, "details": details }),
        ),
        other => ApiError::from(other),
    })?;

    let mut projection = None;
    let mut previsao_raw = Value::Array(Vec::new());
    if insumo.is_some() {
        match rpc.projecao_ano(&previsao_payload, FORECAST_YEAR).await {
            Ok((value, raw)) => {
                projection = value;
                previsao_raw = raw;
            }
            Err(e) => warn!("Projection RPC failed, reporting no projection: {}", e),
        }
    } else {
        let (median, raw) = rpc
            .median_projection_totals(&soma_payload, HISTORY_YEARS)
            .await;
        debug!(?median, "Median projection over historical totals");
        if median.is_some() {
            projection = median;
            previsao_raw = raw;
        }
    }

    let response = ComparisonResponse {
        insumo: insumo.unwrap_or_else(|| "Total".to_string()),
        projecao_unidade: classify_projection_unit(projection, soma, mes.is_some()),
        dados_comparacao: vec![
            ComparisonPoint {
                ano: BASE_YEAR,
                quantidade: non_zero(soma),
                tipo: "historico",
            },
            ComparisonPoint {
                ano: FORECAST_YEAR,
                quantidade: non_zero(projection),
                tipo: "projeção",
            },
        ],
        rpc_raw_soma: debug.then_some(soma_raw),
        rpc_raw_previsao: debug.then_some(previsao_raw),
    };
    Ok(Json(response))
}
