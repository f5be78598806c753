use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::state::AppState;
use crate::aggregate::{self, forecast::forecast_source_filter, RowFilter};
use crate::error::ServiceError;

/// Error response with a JSON body, `{"erro": ...}` plus optional extras.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "erro": message.into() }),
        }
    }

    /// Add a field to the body (`details`, `rpc_raw`, ...).
    pub fn with(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.body {
            map.insert(key.to_string(), value);
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidParameter { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            ServiceError::Rpc {
                rpc,
                status,
                details,
            } => ApiError::new(
                StatusCode::BAD_GATEWAY,
                format!("Falha ao chamar RPC {rpc} no Supabase."),
            )
            .with(
                "details",
                json!({ "error": "http_rpc_failed", "status": status, "details": details }),
            ),
            other => {
                error!("Request failed: {}", other);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Query values arrive as text; empty strings count as absent.
pub(crate) fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_param<T: std::str::FromStr>(
    name: &str,
    value: Option<String>,
) -> Result<Option<T>, ServiceError> {
    present(value)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| ServiceError::InvalidParameter {
                name: name.to_string(),
                message: format!("'{raw}' is not an integer"),
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub ano: Option<String>,
    pub mes: Option<String>,
    pub uf: Option<String>,
    pub fabricante: Option<String>,
}

impl FilterParams {
    pub fn into_filter(self) -> Result<RowFilter, ServiceError> {
        Ok(RowFilter {
            ano: parse_param("ano", self.ano)?,
            mes: parse_param("mes", self.mes)?,
            uf: present(self.uf),
            fabricante: present(self.fabricante),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NormalizeParams {
    pub tx_insumo: Option<String>,
    pub tx_sigla: Option<String>,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn source(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "source": state.data.kind() }))
}

pub async fn normalize(
    State(state): State<AppState>,
    Query(params): Query<NormalizeParams>,
) -> impl IntoResponse {
    let insumo_norm = state.normalizer.normalize_insumo(params.tx_insumo.as_deref());
    let sigla_norm = state.normalizer.normalize_sigla(params.tx_sigla.as_deref());
    Json(json!({
        "tx_insumo": params.tx_insumo,
        "tx_insumo_norm": insumo_norm,
        "tx_sigla": params.tx_sigla,
        "tx_sigla_norm": sigla_norm,
    }))
}

pub async fn mappings(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "vacinas": state.normalizer.rules().labels() }))
}

pub async fn overview(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<Json<aggregate::Overview>> {
    let filter = params.into_filter()?;
    let rows = state.normalized_rows(&filter.source_filter()).await?;
    Ok(Json(aggregate::overview(&rows, &filter)))
}

pub async fn timeseries(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<Json<Vec<aggregate::TimeseriesPoint>>> {
    let filter = params.into_filter()?;
    let rows = state.normalized_rows(&filter.source_filter()).await?;
    Ok(Json(aggregate::timeseries(&rows, &filter)))
}

/// State ranking; a `uf` parameter is ignored.
pub async fn ranking_ufs(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<Json<Vec<aggregate::UfRanking>>> {
    let filter = RowFilter {
        uf: None,
        ..params.into_filter()?
    };
    let rows = state.normalized_rows(&filter.source_filter()).await?;
    Ok(Json(aggregate::ranking_ufs(&rows, &filter)))
}

pub async fn forecast(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<Json<Vec<aggregate::ForecastPoint>>> {
    let filter = params.into_filter()?;
    if filter.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let rows = state.normalized_rows(&forecast_source_filter(&filter)).await?;
    Ok(Json(aggregate::forecast(&rows, &filter, &state.normalizer)))
}
