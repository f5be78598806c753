use serde::Serialize;
use std::collections::BTreeMap;

use super::RowFilter;
use crate::constants::FORECAST_YEAR;
use crate::normalize::Normalizer;
use crate::sources::SourceFilter;
use crate::types::NormalizedRow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub data: String,
    pub doses_previstas: i64,
    pub intervalo_inferior: i64,
    pub intervalo_superior: i64,
}

/// How a projected quantity relates to the yearly total it is compared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionUnit {
    Mensal,
    Anual,
    Desconhecida,
}

/// Source filter for the forecast: the year is dropped so every year of
/// history is available for averaging.
pub fn forecast_source_filter(filter: &RowFilter) -> SourceFilter {
    SourceFilter {
        ano: None,
        mes: filter.mes,
        uf: filter.uf.clone(),
    }
}

/// One-point projection for the forecast year: mean of the annual totals,
/// with a band of one population standard deviation.
///
/// Filter values are normalized before comparison. When a value does not
/// normalize it is matched as a case-insensitive substring of the raw field.
/// Without any filter nothing is projected.
pub fn forecast(
    rows: &[NormalizedRow],
    filter: &RowFilter,
    normalizer: &Normalizer,
) -> Vec<ForecastPoint> {
    if filter.is_empty() {
        return Vec::new();
    }

    let uf_norm = filter
        .uf
        .as_deref()
        .and_then(|uf| normalizer.normalize_sigla(Some(uf)));
    let fabricante_norm = filter
        .fabricante
        .as_deref()
        .and_then(|f| normalizer.normalize_insumo(Some(f)));

    let matches = |row: &NormalizedRow| {
        if filter.mes.is_some() && row.raw.mes != filter.mes {
            return false;
        }
        if let Some(uf) = &filter.uf {
            let ok = match &uf_norm {
                Some(norm) => row.sigla_norm.as_ref() == Some(norm),
                None => contains_ignore_case(row.raw.tx_sigla.as_deref(), uf),
            };
            if !ok {
                return false;
            }
        }
        if let Some(fabricante) = &filter.fabricante {
            let ok = match fabricante_norm {
                Some(norm) => row.insumo_norm.as_deref() == Some(norm),
                None => contains_ignore_case(row.raw.tx_insumo.as_deref(), fabricante),
            };
            if !ok {
                return false;
            }
        }
        true
    };

    let mut by_year: BTreeMap<i32, i64> = BTreeMap::new();
    for row in rows.iter().filter(|&row| matches(row)) {
        let total = by_year.entry(row.raw.ano.unwrap_or(0)).or_default();
        *total = total.saturating_add(row.raw.qtde);
    }

    let totals: Vec<f64> = by_year
        .into_iter()
        .filter(|(year, _)| *year > 0)
        .map(|(_, total)| total as f64)
        .collect();
    let Some(avg) = mean(&totals) else {
        return Vec::new();
    };
    let sd = if totals.len() > 1 {
        population_std_dev(&totals).unwrap_or(0.0)
    } else {
        0.0
    };

    let data = match filter.mes {
        Some(mes) => format!("{}-{:02}", FORECAST_YEAR, mes),
        None => FORECAST_YEAR.to_string(),
    };

    vec![ForecastPoint {
        data,
        doses_previstas: avg.round_ties_even() as i64,
        intervalo_inferior: (avg - sd).max(0.0).round_ties_even() as i64,
        intervalo_superior: (avg + sd).round_ties_even() as i64,
    }]
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Guess whether `projection` is a monthly or a yearly figure by comparing
/// it with the historical yearly total `soma`.
pub fn classify_projection_unit(
    projection: Option<f64>,
    soma: Option<f64>,
    month_requested: bool,
) -> ProjectionUnit {
    let Some(proj) = projection else {
        return ProjectionUnit::Desconhecida;
    };
    if month_requested {
        return ProjectionUnit::Mensal;
    }
    let Some(soma) = soma else {
        return ProjectionUnit::Desconhecida;
    };
    if soma <= 0.0 || proj < 0.0 {
        return ProjectionUnit::Desconhecida;
    }

    if proj < soma / 100.0 {
        return ProjectionUnit::Mensal;
    }
    let ratio = proj * 12.0 / soma;
    if (0.5..=2.0).contains(&ratio) {
        ProjectionUnit::Mensal
    } else if proj >= soma * 0.5 {
        ProjectionUnit::Anual
    } else {
        ProjectionUnit::Mensal
    }
}
