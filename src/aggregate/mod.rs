//! Grouping and summing of normalized rows for the query endpoints.

pub mod forecast;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::sources::SourceFilter;
use crate::types::NormalizedRow;

pub use forecast::{
    classify_projection_unit, forecast, mean, median, population_std_dev, ForecastPoint,
    ProjectionUnit,
};

/// Query filters of the aggregation endpoints. `uf` and `fabricante` are
/// compared against the canonical labels of each row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub ano: Option<i32>,
    pub mes: Option<u32>,
    pub uf: Option<String>,
    pub fabricante: Option<String>,
}

impl RowFilter {
    pub fn is_empty(&self) -> bool {
        self.ano.is_none() && self.mes.is_none() && self.uf.is_none() && self.fabricante.is_none()
    }

    /// The subset a data source can evaluate on raw columns.
    pub fn source_filter(&self) -> SourceFilter {
        SourceFilter {
            ano: self.ano,
            mes: self.mes,
            uf: self.uf.clone(),
        }
    }

    pub fn matches(&self, row: &NormalizedRow) -> bool {
        if self.ano.is_some() && row.raw.ano != self.ano {
            return false;
        }
        if self.mes.is_some() && row.raw.mes != self.mes {
            return false;
        }
        if self.uf.is_some() && row.sigla_norm != self.uf {
            return false;
        }
        if self.fabricante.is_some() && row.insumo_norm != self.fabricante {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_doses: i64,
    pub periodo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesPoint {
    pub data: String,
    pub doses_distribuidas: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UfRanking {
    pub uf: Option<String>,
    pub sigla: Option<String>,
    pub doses_distribuidas: i64,
}

pub fn overview(rows: &[NormalizedRow], filter: &RowFilter) -> Overview {
    let total_doses = rows
        .iter()
        .filter(|row| filter.matches(row))
        .map(|row| row.raw.qtde)
        .fold(0i64, i64::saturating_add);
    Overview {
        total_doses,
        periodo: None,
    }
}

/// Monthly totals keyed `YYYY-MM`, ascending. Missing year or month count
/// as zero.
pub fn timeseries(rows: &[NormalizedRow], filter: &RowFilter) -> Vec<TimeseriesPoint> {
    let mut buckets: BTreeMap<String, i64> = BTreeMap::new();
    for row in rows.iter().filter(|row| filter.matches(row)) {
        let key = format!(
            "{:04}-{:02}",
            row.raw.ano.unwrap_or(0),
            row.raw.mes.unwrap_or(0)
        );
        let total = buckets.entry(key).or_default();
        *total = total.saturating_add(row.raw.qtde);
    }
    buckets
        .into_iter()
        .map(|(data, doses_distribuidas)| TimeseriesPoint {
            data,
            doses_distribuidas,
        })
        .collect()
}

/// Totals per state, largest first. Rows whose sigla does not normalize are
/// grouped under the raw value; ties keep key order.
pub fn ranking_ufs(rows: &[NormalizedRow], filter: &RowFilter) -> Vec<UfRanking> {
    let mut buckets: BTreeMap<Option<String>, i64> = BTreeMap::new();
    for row in rows.iter().filter(|row| filter.matches(row)) {
        let key = row.sigla_norm.clone().or_else(|| row.raw.tx_sigla.clone());
        let total = buckets.entry(key).or_default();
        *total = total.saturating_add(row.raw.qtde);
    }

    let mut ranking: Vec<UfRanking> = buckets
        .into_iter()
        .map(|(uf, doses_distribuidas)| UfRanking {
            sigla: uf.clone(),
            uf,
            doses_distribuidas,
        })
        .collect();
    ranking.sort_by(|a, b| b.doses_distribuidas.cmp(&a.doses_distribuidas));
    ranking
}
