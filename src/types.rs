use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{
    FIELD_ANO, FIELD_INSUMO, FIELD_INSUMO_NORM, FIELD_MES, FIELD_QTDE, FIELD_SIGLA,
    FIELD_SIGLA_NORM,
};
use crate::normalize::{MatchPass, Normalizer};

/// One row of the distribution table as delivered by a data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub tx_sigla: Option<String>,
    pub tx_insumo: Option<String>,
    pub ano: Option<i32>,
    pub mes: Option<u32>,
    pub qtde: i64,
    /// Labels already attached upstream (pre-normalized local files).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_sigla_norm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_insumo_norm: Option<String>,
}

impl RawRow {
    /// Build a row from a JSON object, accepting upper- or lower-case field
    /// names and numbers encoded as strings. Non-objects yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            tx_sigla: pick(obj, FIELD_SIGLA).and_then(value_to_text),
            tx_insumo: pick(obj, FIELD_INSUMO).and_then(value_to_text),
            ano: pick(obj, FIELD_ANO)
                .and_then(value_to_i64)
                .and_then(|v| i32::try_from(v).ok()),
            mes: pick(obj, FIELD_MES)
                .and_then(value_to_i64)
                .and_then(|v| u32::try_from(v).ok()),
            qtde: pick(obj, FIELD_QTDE).and_then(value_to_i64).unwrap_or(0),
            tx_sigla_norm: pick(obj, FIELD_SIGLA_NORM).and_then(value_to_text),
            tx_insumo_norm: pick(obj, FIELD_INSUMO_NORM).and_then(value_to_text),
        })
    }
}

/// A raw row plus the canonical labels derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    #[serde(flatten)]
    pub raw: RawRow,
    pub sigla_norm: Option<String>,
    pub insumo_norm: Option<String>,
    #[serde(skip)]
    pub insumo_pass: Option<MatchPass>,
}

impl NormalizedRow {
    /// Attach canonical labels to `raw`. Labels already carried by the row
    /// are kept; missing ones are computed.
    pub fn from_raw(raw: RawRow, normalizer: &Normalizer) -> Self {
        let sigla_norm = raw
            .tx_sigla_norm
            .clone()
            .or_else(|| normalizer.normalize_sigla(raw.tx_sigla.as_deref()));

        let (insumo_norm, insumo_pass) = match &raw.tx_insumo_norm {
            Some(label) => (Some(label.clone()), None),
            None => match normalizer.classify_insumo(raw.tx_insumo.as_deref()) {
                Some(c) => (Some(c.label.to_string()), Some(c.pass)),
                None => (None, None),
            },
        };

        Self {
            raw,
            sigla_norm,
            insumo_norm,
            insumo_pass,
        }
    }
}

/// Upper-case key first; null or empty-string values fall through to the
/// lower-case key.
fn pick<'a>(obj: &'a Map<String, Value>, upper_key: &str) -> Option<&'a Value> {
    let present = |v: &&Value| !v.is_null() && v.as_str() != Some("");
    obj.get(upper_key)
        .filter(present)
        .or_else(|| obj.get(&upper_key.to_lowercase()).filter(present))
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integer view of a JSON value. Floats are truncated; text is parsed
/// leniently; anything else is `None`.
pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_i64_lenient(s),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub fn parse_i64_lenient(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
}
