use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

static NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.\-]").expect("non-numeric pattern is valid"));

const YEAR_KEYS: &[&str] = &["ano", "year", "f0", "0", "ano_val"];
const QUANTITY_KEYS: &[&str] = &["quantidade", "quant", "qtde", "f1", "1", "quantidade_val"];
const KIND_KEYS: &[&str] = &["tipo_dado", "tipo", "f2", "2"];
const TOTAL_KEYS: &[&str] = &["sum", "soma", "quantidade", "total", "value", "qtde", "quant"];

/// One `{year, quantity, kind}` record of the history+forecast RPC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRow {
    pub ano: Option<i64>,
    pub quantidade: Option<f64>,
    pub tipo_dado: Option<String>,
}

/// Numeric view of a loosely typed RPC value.
///
/// Text may use Brazilian formatting (`"1.234,5"`), carry non-breaking
/// spaces or units; whatever is left after dropping non-numeric characters
/// is parsed.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let mut text = s.trim().replace('\u{00A0}', "");
            if text.contains('.') && text.contains(',') {
                text = text.replace('.', "").replace(',', ".");
            }
            if let Ok(n) = text.parse::<f64>() {
                return Some(n);
            }
            let cleaned = NON_NUMERIC.replace_all(&text, "");
            if matches!(cleaned.as_ref(), "" | "-" | ".") {
                return None;
            }
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

fn coerce_year(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Read one RPC record, either an object (with any of the known key
/// aliases, or positionally by value order) or an array `[ano, qtd, tipo]`.
pub fn normalize_rpc_row(item: &Value) -> Option<RpcRow> {
    let (ano, quantidade, tipo) = match item {
        Value::Object(obj) => {
            let pick = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
                    .cloned()
            };
            let mut ano = pick(YEAR_KEYS);
            let mut quantidade = pick(QUANTITY_KEYS);
            let mut tipo = pick(KIND_KEYS);

            if ano.is_none() || quantidade.is_none() {
                let values: Vec<&Value> = obj.values().collect();
                if values.len() >= 2 {
                    ano = ano.or_else(|| Some(values[0].clone()));
                    quantidade = quantidade.or_else(|| Some(values[1].clone()));
                    if values.len() >= 3 {
                        tipo = tipo.or_else(|| Some(values[2].clone()));
                    }
                }
            }
            (ano, quantidade, tipo)
        }
        Value::Array(items) if items.len() >= 2 => (
            Some(items[0].clone()),
            Some(items[1].clone()),
            items.get(2).cloned(),
        ),
        _ => return None,
    };

    let row = RpcRow {
        ano: ano.as_ref().and_then(coerce_year),
        quantidade: quantidade.as_ref().and_then(coerce_number),
        tipo_dado: tipo.as_ref().and_then(coerce_text),
    };
    if row.ano.is_none() && row.quantidade.is_none() && row.tipo_dado.is_none() {
        return None;
    }
    Some(row)
}

/// First usable number in the various shapes a "sum" RPC may return: a
/// bare number, a list of records, or a single record.
pub fn extract_number(data: &Value) -> Option<f64> {
    match data {
        Value::Number(n) => n.as_f64(),
        Value::Array(items) => {
            let first = items.first()?;
            if let Value::Object(obj) = first {
                if let Some(v) = TOTAL_KEYS
                    .iter()
                    .filter_map(|k| obj.get(*k).filter(|v| !v.is_null()))
                    .find_map(coerce_number)
                {
                    return Some(v);
                }
                return obj.values().next().and_then(coerce_number);
            }
            coerce_number(first)
        }
        Value::Object(obj) => {
            if let Some(v) = TOTAL_KEYS
                .iter()
                .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
            {
                return coerce_number(v);
            }
            obj.values().next().and_then(extract_number)
        }
        _ => None,
    }
}

/// Unwrap a list that PostgREST may have wrapped under `data`, `result`
/// or `rows`.
pub fn unwrap_rpc_list(data: &Value) -> Option<&Vec<Value>> {
    match data {
        Value::Array(items) => Some(items),
        Value::Object(obj) => ["data", "result", "rows"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array)),
        _ => None,
    }
}
