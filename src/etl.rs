use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::constants::{FIELD_INSUMO, FIELD_INSUMO_NORM, FIELD_SIGLA, FIELD_SIGLA_NORM};
use crate::error::{Result, ServiceError};
use crate::metrics;
use crate::normalize::{MatchPass, Normalizer};

/// Counts reported after a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EtlSummary {
    pub total: usize,
    pub sigla_normalized: usize,
    /// Rows per insumo pass; `unmatched` for rows left without a label.
    pub insumo_by_pass: BTreeMap<&'static str, usize>,
}

impl EtlSummary {
    fn record(&mut self, sigla: bool, pass: Option<MatchPass>) {
        self.total += 1;
        if sigla {
            self.sigla_normalized += 1;
        }
        let key = pass.map_or("unmatched", MatchPass::as_str);
        *self.insumo_by_pass.entry(key).or_default() += 1;
    }
}

fn text_field<'a>(record: &'a Map<String, Value>, upper_key: &str) -> Option<&'a str> {
    let text = move |key: &str| record.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
    text(upper_key).or_else(|| text(&upper_key.to_lowercase()))
}

/// Attach `tx_sigla_norm` and `tx_insumo_norm` to one record. Other fields
/// are left untouched; existing derived fields are overwritten.
pub fn normalize_record(
    normalizer: &Normalizer,
    mut record: Map<String, Value>,
) -> (Map<String, Value>, Option<MatchPass>) {
    let sigla = normalizer.normalize_sigla(text_field(&record, FIELD_SIGLA));
    let classification = normalizer.classify_insumo(text_field(&record, FIELD_INSUMO));
    let pass = classification.map(|c| c.pass);
    let insumo = classification.map(|c| Value::String(c.label.to_string()));

    record.insert(
        FIELD_SIGLA_NORM.to_string(),
        sigla.map(Value::String).unwrap_or(Value::Null),
    );
    record.insert(FIELD_INSUMO_NORM.to_string(), insumo.unwrap_or(Value::Null));
    (record, pass)
}

/// Normalize every object of `records`; non-object entries are copied as-is.
pub fn normalize_records(normalizer: &Normalizer, records: Vec<Value>) -> (Vec<Value>, EtlSummary) {
    let mut summary = EtlSummary::default();
    let out = records
        .into_iter()
        .map(|value| match value {
            Value::Object(record) => {
                let (record, pass) = normalize_record(normalizer, record);
                let sigla = record.get(FIELD_SIGLA_NORM).is_some_and(|v| !v.is_null());
                summary.record(sigla, pass);
                metrics::record_insumo_pass(pass);
                Value::Object(record)
            }
            other => other,
        })
        .collect();
    (out, summary)
}

/// Read a JSON array from `input`, normalize it and write it pretty-printed
/// to `output`.
pub fn run(normalizer: &Normalizer, input: &Path, output: &Path) -> Result<EtlSummary> {
    let content = fs::read_to_string(input)?;
    let Value::Array(records) = serde_json::from_str::<Value>(&content)? else {
        return Err(ServiceError::Configuration(format!(
            "input '{}' must contain a JSON array of records",
            input.display()
        )));
    };

    let (normalized, summary) = normalize_records(normalizer, records);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, serde_json::to_string_pretty(&normalized)?)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        total = summary.total,
        sigla_normalized = summary.sigla_normalized,
        by_pass = ?summary.insumo_by_pass,
        "Normalization finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{RuleSpec, RuleStore};
    use serde_json::json;
    use tempfile::tempdir;

    fn normalizer() -> Normalizer {
        let specs = vec![RuleSpec {
            pattern: "^FEBRE AMARELA".to_string(),
            label: "Febre Amarela".to_string(),
            priority: 10,
        }];
        Normalizer::new(RuleStore::from_rules(specs).unwrap())
    }

    #[test]
    fn test_normalize_record_adds_derived_fields() {
        let record = json!({"TX_SIGLA": "SES-MG", "TX_INSUMO": "FEBRE AMARELA ATENUADA", "QTDE": 3});
        let Value::Object(record) = record else { unreachable!() };
        let (out, pass) = normalize_record(&normalizer(), record);
        assert_eq!(out["tx_sigla_norm"], json!("MG"));
        assert_eq!(out["tx_insumo_norm"], json!("Febre Amarela"));
        assert_eq!(out["QTDE"], json!(3));
        assert_eq!(pass, Some(MatchPass::Direct));
    }

    #[test]
    fn test_lowercase_fields_and_nulls() {
        let record = json!({"tx_sigla": "", "tx_insumo": "SERINGA"});
        let Value::Object(record) = record else { unreachable!() };
        let (out, pass) = normalize_record(&normalizer(), record);
        assert_eq!(out["tx_sigla_norm"], Value::Null);
        assert_eq!(out["tx_insumo_norm"], Value::Null);
        assert_eq!(pass, None);
    }

    #[test]
    fn test_empty_upper_case_field_uses_lower_case_one() {
        let record = json!({"TX_SIGLA": "", "tx_sigla": "SES-PR", "TX_INSUMO": ""});
        let Value::Object(record) = record else { unreachable!() };
        let (out, _) = normalize_record(&normalizer(), record);
        assert_eq!(out["tx_sigla_norm"], json!("PR"));
        assert_eq!(out["tx_insumo_norm"], Value::Null);
    }

    #[test]
    fn test_run_writes_output_and_summary() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.json");
        let output = dir.path().join("out/normalized.json");
        fs::write(
            &input,
            r#"[
                {"TX_SIGLA": "SES-PR", "TX_INSUMO": "DILUENTE PARA VACINA CONTRA FEBRE AMARELA"},
                {"TX_SIGLA": "SES SP", "TX_INSUMO": "COVID-19 PFIZER"},
                {"TX_SIGLA": null, "TX_INSUMO": "SERINGA"}
            ]"#,
        )
        .unwrap();

        let summary = run(&normalizer(), &input, &output).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.sigla_normalized, 2);
        assert_eq!(summary.insumo_by_pass.get("diluent"), Some(&1));
        assert_eq!(summary.insumo_by_pass.get("disease_keyword"), Some(&1));
        assert_eq!(summary.insumo_by_pass.get("unmatched"), Some(&1));

        let written: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written[0]["tx_insumo_norm"], json!("Febre Amarela"));
        assert_eq!(written[1]["tx_insumo_norm"], json!("Covid-19"));
        assert_eq!(written[1]["tx_sigla_norm"], json!("SP"));
    }

    #[test]
    fn test_run_rejects_non_array() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.json");
        fs::write(&input, r#"{"TX_SIGLA": "SES-PR"}"#).unwrap();
        let err = run(&normalizer(), &input, &dir.path().join("out.json")).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }
}
