use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::DEFAULT_RULE_PRIORITY;
use crate::error::{Result, ServiceError};

/// A rule record as written in the mappings resource.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleSpec {
    pub pattern: String,
    #[serde(alias = "vacina_normalizada")]
    pub label: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    DEFAULT_RULE_PRIORITY
}

/// TOML layout: a list of `[[rule]]` tables.
#[derive(Debug, Deserialize)]
struct TomlRules {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleSpec>,
}

/// How a rule's pattern is tested. Decided once, when the rule is loaded.
#[derive(Debug, Clone)]
pub enum RulePattern {
    Regex(Regex),
    /// The pattern did not compile as a regex; match it as a
    /// case-insensitive substring instead. Holds the lowercased pattern.
    Literal(String),
}

impl RulePattern {
    pub fn compile(pattern: &str) -> Self {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => RulePattern::Regex(re),
            Err(e) => {
                warn!(
                    pattern = %pattern,
                    error = %e,
                    "Rule pattern is not a valid regex, matching it as a literal substring"
                );
                RulePattern::Literal(pattern.to_lowercase())
            }
        }
    }

    /// Blank text never matches, whatever the pattern.
    pub fn is_match(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        match self {
            RulePattern::Regex(re) => re.is_match(text),
            RulePattern::Literal(needle) => text.to_lowercase().contains(needle.as_str()),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, RulePattern::Literal(_))
    }
}

#[derive(Debug, Clone)]
pub struct NormalizationRule {
    pub pattern: String,
    pub label: String,
    pub priority: i64,
    matcher: RulePattern,
}

impl NormalizationRule {
    pub fn new(spec: RuleSpec) -> Self {
        let matcher = RulePattern::compile(&spec.pattern);
        Self {
            pattern: spec.pattern,
            label: spec.label,
            priority: spec.priority,
            matcher,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    pub fn matcher(&self) -> &RulePattern {
        &self.matcher
    }
}

/// The ordered, immutable rule list shared by every normalization call.
#[derive(Debug, Clone)]
pub struct RuleStore {
    rules: Vec<NormalizationRule>,
}

impl RuleStore {
    /// Load rules from a JSON array or, for `*.toml` files, `[[rule]]` tables.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ServiceError::Configuration(format!(
                "Failed to read rule file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let store = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
        .map_err(|e| match e {
            ServiceError::Configuration(msg) => {
                ServiceError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        info!(
            path = %path.display(),
            rules = store.len(),
            "Loaded normalization rules"
        );
        Ok(store)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let specs: Vec<RuleSpec> = serde_json::from_str(content).map_err(|e| {
            ServiceError::Configuration(format!("malformed rule list: {}", e))
        })?;
        Self::from_rules(specs)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let parsed: TomlRules = toml::from_str(content).map_err(|e| {
            ServiceError::Configuration(format!("malformed rule list: {}", e))
        })?;
        Self::from_rules(parsed.rules)
    }

    /// Build a store from in-memory records, sorted by priority. The sort is
    /// stable, so equal priorities keep their declaration order.
    pub fn from_rules(specs: Vec<RuleSpec>) -> Result<Self> {
        for (index, spec) in specs.iter().enumerate() {
            if spec.pattern.trim().is_empty() {
                return Err(ServiceError::Configuration(format!(
                    "rule #{} has an empty pattern",
                    index
                )));
            }
            if spec.label.trim().is_empty() {
                return Err(ServiceError::Configuration(format!(
                    "rule #{} ('{}') has an empty label",
                    index, spec.pattern
                )));
            }
        }

        let mut rules: Vec<NormalizationRule> =
            specs.into_iter().map(NormalizationRule::new).collect();
        rules.sort_by_key(|rule| rule.priority);
        Ok(Self { rules })
    }

    /// A store with no rules: every product text is left unclassified by the
    /// rule-based passes. Callers opt into this explicitly.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[NormalizationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule, in priority order, whose pattern matches `text`.
    pub fn find_match(&self, text: &str) -> Option<&NormalizationRule> {
        self.rules.iter().find(|rule| rule.matches(text))
    }

    /// Every distinct canonical label, sorted.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.rules.iter().map(|r| r.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    /// Pattern of the first rule whose label equals `label`, ignoring case.
    pub fn pattern_for_label(&self, label: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.label.to_lowercase() == label.to_lowercase())
            .map(|rule| rule.pattern.as_str())
    }

    pub fn first_pattern_matching(&self, text: &str) -> Option<&str> {
        self.find_match(text).map(|rule| rule.pattern.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(pattern: &str, label: &str, priority: i64) -> RuleSpec {
        RuleSpec {
            pattern: pattern.to_string(),
            label: label.to_string(),
            priority,
        }
    }

    #[test]
    fn test_sort_is_stable_by_priority() {
        let store = RuleStore::from_rules(vec![
            spec("a", "A", 50),
            spec("b", "B", 10),
            spec("c", "C", 100),
            spec("d", "D", 10),
        ])
        .unwrap();

        let order: Vec<(&str, i64)> = store
            .rules()
            .iter()
            .map(|r| (r.label.as_str(), r.priority))
            .collect();
        assert_eq!(order, vec![("B", 10), ("D", 10), ("A", 50), ("C", 100)]);
    }

    #[test]
    fn test_missing_priority_defaults_to_100() {
        let store = RuleStore::from_json_str(
            r#"[{"pattern": "x", "label": "X"}, {"pattern": "y", "label": "Y", "priority": 101}]"#,
        )
        .unwrap();
        assert_eq!(store.rules()[0].priority, 100);
        assert_eq!(store.rules()[1].label, "Y");
    }

    #[test]
    fn test_accepts_original_label_field_name() {
        let store =
            RuleStore::from_json_str(r#"[{"pattern": "BCG", "vacina_normalizada": "BCG"}]"#)
                .unwrap();
        assert_eq!(store.rules()[0].label, "BCG");
    }

    #[test]
    fn test_malformed_json_is_a_configuration_error() {
        let err = RuleStore::from_json_str(r#"{"pattern": "x"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));

        let err = RuleStore::from_json_str(r#"[{"pattern": "x"}]"#).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_empty_pattern_is_rejected() {
        let err = RuleStore::from_rules(vec![spec("  ", "X", 1)]).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_missing_file_is_a_configuration_error() {
        let err = RuleStore::load("does/not/exist.json").unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_toml_rules() {
        let store = RuleStore::from_toml_str(
            r#"
[[rule]]
pattern = "HEPATITE B"
label = "Hepatite B"
priority = 20

[[rule]]
pattern = "BCG"
label = "BCG"
priority = 5
"#,
        )
        .unwrap();
        assert_eq!(store.labels(), vec!["BCG", "Hepatite B"]);
        assert_eq!(store.rules()[0].label, "BCG");
    }

    #[test]
    fn test_invalid_regex_becomes_literal() {
        let rule = NormalizationRule::new(spec("TRIPLICE (DTP", "DTP", 1));
        assert!(rule.matcher().is_literal());
        assert!(rule.matches("vacina triplice (dtp) infantil"));
        assert!(!rule.matches("vacina triplice dtp"));
    }

    #[test]
    fn test_blank_text_never_matches() {
        let rule = NormalizationRule::new(spec(".*", "Any", 1));
        assert!(!rule.matches(""));
        assert!(!rule.matches("   "));
        assert!(rule.matches("x"));
    }

    #[test]
    fn test_labels_and_pattern_lookup() {
        let store = RuleStore::from_rules(vec![
            spec("FEBRE AMARELA", "Febre Amarela", 10),
            spec("VARICELA", "Varicela", 20),
            spec("AMARIL", "Febre Amarela", 30),
        ])
        .unwrap();

        assert_eq!(store.labels(), vec!["Febre Amarela", "Varicela"]);
        assert_eq!(store.pattern_for_label("febre amarela"), Some("FEBRE AMARELA"));
        assert_eq!(store.pattern_for_label("Sarampo"), None);
        assert_eq!(store.first_pattern_matching("vacina amarilica"), Some("AMARIL"));
    }
}
