use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

static VACINA_TAIL: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"VACINA(?:\s*(?:P/|PARA|CONTRA)\s*)?(.*)$")
        .case_insensitive(true)
        .build()
        .expect("diluent capture pattern is valid")
});

static DILUENT_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\-(),\d]").expect("diluent noise pattern is valid"));

static COVID_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"SARS[- ]?COV2|COVID[- ]?19")
        .case_insensitive(true)
        .build()
        .expect("covid keyword pattern is valid")
});

const DILUENT_MARKER: &str = "DILUENTE";

/// Vaccine name carried by a diluent entry, e.g. `"FEBRE AMARELA"` for
/// `"DILUENTE PARA VACINA CONTRA FEBRE AMARELA"`.
///
/// Returns `None` when the text is not a diluent entry or nothing usable is
/// left after cleaning. When `VACINA` or `DILUENTE` appear more than once
/// the first occurrence is used.
pub fn diluent_candidate(raw: &str) -> Option<String> {
    let upper = raw.to_uppercase();
    if !upper.contains(DILUENT_MARKER) {
        return None;
    }

    let candidate = match VACINA_TAIL.captures(&upper) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
        None => upper
            .split_once(DILUENT_MARKER)
            .map_or("", |(_, rest)| rest)
            .trim()
            .to_string(),
    };

    let cleaned = DILUENT_NOISE.replace_all(&candidate, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// True when the text names SARS-CoV-2 or COVID-19 in any of the usual
/// spellings (`SARS-COV2`, `SARS COV2`, `SARSCOV2`, `COVID-19`, ...).
pub fn mentions_covid(raw: &str) -> bool {
    COVID_KEYWORD.is_match(raw)
}
