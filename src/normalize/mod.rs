//! Text normalization for the two noisy columns of the distribution table.
//!
//! `TX_SIGLA` values are reduced to a two-letter UF code by
//! [`normalize_sigla`]. `TX_INSUMO` values are classified into a canonical
//! vaccine label by [`Normalizer::normalize_insumo`], which tries an ordered
//! list of passes and stops at the first one that produces a label.

pub mod insumo;
pub mod rules;
pub mod sigla;

pub use rules::{NormalizationRule, RulePattern, RuleSpec, RuleStore};
pub use sigla::normalize_sigla;

use crate::constants::COVID_LABEL;

/// The pass of the insumo pipeline that produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    /// A rule matched the raw text.
    Direct,
    /// A rule matched the vaccine name extracted from a diluent entry.
    Diluent,
    /// The text names SARS-CoV-2 / COVID-19.
    DiseaseKeyword,
}

impl MatchPass {
    /// Evaluation order of the pipeline.
    pub const ORDER: [MatchPass; 3] = [
        MatchPass::Direct,
        MatchPass::Diluent,
        MatchPass::DiseaseKeyword,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchPass::Direct => "direct",
            MatchPass::Diluent => "diluent",
            MatchPass::DiseaseKeyword => "disease_keyword",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    pub label: &'a str,
    pub pass: MatchPass,
}

/// Region and product normalizer. Built once at startup and shared
/// read-only; every method is a pure function of its input and the rules.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: RuleStore,
}

impl Normalizer {
    pub fn new(rules: RuleStore) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn normalize_sigla(&self, raw: Option<&str>) -> Option<String> {
        normalize_sigla(raw)
    }

    /// Canonical label for a raw product/manufacturer string, or `None`
    /// when the text is absent or cannot be classified.
    pub fn normalize_insumo(&self, raw: Option<&str>) -> Option<&str> {
        self.classify_insumo(raw).map(|c| c.label)
    }

    /// Like [`normalize_insumo`](Self::normalize_insumo), also reporting
    /// which pass produced the label.
    pub fn classify_insumo(&self, raw: Option<&str>) -> Option<Classification<'_>> {
        let raw = raw.filter(|text| !text.is_empty())?;
        MatchPass::ORDER.iter().find_map(|&pass| {
            self.attempt(pass, raw)
                .map(|label| Classification { label, pass })
        })
    }

    fn attempt(&self, pass: MatchPass, raw: &str) -> Option<&str> {
        match pass {
            MatchPass::Direct => self.match_rules(raw),
            MatchPass::Diluent => {
                let candidate = insumo::diluent_candidate(raw)?;
                self.match_rules(&candidate)
            }
            MatchPass::DiseaseKeyword => insumo::mentions_covid(raw).then_some(COVID_LABEL),
        }
    }

    fn match_rules(&self, text: &str) -> Option<&str> {
        self.rules.find_match(text).map(|rule| rule.label.as_str())
    }
}
