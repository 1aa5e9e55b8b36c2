//! The per-sentence annotation pipeline.
//!
//! Each sentence runs through the same fixed sequence: tokenize, apply every
//! marker rule group by group, give gap-declaring bipartite rules a
//! cross-token pass, inject the fixed surface markers, then let the strategy
//! registry expand cues into scopes and the resolver clean them up.
//!
//! The rule index and registry are built once per run and shared read-only;
//! everything mutable lives in the per-sentence [`SentenceContext`], so
//! annotating a fixed sentence against a fixed index is fully reproducible.

use std::path::Path;

use log::{debug, info};
use negato_core::{Cue, SentenceAnnotation};

use crate::bipartite::detect_cross_tokens;
use crate::matcher::{apply_rule, inject_surface_markers, SentenceContext};
use crate::qc::finalize;
use crate::rules::{load_markers, RuleIndex};
use crate::strategies::{load_registry, StrategyRegistry};
use crate::text::SentenceText;
use crate::tokenize::tokenize;

/// A ready-to-run annotator: compiled rules plus the strategy registry.
#[derive(Debug)]
pub struct Annotator {
    rules: RuleIndex,
    registry: StrategyRegistry,
}

impl Annotator {
    /// Build an annotator from already-compiled parts.
    #[must_use]
    pub fn new(rules: RuleIndex, registry: StrategyRegistry) -> Self {
        Self { rules, registry }
    }

    /// Load rules and strategies from a rules directory.
    ///
    /// Missing or unreadable pieces degrade to empty indexes with a warning;
    /// this constructor never fails.
    #[must_use]
    pub fn from_rules_dir(rules_dir: &Path) -> Self {
        let rules = load_markers(rules_dir);
        let registry = load_registry(rules_dir);
        info!(
            "loaded {} marker rules ({} deferred) and {} scope strategies",
            rules.len(),
            rules.deferred().len(),
            registry.len()
        );
        Self { rules, registry }
    }

    /// The compiled rule index.
    #[must_use]
    pub fn rules(&self) -> &RuleIndex {
        &self.rules
    }

    /// Annotate one sentence.
    #[must_use]
    pub fn annotate(&self, text: &str, id: u64) -> SentenceAnnotation {
        let sent = SentenceText::new(text);
        let tokens = tokenize(sent.normalized());
        let mut ctx = SentenceContext::default();
        let mut cues: Vec<Cue> = Vec::new();

        for (_, rules) in self.rules.iter() {
            for rule in rules {
                cues.extend(apply_rule(rule, &sent, &mut ctx));
                if rule.wants_cross_token() {
                    for cue in detect_cross_tokens(&sent, &tokens, &cues, rule) {
                        if ctx.try_claim(cue.start) {
                            cues.push(cue);
                        }
                    }
                }
            }
        }
        cues.extend(inject_surface_markers(&sent, &mut ctx));
        debug!("sentence {}: {} cues", id, cues.len());

        let scopes = self.registry.execute_for_sentence(&sent, &tokens, &cues);
        let scopes = finalize(scopes, &sent);

        SentenceAnnotation {
            id,
            text: text.to_string(),
            cues,
            scopes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{parse_rule_file, RuleIndex};
    use crate::strategies::{parse_strategy_file, StrategyRegistry};
    use negato_core::Group;

    fn annotator() -> Annotator {
        let mut rules = parse_rule_file(
            "bipartites.yaml",
            "- id: NE_BIPARTITE_EXTENDED\n  when_pattern: \"(?:\\\\bne\\\\b|n')\\\\s*\\\\w+\\\\s*\\\\b(?:pas|plus|jamais)\\\\b\"\n  options:\n    max_token_gap: 8\n",
        );
        rules.extend(parse_rule_file(
            "determinant.yaml",
            "- id: DET_AUCUN\n  when_pattern: \"\\\\b(?P<det>aucune?)\\\\b\"\n  cue_label:\n    - \"{det}\"\n  options:\n    case_insensitive: true\n",
        ));
        let strategies = [
            parse_strategy_file(
                "bipartites.yaml",
                "- id: BIP_G_CORE\n  scope_strategy: NEP_SMART\n",
            ),
            parse_strategy_file(
                "determinant.yaml",
                "- id: DET_G_CORE\n  scope_strategy: DET_NEG_GN_SMART\n",
            ),
        ]
        .into_iter()
        .flatten()
        .collect();
        Annotator::new(
            RuleIndex::from_rules(rules),
            StrategyRegistry::from_load_order(strategies),
        )
    }

    #[test]
    fn cues_and_scopes_for_a_clinical_sentence() {
        let ann = annotator().annotate("Les patients n'ont pas présenté de complication.", 1);
        assert_eq!(ann.cues.len(), 1);
        assert_eq!(ann.cues[0].label, "n' pas");
        assert_eq!(ann.cues[0].group, Group::Bipartite);
        assert_eq!(ann.scopes.len(), 1);
        assert_eq!(ann.scopes[0].text, "présenté de complication");
    }

    #[test]
    fn no_two_cues_share_a_start() {
        let ann = annotator().annotate(
            "Aucune anomalie n'a été retrouvée, aucune rechute ne s'est produite jamais.",
            1,
        );
        let mut starts: Vec<usize> = ann.cues.iter().map(|c| c.start).collect();
        let before = starts.len();
        starts.sort_unstable();
        starts.dedup();
        assert_eq!(before, starts.len(), "duplicate cue starts in {:?}", ann.cues);
    }

    #[test]
    fn empty_rule_index_annotates_to_nothing() {
        let annotator = Annotator::new(RuleIndex::default(), StrategyRegistry::default());
        let ann = annotator.annotate("Le patient ne présente pas de fièvre.", 7);
        assert!(ann.cues.is_empty());
        assert!(ann.scopes.is_empty());
        assert_eq!(ann.id, 7);
    }

    #[test]
    fn original_text_is_preserved_verbatim() {
        let text = "Le bilan n\u{2019}a rien montré.";
        let ann = annotator().annotate(text, 3);
        assert_eq!(ann.text, text);
    }
}
