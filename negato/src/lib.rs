//! # negato
//!
//! Rule-based negation cue and scope detection for French clinical text.
//!
//! - **Cues**: declarative marker rules (YAML) find negation markers —
//!   bipartite "ne ... pas" pairs, negative determiners, prepositions,
//!   coordinations — with guard suppression and particles-only labels.
//! - **Scopes**: per-group strategies expand cues into the text spans they
//!   negate, then a resolver trims appositive tails and deduplicates.
//!
//! No part-of-speech tagging, no parsing, no statistics: every decision is
//! a pattern rule a user can edit. Offsets in every emitted record are
//! 0-based character offsets, end-exclusive.
//!
//! Core types (`Cue`, `Scope`, `Token`, etc.) live in `negato-core` and are
//! re-exported here.
//!
//! # Example
//!
//! ```rust
//! use negato::rules::{parse_rule_file, RuleIndex};
//! use negato::strategies::StrategyRegistry;
//! use negato::Annotator;
//!
//! let rules = parse_rule_file(
//!     "bipartites.yaml",
//!     "- id: NE_PAS\n  when_pattern: \"(?:\\\\bne\\\\b|n')\\\\s*\\\\w+\\\\s*\\\\bpas\\\\b\"\n",
//! );
//! let annotator = Annotator::new(
//!     RuleIndex::from_rules(rules),
//!     StrategyRegistry::default(),
//! );
//! let ann = annotator.annotate("Le patient ne mange pas.", 1);
//! assert_eq!(ann.cues[0].label, "ne pas");
//! ```

#![warn(missing_docs)]

pub mod annotate;
pub mod bipartite;
pub mod matcher;
pub mod qc;
pub mod rules;
pub mod strategies;
pub mod text;
pub mod tokenize;

// Re-export core types for downstream convenience
pub use negato_core::{CharSpan, Cue, Error, Group, Result, Scope, ScopeRole, SentenceAnnotation, Token};

pub use annotate::Annotator;
pub use matcher::SentenceContext;
pub use text::SentenceText;
