//! Annotation types for negation cue/scope detection.
//!
//! Offsets everywhere in this module are **0-based character offsets**,
//! end-exclusive, into the apostrophe-normalized sentence. Byte offsets never
//! cross a crate boundary: whatever a regex engine reports internally is
//! converted before it lands in one of these records.
//!
//! # Type Hierarchy
//!
//! ```text
//! Sentence
//! ├── Token   (lexical unit with offsets; punctuation stands alone)
//! ├── Cue     (a detected negation marker: rule id + group + particle label)
//! └── Scope   (the span a cue negates, or a support/exception span)
//! ```

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

// ============================================================================
// Group
// ============================================================================

/// Semantic family of a negation construction.
///
/// Groups drive both rule bucketing and scope-strategy routing: every marker
/// rule belongs to exactly one group, and each group owns an ordered list of
/// scope strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Group {
    /// Two-part constructions whose opener and closer may be separated by
    /// intervening words ("ne ... pas").
    #[serde(rename = "bipartite")]
    Bipartite,
    /// Negative determiners ("aucun", "pas de").
    #[serde(rename = "determinant")]
    Determinant,
    /// Negative prepositions ("sans", "malgré").
    #[serde(rename = "preposition")]
    Preposition,
    /// Negative coordination ("ni ... ni ...").
    #[serde(rename = "conjonction")]
    Conjunction,
    /// Fixed multi-word locutions.
    #[serde(rename = "locution")]
    Locution,
    /// Lexically negative words ("inefficace", "absence").
    #[serde(rename = "lexical")]
    Lexical,
    /// Adversative connectives ("mais").
    #[serde(rename = "adversative")]
    Adversative,
    /// Everything else.
    #[serde(rename = "autres_marqueurs")]
    Other,
}

impl Group {
    /// Canonical name, as it appears in rule files and output records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Group::Bipartite => "bipartite",
            Group::Determinant => "determinant",
            Group::Preposition => "preposition",
            Group::Conjunction => "conjonction",
            Group::Locution => "locution",
            Group::Lexical => "lexical",
            Group::Adversative => "adversative",
            Group::Other => "autres_marqueurs",
        }
    }

    /// Parse a canonical group name. Returns `None` for unknown names.
    #[must_use]
    pub fn parse(name: &str) -> Option<Group> {
        match name {
            "bipartite" => Some(Group::Bipartite),
            "determinant" => Some(Group::Determinant),
            "preposition" => Some(Group::Preposition),
            "conjonction" => Some(Group::Conjunction),
            "locution" => Some(Group::Locution),
            "lexical" => Some(Group::Lexical),
            "adversative" => Some(Group::Adversative),
            "autres_marqueurs" => Some(Group::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Spans and tokens
// ============================================================================

/// A half-open character interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharSpan {
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

impl CharSpan {
    /// Create a span. `start` must not exceed `end`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of characters covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// True when the span covers nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A minimal lexical unit with character offsets into its sentence.
///
/// Tokens are produced once per sentence and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token surface text.
    pub text: String,
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

impl Token {
    /// Create a token.
    #[must_use]
    pub fn new(text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

// ============================================================================
// Cue
// ============================================================================

/// A detected negation-marker occurrence.
///
/// `label` is the *normalized* particle text, not necessarily the literal
/// regex match: verbs interposed between bipartite particles are stripped
/// when the owning rule requests it, so `label` may be shorter than the
/// covered span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    /// Id of the rule that produced this cue.
    #[serde(rename = "id")]
    pub rule_id: String,
    /// Normalized marker text.
    #[serde(rename = "cue_label")]
    pub label: String,
    /// Start offset (inclusive). Always `< end`.
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
    /// Semantic group of the owning rule.
    pub group: Group,
}

impl Cue {
    /// Create a cue.
    #[must_use]
    pub fn new(
        rule_id: impl Into<String>,
        group: Group,
        label: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            label: label.into(),
            start,
            end,
            group,
        }
    }

    /// The `(rule id, start, end)` identity used for cross-detector dedup.
    #[must_use]
    pub fn key(&self) -> (&str, usize, usize) {
        (&self.rule_id, self.start, self.end)
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Role of a scope relative to the negation it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ScopeRole {
    /// Grammatical subject of the negated assertion.
    #[serde(rename = "subject")]
    Subject,
    /// The negated predicate or noun phrase.
    #[serde(rename = "core")]
    Core,
    /// Source/authority span ("selon ...", headings before a colon).
    #[serde(rename = "support")]
    Support,
    /// Exclusion span ("sauf ...", "à l'exception de ...").
    #[serde(rename = "exception")]
    Exception,
}

/// The span a cue is judged to negate, or an auxiliary support span.
///
/// A scope with `span: None` records that a strategy ran for a cue but found
/// no usable window; it serializes with `start`/`end` of `-1` so consumers
/// can still see the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Id of the strategy that produced this scope.
    pub strategy_id: String,
    /// Exact text covered by `span` (empty when `span` is `None`).
    pub text: String,
    /// Covered interval, when one was found.
    pub span: Option<CharSpan>,
    /// Optional role tag.
    pub role: Option<ScopeRole>,
}

impl Scope {
    /// Create a scope over a resolved interval.
    #[must_use]
    pub fn new(strategy_id: impl Into<String>, text: impl Into<String>, span: CharSpan) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            text: text.into(),
            span: Some(span),
            role: None,
        }
    }

    /// Create a support-role scope.
    #[must_use]
    pub fn support(
        strategy_id: impl Into<String>,
        text: impl Into<String>,
        span: CharSpan,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            text: text.into(),
            span: Some(span),
            role: Some(ScopeRole::Support),
        }
    }

    /// Create an unresolved scope (no usable window).
    #[must_use]
    pub fn unresolved(strategy_id: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            text: String::new(),
            span: None,
            role: None,
        }
    }

    /// Attach a role.
    #[must_use]
    pub fn with_role(mut self, role: ScopeRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Identity key used for deduplication, with `-1` standing in for a
    /// missing span.
    #[must_use]
    pub fn dedup_key(&self) -> (&str, i64, i64, Option<ScopeRole>) {
        let (start, end) = match self.span {
            Some(s) => (s.start as i64, s.end as i64),
            None => (-1, -1),
        };
        (&self.strategy_id, start, end, self.role)
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = if self.role.is_some() { 5 } else { 4 };
        let mut st = serializer.serialize_struct("Scope", fields)?;
        st.serialize_field("id", &self.strategy_id)?;
        st.serialize_field("scope", &self.text)?;
        let (start, end) = match self.span {
            Some(s) => (s.start as i64, s.end as i64),
            None => (-1, -1),
        };
        st.serialize_field("start", &start)?;
        st.serialize_field("end", &end)?;
        if let Some(role) = &self.role {
            st.serialize_field("role", role)?;
        }
        st.end()
    }
}

// ============================================================================
// Per-sentence output record
// ============================================================================

/// One fully annotated sentence: the core's final artifact.
#[derive(Debug, Clone, Serialize)]
pub struct SentenceAnnotation {
    /// 1-based sentence id within the run.
    pub id: u64,
    /// The original sentence text.
    pub text: String,
    /// Detected negation markers.
    pub cues: Vec<Cue>,
    /// Resolved scopes.
    pub scopes: Vec<Scope>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_round_trip() {
        for g in [
            Group::Bipartite,
            Group::Determinant,
            Group::Preposition,
            Group::Conjunction,
            Group::Locution,
            Group::Lexical,
            Group::Adversative,
            Group::Other,
        ] {
            assert_eq!(Group::parse(g.as_str()), Some(g));
        }
        assert_eq!(Group::parse("nonsense"), None);
    }

    #[test]
    fn cue_serializes_with_wire_names() {
        let cue = Cue::new("NE_PAS", Group::Bipartite, "ne pas", 3, 10);
        let json = serde_json::to_value(&cue).unwrap();
        assert_eq!(json["id"], "NE_PAS");
        assert_eq!(json["cue_label"], "ne pas");
        assert_eq!(json["group"], "bipartite");
        assert_eq!(json["start"], 3);
        assert_eq!(json["end"], 10);
    }

    #[test]
    fn scope_serializes_missing_span_as_minus_one() {
        let scope = Scope::unresolved("BIP_G_CORE");
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["start"], -1);
        assert_eq!(json["end"], -1);
        assert_eq!(json["scope"], "");
        assert!(json.get("role").is_none());
    }

    #[test]
    fn scope_serializes_role_when_present() {
        let scope = Scope::support("GOV", "selon le protocole", CharSpan::new(4, 22));
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["role"], "support");
        assert_eq!(json["start"], 4);
        assert_eq!(json["end"], 22);
    }

    #[test]
    fn dedup_key_distinguishes_roles() {
        let a = Scope::new("S", "x", CharSpan::new(0, 1));
        let b = a.clone().with_role(ScopeRole::Support);
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
