//! Scope strategies: expanding cues into the spans they negate.
//!
//! Each semantic group owns an ordered list of named strategies, routed by a
//! registry. Strategies are small recipes over a shared vocabulary: rightward
//! token windows, sentence-level deny guards, splitting at coordinators, and
//! one cross-group join that reconciles two detectors' views of the same
//! negation.
//!
//! Execution is per sentence and per group, in registry order. A deny guard
//! or an explicit skip strategy silences the whole group for that sentence.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::{debug, warn};
use negato_core::{CharSpan, Cue, Group, Scope, ScopeRole, Token};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::qc::overlap_fraction;
use crate::rules::{compile_pattern, infer_group_from_filename, list_yaml_files};
use crate::text::SentenceText;
use crate::tokenize::{
    is_punct_char, leading_de_offset, window_right, DEFAULT_STOP_LEXEMES, DEFAULT_STOP_PUNCT,
};

/// Two scopes merge when intersection over union reaches this fraction.
///
/// Deliberately loose: the windowing detectors may disagree by a token or
/// two on exact boundaries and must still be recognized as the same span.
pub const COOCCURRENCE_OVERLAP_THRESHOLD: f64 = 0.5;

const DEFAULT_CORE_TOKEN_GAP: usize = 8;
const DEFAULT_PREP_WINDOW_TOKENS: usize = 10;

// ============================================================================
// Strategy kinds
// ============================================================================

/// The closed set of scope-construction recipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StrategyKind {
    /// Silence the group when a surface pattern matches the sentence.
    SkipIfPattern,
    /// Silence the group when a lexicalized expression is present.
    SkipIfLexicalized,
    /// Rightward window from each bipartite cue.
    BipartiteCore,
    /// Rightward window from each determiner cue, leading article stripped.
    DeterminantCore,
    /// Rightward window from each preposition cue.
    PrepositionCore,
    /// Split coordinated conjuncts after each "ni".
    ConjunctionSplit,
    /// Merge overlapping bipartite and determinant scopes into one envelope.
    ResolveCooccurrence,
    /// Cue-independent scan for attribution/evidentiality support spans.
    GovernorSupportAuto,
    /// Generic fallback: every match of `when_pattern` becomes a scope.
    PatternFallback,
}

fn resolve_kind(
    declared: Option<&str>,
    id: &str,
    group: Group,
    has_pattern: bool,
) -> Option<StrategyKind> {
    match declared {
        Some("SKIP_IF_PATTERN") => return Some(StrategyKind::SkipIfPattern),
        Some("SKIP_IF_LEXICALIZED") => return Some(StrategyKind::SkipIfLexicalized),
        Some("NEP_SMART") => return Some(StrategyKind::BipartiteCore),
        Some("DET_NEG_GN_SMART") => return Some(StrategyKind::DeterminantCore),
        Some("PREP_SANS_CORE" | "PREP_MALGRÉ_CORE" | "PREP_GENERIC_CORE") => {
            return Some(StrategyKind::PrepositionCore)
        }
        Some("NI_COORD_SMART" | "NI_SIMPLE_SPLIT") => return Some(StrategyKind::ConjunctionSplit),
        Some("RESOLVE_COOCURRENCE") => return Some(StrategyKind::ResolveCooccurrence),
        Some("GOVERNOR_SUPPORT_AUTO") => return Some(StrategyKind::GovernorSupportAuto),
        _ => {}
    }
    if id.ends_with("COOC_DET_RESOLVE") {
        return Some(StrategyKind::ResolveCooccurrence);
    }
    if id.ends_with("_CORE") {
        match group {
            Group::Bipartite => return Some(StrategyKind::BipartiteCore),
            Group::Determinant => return Some(StrategyKind::DeterminantCore),
            Group::Preposition => return Some(StrategyKind::PrepositionCore),
            Group::Conjunction => return Some(StrategyKind::ConjunctionSplit),
            _ => {}
        }
    }
    if has_pattern {
        return Some(StrategyKind::PatternFallback);
    }
    None
}

// ============================================================================
// Raw records and options
// ============================================================================

/// A strategy record as it appears in a scope file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStrategy {
    /// Strategy id (doubles as the scope id in output records).
    pub id: Option<String>,
    /// Declared strategy kind.
    pub scope_strategy: Option<String>,
    /// Explicit group binding; wins over the filename heuristic.
    #[serde(alias = "when_group")]
    pub group: Option<String>,
    /// Free-form options map, validated into [`StrategyOptions`].
    #[serde(default)]
    pub options: BTreeMap<String, serde_yaml::Value>,
    /// Guards block.
    pub guards: Option<RawStrategyGuards>,
    /// Fallback pattern for [`StrategyKind::PatternFallback`].
    pub when_pattern: Option<String>,
}

/// The `guards:` block of a strategy record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStrategyGuards {
    /// Patterns that silence the group when they match the sentence.
    #[serde(default)]
    pub deny_if_surface: Vec<SurfaceGuardSpec>,
}

/// A deny-if-surface guard: bare pattern or record with options.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SurfaceGuardSpec {
    /// Bare pattern, compiled case-sensitively.
    Pattern(String),
    /// Record form with per-guard options.
    Record {
        /// The guard pattern.
        pattern: String,
        /// Only `case_insensitive` is recognized.
        #[serde(default)]
        options: BTreeMap<String, serde_yaml::Value>,
    },
}

/// Recognized strategy options. Unknown keys warn at load time.
#[derive(Debug, Clone, Default)]
pub struct StrategyOptions {
    /// Window budget for core strategies.
    pub max_token_gap: Option<usize>,
    /// Window budget for preposition cores.
    pub right_window_tokens: Option<usize>,
    /// Stop punctuation override.
    pub stop_punct: Option<Vec<String>>,
    /// Stop lexeme override.
    pub stop_lexemes: Option<Vec<String>>,
    /// Strip a leading partitive article from determinant windows.
    pub strip_de: bool,
    /// Surface pattern for [`StrategyKind::SkipIfPattern`].
    pub pattern: Option<String>,
    /// Expressions for [`StrategyKind::SkipIfLexicalized`].
    pub lexicalized_patterns: Vec<String>,
    /// Case folding for the fallback pattern.
    pub case_insensitive: bool,
    /// Partner group of the cooccurrence resolve.
    pub with_group: Option<String>,
}

impl StrategyOptions {
    fn validate(strategy_id: &str, raw: &BTreeMap<String, serde_yaml::Value>) -> Self {
        use crate::rules::option_values::{as_bool, as_string_list, as_usize};
        let mut opts = StrategyOptions {
            strip_de: true,
            ..StrategyOptions::default()
        };
        for (key, value) in raw {
            match key.as_str() {
                "max_token_gap" => opts.max_token_gap = as_usize(value),
                "right_window_tokens" => opts.right_window_tokens = as_usize(value),
                "stop_punct" => opts.stop_punct = as_string_list(value),
                "stop_lexemes" => opts.stop_lexemes = as_string_list(value),
                "strip_de" => opts.strip_de = as_bool(value),
                "pattern" => opts.pattern = value.as_str().map(str::to_string),
                "lexicalized_patterns" => {
                    opts.lexicalized_patterns = as_string_list(value).unwrap_or_default();
                }
                "case_insensitive" => opts.case_insensitive = as_bool(value),
                "with_group" => opts.with_group = value.as_str().map(str::to_string),
                other => warn!(
                    "strategy {}: unknown option key '{}' ignored",
                    strategy_id, other
                ),
            }
        }
        opts
    }
}

// ============================================================================
// Compiled strategy
// ============================================================================

/// A compiled, immutable scope strategy.
#[derive(Debug)]
pub struct Strategy {
    /// Strategy id.
    pub id: String,
    /// Owning group.
    pub group: Group,
    /// Dispatch kind.
    pub kind: StrategyKind,
    /// Validated options.
    pub options: StrategyOptions,
    /// Compiled deny-if-surface guards.
    pub deny_guards: Vec<Regex>,
    /// Compiled skip pattern ([`StrategyKind::SkipIfPattern`]).
    pub skip_pattern: Option<Regex>,
    /// Compiled lexicalized expressions, word-bounded and case-insensitive.
    pub lexicalized: Vec<Regex>,
    /// Compiled fallback pattern ([`StrategyKind::PatternFallback`]).
    pub pattern: Option<Regex>,
}

/// Compile one raw strategy. Returns `None` when the record must be dropped.
#[must_use]
pub fn compile_strategy(raw: RawStrategy, file_name: &str) -> Option<Strategy> {
    let id = raw.id.unwrap_or_else(|| "UNK_STRATEGY".to_string());
    let group = raw
        .group
        .as_deref()
        .map(|g| {
            Group::parse(g).unwrap_or_else(|| {
                warn!("strategy {}: unknown group '{}'", id, g);
                Group::Other
            })
        })
        .unwrap_or_else(|| infer_group_from_filename(file_name));
    let options = StrategyOptions::validate(&id, &raw.options);
    let kind = match resolve_kind(
        raw.scope_strategy.as_deref(),
        &id,
        group,
        raw.when_pattern.is_some(),
    ) {
        Some(kind) => kind,
        None => {
            warn!(
                "strategy {}: unrecognized kind {:?}, dropped",
                id, raw.scope_strategy
            );
            return None;
        }
    };

    let mut deny_guards = Vec::new();
    for spec in raw
        .guards
        .as_ref()
        .map(|g| g.deny_if_surface.as_slice())
        .unwrap_or_default()
    {
        let (pattern, case_insensitive) = match spec {
            SurfaceGuardSpec::Pattern(p) => (p.as_str(), false),
            SurfaceGuardSpec::Record { pattern, options } => (
                pattern.as_str(),
                options
                    .get("case_insensitive")
                    .is_some_and(crate::rules::option_values::as_bool),
            ),
        };
        match compile_pattern(pattern, case_insensitive, false) {
            Ok(rx) => deny_guards.push(rx),
            Err(e) => warn!("strategy {}: deny guard failed to compile: {}", id, e),
        }
    }

    let skip_pattern = match options.pattern.as_deref() {
        Some(p) => match compile_pattern(p, false, false) {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!("strategy {}: skip pattern failed to compile: {}", id, e);
                None
            }
        },
        None => None,
    };

    let lexicalized = options
        .lexicalized_patterns
        .iter()
        .filter_map(|p| {
            compile_pattern(&format!(r"\b{}\b", regex::escape(p)), true, false)
                .map_err(|e| warn!("strategy {}: lexicalized pattern dropped: {}", id, e))
                .ok()
        })
        .collect();

    let pattern = match raw.when_pattern.as_deref() {
        Some(p) => match compile_pattern(p, options.case_insensitive, false) {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!("strategy {}: when_pattern failed to compile, dropped: {}", id, e);
                return None;
            }
        },
        None => None,
    };

    Some(Strategy {
        id,
        group,
        kind,
        options,
        deny_guards,
        skip_pattern,
        lexicalized,
        pattern,
    })
}

/// Parse and compile one scope file's contents.
#[must_use]
pub fn parse_strategy_file(file_name: &str, contents: &str) -> Vec<Strategy> {
    let raw: Vec<RawStrategy> = match serde_yaml::from_str(contents) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("scope file {}: not a strategy list, skipped: {}", file_name, e);
            return Vec::new();
        }
    };
    raw.into_iter()
        .filter_map(|r| compile_strategy(r, file_name))
        .collect()
}

// ============================================================================
// Execution
// ============================================================================

/// Result of running one strategy.
#[derive(Debug)]
pub enum StrategyOutcome {
    /// The group must produce no scopes for this sentence.
    SkipGroup,
    /// Scopes produced (possibly empty).
    Scopes(Vec<Scope>),
}

/// Scopes accumulated so far, by group; read by cross-group strategies.
pub type ScopesByGroup = HashMap<Group, Vec<Scope>>;

fn dedup_local(scopes: Vec<Scope>) -> Vec<Scope> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(scopes.len());
    for scope in scopes {
        let key = (
            scope.strategy_id.clone(),
            scope.span.map(|s| (s.start, s.end)),
            scope.role,
        );
        if seen.insert(key) {
            out.push(scope);
        }
    }
    out
}

/// Slice a span out of the sentence, trimming edge whitespace and adjusting
/// offsets so the recorded interval always matches the recorded text.
fn exact_scope(sent: &SentenceText, id: &str, start: usize, end: usize) -> Option<Scope> {
    let raw = sent.slice(start, end);
    let leading = raw.chars().take_while(|c| c.is_whitespace()).count();
    let trailing = raw
        .chars()
        .rev()
        .take_while(|c| c.is_whitespace())
        .count();
    let start = start + leading;
    let end = end.saturating_sub(trailing);
    if start >= end {
        return None;
    }
    Some(Scope::new(
        id,
        sent.slice(start, end).to_string(),
        CharSpan::new(start, end),
    ))
}

fn core_window(
    strategy: &Strategy,
    sent: &SentenceText,
    tokens: &[Token],
    cues: &[&Cue],
    max_tokens: usize,
    strip_de: bool,
    keep_unresolved: bool,
) -> Vec<Scope> {
    let stop_punct: &[String] = strategy
        .options
        .stop_punct
        .as_deref()
        .unwrap_or(&DEFAULT_STOP_PUNCT);
    let stop_lexemes: &[String] = strategy
        .options
        .stop_lexemes
        .as_deref()
        .unwrap_or(&DEFAULT_STOP_LEXEMES);
    let mut out = Vec::new();
    for cue in cues {
        match window_right(tokens, cue.end, max_tokens, stop_punct, stop_lexemes) {
            None => {
                if keep_unresolved {
                    out.push(Scope::unresolved(&strategy.id));
                }
            }
            Some(window) => {
                let mut start = window.start;
                if strip_de {
                    start += leading_de_offset(sent.slice(window.start, window.end));
                }
                if let Some(scope) = exact_scope(sent, &strategy.id, start, window.end) {
                    out.push(scope);
                }
            }
        }
    }
    dedup_local(out)
}

static NI_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bni\b").expect("valid regex"));

fn conjunction_split(strategy: &Strategy, sent: &SentenceText) -> Vec<Scope> {
    let text = sent.normalized();
    let mut out = Vec::new();
    let matches: Vec<_> = NI_SPLIT.find_iter(text).collect();
    for (idx, m) in matches.iter().enumerate() {
        let seg_start_byte = m.end();
        let seg_end_byte = matches
            .get(idx + 1)
            .map_or(text.len(), |next| next.start());
        let segment = &text[seg_start_byte..seg_end_byte];
        // Cut the conjunct at the first punctuation mark.
        let cut = segment
            .char_indices()
            .find(|(_, c)| is_punct_char(*c))
            .map_or(segment.len(), |(b, _)| b);
        let frag = &segment[..cut];
        let start = sent.byte_to_char(seg_start_byte);
        let end = start + frag.chars().count();
        if let Some(scope) = exact_scope(sent, &strategy.id, start, end) {
            out.push(scope);
        }
    }
    dedup_local(out)
}

fn resolve_cooccurrence(
    strategy: &Strategy,
    sent: &SentenceText,
    all_scopes: &ScopesByGroup,
) -> Vec<Scope> {
    static EMPTY: Vec<Scope> = Vec::new();
    let bipartite = all_scopes.get(&Group::Bipartite).unwrap_or(&EMPTY);
    let determinant = all_scopes.get(&Group::Determinant).unwrap_or(&EMPTY);
    let mut out = Vec::new();
    for b in bipartite {
        let Some(b_span) = b.span else { continue };
        for d in determinant {
            let Some(d_span) = d.span else { continue };
            if overlap_fraction(b_span, d_span) >= COOCCURRENCE_OVERLAP_THRESHOLD {
                let start = b_span.start.min(d_span.start);
                let end = b_span.end.max(d_span.end);
                if let Some(scope) = exact_scope(sent, &strategy.id, start, end) {
                    out.push(scope);
                }
            }
        }
    }
    dedup_local(out)
}

/// Attribution prepositions that introduce a support span.
static GOVERNOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        "selon",
        "d'après",
        "d'\u{2009}après",
        "conformément à",
        "au regard de",
        "en accord avec",
        "par",
    ]
    .iter()
    .map(|prep| {
        RegexBuilder::new(&format!(r"\b{}\b\s+([^.,;:]+)", regex::escape(prep)))
            .case_insensitive(true)
            .build()
            .expect("valid regex")
    })
    .collect()
});

static TITLE_BEFORE_COLON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\n.])([^\n:.]{3,})\s*:[\s\-–—]*$").expect("valid regex")
});

fn governor_support(strategy: &Strategy, sent: &SentenceText) -> Vec<Scope> {
    let text = sent.normalized();
    let mut out = Vec::new();
    for pattern in GOVERNOR_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let Some(g) = caps.get(1) else { continue };
            let start = sent.byte_to_char(g.start());
            let end = sent.byte_to_char(g.end());
            if let Some(scope) = exact_scope(sent, &strategy.id, start, end) {
                out.push(scope.with_role(ScopeRole::Support));
            }
        }
    }
    if let Some(caps) = TITLE_BEFORE_COLON.captures(text) {
        if let Some(g) = caps.get(1) {
            let start = sent.byte_to_char(g.start());
            let end = sent.byte_to_char(g.end());
            if let Some(scope) = exact_scope(sent, &strategy.id, start, end) {
                out.push(scope.with_role(ScopeRole::Support));
            }
        }
    }
    dedup_local(out)
}

fn pattern_fallback(strategy: &Strategy, sent: &SentenceText) -> Vec<Scope> {
    let Some(pattern) = strategy.pattern.as_ref() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for m in pattern.find_iter(sent.normalized()) {
        let start = sent.byte_to_char(m.start());
        let end = sent.byte_to_char(m.end());
        if let Some(scope) = exact_scope(sent, &strategy.id, start, end) {
            out.push(scope);
        }
    }
    dedup_local(out)
}

/// Run one strategy for one sentence.
#[must_use]
pub fn execute(
    strategy: &Strategy,
    sent: &SentenceText,
    tokens: &[Token],
    group_cues: &[&Cue],
    all_scopes: &ScopesByGroup,
) -> StrategyOutcome {
    if strategy
        .deny_guards
        .iter()
        .any(|g| g.is_match(sent.normalized()))
    {
        debug!("strategy {}: deny guard fired, group silenced", strategy.id);
        return StrategyOutcome::SkipGroup;
    }
    match strategy.kind {
        StrategyKind::SkipIfPattern => {
            if strategy
                .skip_pattern
                .as_ref()
                .is_some_and(|p| p.is_match(sent.normalized()))
            {
                StrategyOutcome::SkipGroup
            } else {
                StrategyOutcome::Scopes(Vec::new())
            }
        }
        StrategyKind::SkipIfLexicalized => {
            if strategy
                .lexicalized
                .iter()
                .any(|p| p.is_match(sent.normalized()))
            {
                StrategyOutcome::SkipGroup
            } else {
                StrategyOutcome::Scopes(Vec::new())
            }
        }
        StrategyKind::BipartiteCore => {
            let max = strategy
                .options
                .max_token_gap
                .unwrap_or(DEFAULT_CORE_TOKEN_GAP);
            StrategyOutcome::Scopes(core_window(
                strategy, sent, tokens, group_cues, max, false, true,
            ))
        }
        StrategyKind::DeterminantCore => {
            let max = strategy
                .options
                .max_token_gap
                .unwrap_or(DEFAULT_CORE_TOKEN_GAP);
            StrategyOutcome::Scopes(core_window(
                strategy,
                sent,
                tokens,
                group_cues,
                max,
                strategy.options.strip_de,
                false,
            ))
        }
        StrategyKind::PrepositionCore => {
            let max = strategy
                .options
                .right_window_tokens
                .unwrap_or(DEFAULT_PREP_WINDOW_TOKENS);
            StrategyOutcome::Scopes(core_window(
                strategy, sent, tokens, group_cues, max, true, false,
            ))
        }
        StrategyKind::ConjunctionSplit => {
            StrategyOutcome::Scopes(conjunction_split(strategy, sent))
        }
        StrategyKind::ResolveCooccurrence => {
            StrategyOutcome::Scopes(resolve_cooccurrence(strategy, sent, all_scopes))
        }
        StrategyKind::GovernorSupportAuto => {
            StrategyOutcome::Scopes(governor_support(strategy, sent))
        }
        StrategyKind::PatternFallback => StrategyOutcome::Scopes(pattern_fallback(strategy, sent)),
    }
}

// ============================================================================
// Registry
// ============================================================================

/// All strategies of a run plus the per-group execution order.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    strategies: Vec<Strategy>,
    order: Vec<(Group, Vec<String>)>,
}

impl StrategyRegistry {
    /// Build a registry from compiled strategies and an explicit order.
    #[must_use]
    pub fn new(strategies: Vec<Strategy>, order: Vec<(Group, Vec<String>)>) -> Self {
        Self { strategies, order }
    }

    /// Build a registry whose order is the strategy load order, per group.
    #[must_use]
    pub fn from_load_order(strategies: Vec<Strategy>) -> Self {
        let mut order: Vec<(Group, Vec<String>)> = Vec::new();
        for strategy in &strategies {
            match order.iter_mut().find(|(g, _)| *g == strategy.group) {
                Some((_, ids)) => ids.push(strategy.id.clone()),
                None => order.push((strategy.group, vec![strategy.id.clone()])),
            }
        }
        Self { strategies, order }
    }

    /// Number of loaded strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// True when no strategy was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    fn find(&self, id: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.id == id)
    }

    /// Execute every group's strategies for one sentence, in registry order.
    ///
    /// Returns the flattened scopes. A deny guard or skip strategy removes
    /// the whole group's output, including scopes earlier strategies of that
    /// group already produced.
    #[must_use]
    pub fn execute_for_sentence(
        &self,
        sent: &SentenceText,
        tokens: &[Token],
        cues: &[Cue],
    ) -> Vec<Scope> {
        let mut all_scopes: ScopesByGroup = HashMap::new();
        let mut group_order: Vec<Group> = Vec::new();
        for (group, ids) in &self.order {
            let group_cues: Vec<&Cue> = cues.iter().filter(|c| c.group == *group).collect();
            let mut group_scopes: Vec<Scope> = Vec::new();
            let mut silenced = false;
            for id in ids {
                let Some(strategy) = self.find(id) else {
                    warn!("registry names unknown strategy '{}', skipped", id);
                    continue;
                };
                // Cross-group strategies read what earlier groups built.
                let mut visible = all_scopes.clone();
                visible.insert(*group, group_scopes.clone());
                match execute(strategy, sent, tokens, &group_cues, &visible) {
                    StrategyOutcome::SkipGroup => {
                        silenced = true;
                        break;
                    }
                    StrategyOutcome::Scopes(scopes) => group_scopes.extend(scopes),
                }
            }
            if silenced {
                continue;
            }
            if !group_order.contains(group) {
                group_order.push(*group);
            }
            all_scopes.entry(*group).or_default().extend(group_scopes);
        }
        let mut out = Vec::new();
        for group in group_order {
            if let Some(scopes) = all_scopes.remove(&group) {
                out.extend(scopes);
            }
        }
        out
    }
}

/// Load strategies from `<rules_dir>/20_scopes` and the optional
/// `00_registry.yaml` order file.
///
/// A missing registry file falls back to load order; a missing scope
/// directory yields an empty registry.
#[must_use]
pub fn load_registry(rules_dir: &Path) -> StrategyRegistry {
    let dir = rules_dir.join("20_scopes");
    let mut strategies = Vec::new();
    match list_yaml_files(&dir) {
        Ok(paths) => {
            for path in paths {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                match fs::read_to_string(&path) {
                    Ok(contents) => strategies.extend(parse_strategy_file(&name, &contents)),
                    Err(e) => warn!("scope file {} unreadable, skipped: {}", path.display(), e),
                }
            }
        }
        Err(e) => {
            warn!("scope directory {} unreadable: {}", dir.display(), e);
        }
    }

    let registry_path = rules_dir.join("00_registry.yaml");
    match fs::read_to_string(&registry_path) {
        Ok(contents) => match serde_yaml::from_str::<BTreeMap<String, Vec<String>>>(&contents) {
            Ok(raw_order) => {
                let mut order = Vec::new();
                for (group_name, ids) in raw_order {
                    match Group::parse(&group_name) {
                        Some(group) => order.push((group, ids)),
                        None => warn!("registry: unknown group '{}' ignored", group_name),
                    }
                }
                StrategyRegistry::new(strategies, order)
            }
            Err(e) => {
                warn!("registry file unparseable, using load order: {}", e);
                StrategyRegistry::from_load_order(strategies)
            }
        },
        Err(_) => StrategyRegistry::from_load_order(strategies),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::tokenize;

    fn strategy_from_yaml(file: &str, yaml: &str) -> Strategy {
        parse_strategy_file(file, yaml).remove(0)
    }

    fn run(
        strategy: &Strategy,
        text: &str,
        cues: &[Cue],
        all_scopes: &ScopesByGroup,
    ) -> StrategyOutcome {
        let sent = SentenceText::new(text);
        let tokens = tokenize(sent.normalized());
        let group_cues: Vec<&Cue> = cues.iter().filter(|c| c.group == strategy.group).collect();
        execute(strategy, &sent, &tokens, &group_cues, all_scopes)
    }

    fn scopes(outcome: StrategyOutcome) -> Vec<Scope> {
        match outcome {
            StrategyOutcome::Scopes(s) => s,
            StrategyOutcome::SkipGroup => panic!("unexpected group skip"),
        }
    }

    #[test]
    fn bipartite_core_windows_right_of_cue() {
        let strategy = strategy_from_yaml(
            "bipartites.yaml",
            "- id: BIP_G_CORE\n  scope_strategy: NEP_SMART\n",
        );
        let text = "Les patients n'ont pas présenté de complication.";
        let cues = vec![Cue::new("NE", Group::Bipartite, "n' pas", 13, 22)];
        let got = scopes(run(&strategy, text, &cues, &ScopesByGroup::new()));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "présenté de complication");
        let span = got[0].span.unwrap();
        assert_eq!((span.start, span.end), (23, 47));
    }

    #[test]
    fn bipartite_core_keeps_unresolved_window() {
        let strategy = strategy_from_yaml(
            "bipartites.yaml",
            "- id: BIP_G_CORE\n  scope_strategy: NEP_SMART\n",
        );
        let text = "rien ne va.";
        // Cue at the very end: nothing to the right.
        let cues = vec![Cue::new("NE", Group::Bipartite, "ne", 10, 11)];
        let got = scopes(run(&strategy, text, &cues, &ScopesByGroup::new()));
        assert_eq!(got.len(), 1);
        assert!(got[0].span.is_none());
        assert_eq!(got[0].text, "");
    }

    #[test]
    fn determinant_core_strips_leading_de() {
        let strategy = strategy_from_yaml(
            "determinant.yaml",
            "- id: DET_G_CORE\n  scope_strategy: DET_NEG_GN_SMART\n",
        );
        let text = "pas de complication notable";
        let cues = vec![Cue::new("PAS_DE", Group::Determinant, "pas", 0, 3)];
        let got = scopes(run(&strategy, text, &cues, &ScopesByGroup::new()));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "complication notable");
        let span = got[0].span.unwrap();
        // The "de " article is outside the recorded interval.
        assert_eq!((span.start, span.end), (7, 27));
    }

    #[test]
    fn preposition_core_window() {
        let strategy = strategy_from_yaml(
            "preposition.yaml",
            "- id: PREP_GENERIC_CORE\n  scope_strategy: PREP_GENERIC_CORE\n",
        );
        let text = "examen sans preuve, d'infection";
        let cues = vec![Cue::new("SANS", Group::Preposition, "sans", 7, 11)];
        let got = scopes(run(&strategy, text, &cues, &ScopesByGroup::new()));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "preuve");
    }

    #[test]
    fn conjunction_split_cuts_at_punctuation() {
        let strategy = strategy_from_yaml(
            "ni_coord.yaml",
            "- id: CONJ_NI_CORE\n  scope_strategy: NI_COORD_SMART\n",
        );
        let text = "Le patient ne présente ni fièvre ni toux, ni douleur.";
        let got = scopes(run(&strategy, text, &[], &ScopesByGroup::new()));
        let texts: Vec<&str> = got.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["fièvre", "toux", "douleur"]);
        for s in &got {
            let span = s.span.unwrap();
            let sent = SentenceText::new(text);
            assert_eq!(sent.slice(span.start, span.end), s.text);
        }
    }

    #[test]
    fn cooccurrence_merges_at_half_overlap() {
        let strategy = strategy_from_yaml(
            "determinant.yaml",
            "- id: DET_COOC_DET_RESOLVE\n  scope_strategy: RESOLVE_COOCURRENCE\n",
        );
        let text = "aucune complication notable observée ici";
        let mut all = ScopesByGroup::new();
        // 12 shared chars over a 20-char envelope: fraction 0.6.
        all.insert(
            Group::Bipartite,
            vec![Scope::new("B", "complication", CharSpan::new(7, 19))],
        );
        all.insert(
            Group::Determinant,
            vec![Scope::new("D", "complication notable", CharSpan::new(7, 27))],
        );
        let got = scopes(run(&strategy, text, &[], &all));
        assert_eq!(got.len(), 1);
        let span = got[0].span.unwrap();
        assert_eq!((span.start, span.end), (7, 27));
        assert_eq!(got[0].text, "complication notable");
    }

    #[test]
    fn cooccurrence_keeps_disjoint_scopes_apart() {
        let strategy = strategy_from_yaml(
            "determinant.yaml",
            "- id: DET_COOC_DET_RESOLVE\n  scope_strategy: RESOLVE_COOCURRENCE\n",
        );
        let text = "aucune complication notable observée ici même";
        let mut all = ScopesByGroup::new();
        all.insert(
            Group::Bipartite,
            vec![Scope::new("B", "aucune", CharSpan::new(0, 6))],
        );
        all.insert(
            Group::Determinant,
            vec![Scope::new("D", "observée ici", CharSpan::new(28, 40))],
        );
        let got = scopes(run(&strategy, text, &[], &all));
        assert!(got.is_empty());
    }

    #[test]
    fn governor_support_finds_attribution() {
        let strategy = strategy_from_yaml(
            "locutions.yaml",
            "- id: GOV_SUPPORT\n  scope_strategy: GOVERNOR_SUPPORT_AUTO\n",
        );
        let text = "Aucune anomalie selon le compte rendu.";
        let got = scopes(run(&strategy, text, &[], &ScopesByGroup::new()));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].role, Some(ScopeRole::Support));
        assert_eq!(got[0].text, "le compte rendu");
    }

    #[test]
    fn deny_guard_silences_group() {
        let strategy = strategy_from_yaml(
            "preposition.yaml",
            "- id: PREP_GENERIC_CORE\n  scope_strategy: PREP_GENERIC_CORE\n  guards:\n    deny_if_surface:\n      - pattern: \"sans doute\"\n        options:\n          case_insensitive: true\n",
        );
        let text = "Sans doute une amélioration";
        let cues = vec![Cue::new("SANS", Group::Preposition, "sans", 0, 4)];
        assert!(matches!(
            run(&strategy, text, &cues, &ScopesByGroup::new()),
            StrategyOutcome::SkipGroup
        ));
    }

    #[test]
    fn skip_if_lexicalized_silences_group() {
        let strategy = strategy_from_yaml(
            "preposition.yaml",
            "- id: PREP_SKIP\n  scope_strategy: SKIP_IF_LEXICALIZED\n  options:\n    lexicalized_patterns:\n      - sans cesse\n",
        );
        assert!(matches!(
            run(&strategy, "il tousse sans cesse", &[], &ScopesByGroup::new()),
            StrategyOutcome::SkipGroup
        ));
        assert!(matches!(
            run(&strategy, "sans fièvre", &[], &ScopesByGroup::new()),
            StrategyOutcome::Scopes(_)
        ));
    }

    #[test]
    fn registry_group_silencing_drops_earlier_scopes() {
        let strategies = parse_strategy_file(
            "preposition.yaml",
            "- id: PREP_GENERIC_CORE\n  scope_strategy: PREP_GENERIC_CORE\n- id: PREP_SKIP\n  scope_strategy: SKIP_IF_LEXICALIZED\n  options:\n    lexicalized_patterns:\n      - sans cesse\n",
        );
        let registry = StrategyRegistry::from_load_order(strategies);
        let sent = SentenceText::new("il tousse sans cesse");
        let tokens = tokenize(sent.normalized());
        let cues = vec![Cue::new("SANS", Group::Preposition, "sans", 10, 14)];
        let got = registry.execute_for_sentence(&sent, &tokens, &cues);
        assert!(got.is_empty(), "silenced group kept scopes: {:?}", got);
    }

    #[test]
    fn pattern_fallback_spans_matches() {
        let strategy = strategy_from_yaml(
            "locutions.yaml",
            "- id: LOC_HORS\n  when_pattern: \"hors de \\\\w+\"\n  options:\n    case_insensitive: true\n",
        );
        let got = scopes(run(
            &strategy,
            "Hors de tout contexte infectieux",
            &[],
            &ScopesByGroup::new(),
        ));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "Hors de tout");
    }

    #[test]
    fn unknown_kind_is_dropped() {
        let parsed = parse_strategy_file(
            "misc.yaml",
            "- id: WEIRD\n  scope_strategy: TELEPORT\n",
        );
        assert!(parsed.is_empty());
    }
}
