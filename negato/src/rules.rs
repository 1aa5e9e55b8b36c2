//! Marker-rule records, compilation, and the grouped rule index.
//!
//! Rules arrive as YAML records (one list per file under `10_markers/`) and
//! are compiled once per run into immutable [`Rule`] values. Compilation is
//! forgiving by design: a pattern that fails to compile drops its rule with a
//! warning and the run continues. Unknown option keys warn instead of being
//! silently accepted.
//!
//! Quality-control records (an `action` field, or an id starting with `QC`)
//! never produce cues; they are kept aside on the index so a downstream
//! consumer can still read them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use negato_core::{Error, Group, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

/// Fallback token gap when a rule declares one that does not parse.
const DEFAULT_TOKEN_GAP: usize = 8;

// ============================================================================
// Raw records
// ============================================================================

/// A marker rule as it appears in a rule file, before compilation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    /// Unique rule id.
    pub id: Option<String>,
    /// Explicit group name; wins over the filename heuristic.
    pub group: Option<String>,
    /// Regex-like match pattern (verbose syntax, named capture groups).
    pub when_pattern: Option<String>,
    /// Literal marker alternative to `when_pattern`.
    pub when_marker: Option<String>,
    /// Label template(s); first non-empty rendering wins.
    pub cue_label: Option<LabelSpec>,
    /// Free-form options map, validated into [`RuleOptions`].
    #[serde(default)]
    pub options: BTreeMap<String, serde_yaml::Value>,
    /// Patterns that suppress a match when found near it.
    #[serde(default)]
    pub negative_guards: Vec<GuardSpec>,
    /// Marks a rule as quality-control: forwarded, never executed.
    pub action: Option<String>,
}

/// `cue_label` accepts a single template or an ordered list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LabelSpec {
    /// One template.
    One(String),
    /// Ordered candidates.
    Many(Vec<String>),
}

impl LabelSpec {
    fn into_vec(self) -> Vec<String> {
        match self {
            LabelSpec::One(s) => vec![s],
            LabelSpec::Many(v) => v,
        }
    }
}

/// A guard is either a bare pattern string or a `{pattern: ...}` record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GuardSpec {
    /// Bare pattern.
    Pattern(String),
    /// Record form.
    Record {
        /// The guard pattern.
        pattern: String,
    },
}

impl GuardSpec {
    fn pattern(&self) -> &str {
        match self {
            GuardSpec::Pattern(p) => p,
            GuardSpec::Record { pattern } => pattern,
        }
    }
}

// ============================================================================
// Options
// ============================================================================

/// Recognized rule options. Unknown keys warn at load time.
#[derive(Debug, Clone, Default)]
pub struct RuleOptions {
    /// Compile the match pattern case-insensitively.
    pub case_insensitive: bool,
    /// Reduce the cue label to negation particles only.
    pub exclude_verbs_from_cue: bool,
    /// Maximum non-punctuation token gap for cross-token pairing.
    pub max_token_gap: Option<usize>,
    /// Group this rule co-occurs with (cross-group strategies).
    pub with_group: Option<String>,
    /// Punctuation tokens that hard-stop a cross-token search.
    pub stop_punct: Option<Vec<String>>,
}

/// Lenient readers for YAML option values, shared by rule and strategy
/// option validation.
pub(crate) mod option_values {
    /// Read an option as a non-negative integer; strings like `"6"` count.
    pub(crate) fn as_usize(value: &serde_yaml::Value) -> Option<usize> {
        match value {
            serde_yaml::Value::Number(n) => n.as_u64().map(|v| v as usize),
            serde_yaml::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Read an option as a boolean; YAML-ish truthy strings count.
    pub(crate) fn as_bool(value: &serde_yaml::Value) -> bool {
        match value {
            serde_yaml::Value::Bool(b) => *b,
            serde_yaml::Value::String(s) => matches!(s.as_str(), "true" | "yes" | "1"),
            serde_yaml::Value::Number(n) => n.as_u64() == Some(1),
            _ => false,
        }
    }

    /// Read an option as a string list; a bare string becomes a singleton.
    pub(crate) fn as_string_list(value: &serde_yaml::Value) -> Option<Vec<String>> {
        match value {
            serde_yaml::Value::Sequence(seq) => Some(
                seq.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            serde_yaml::Value::String(s) => Some(vec![s.clone()]),
            _ => None,
        }
    }
}

impl RuleOptions {
    /// Validate a raw options map, warning on unknown keys and unparseable
    /// values.
    #[must_use]
    pub fn validate(rule_id: &str, raw: &BTreeMap<String, serde_yaml::Value>) -> Self {
        use self::option_values::{as_bool, as_string_list, as_usize};
        let mut opts = RuleOptions::default();
        for (key, value) in raw {
            match key.as_str() {
                "case_insensitive" => opts.case_insensitive = as_bool(value),
                "exclude_verbs_from_cue" => opts.exclude_verbs_from_cue = as_bool(value),
                "max_token_gap" => {
                    opts.max_token_gap = Some(as_usize(value).unwrap_or_else(|| {
                        warn!(
                            "rule {}: unparseable max_token_gap {:?}, using {}",
                            rule_id, value, DEFAULT_TOKEN_GAP
                        );
                        DEFAULT_TOKEN_GAP
                    }));
                }
                "with_group" => opts.with_group = value.as_str().map(str::to_string),
                "stop_punct" => opts.stop_punct = as_string_list(value),
                other => warn!("rule {}: unknown option key '{}' ignored", rule_id, other),
            }
        }
        opts
    }
}

// ============================================================================
// Compiled rule
// ============================================================================

/// A compiled, immutable marker rule.
#[derive(Debug)]
pub struct Rule {
    /// Unique rule id.
    pub id: String,
    /// Semantic group.
    pub group: Group,
    /// Compiled match pattern (from `when_pattern` or `when_marker`).
    pub pattern: Option<Regex>,
    /// Cleaned single-line rendition of the pattern, for logs and debugging.
    pub display_pattern: Option<String>,
    /// Ordered label templates.
    pub labels: Vec<String>,
    /// Validated options.
    pub options: RuleOptions,
    /// Compiled negative guards (always case-insensitive).
    pub guards: Vec<Regex>,
    /// Quality-control flag: deferred rules never produce cues.
    pub deferred: bool,
    /// The raw `action` field, kept for downstream forwarding.
    pub action: Option<String>,
}

impl Rule {
    /// True when the cross-token detector applies to this rule.
    #[must_use]
    pub fn wants_cross_token(&self) -> bool {
        self.group == Group::Bipartite && self.options.max_token_gap.is_some()
    }
}

// ============================================================================
// Pattern cleanup
// ============================================================================

static COMMENT_BEFORE_PIPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#[^|\n]+\|").expect("valid regex"));
static COMMENT_BEFORE_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#[^)\n]+\)").expect("valid regex"));
static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static SPACED_PIPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\|\s*").expect("valid regex"));
static SPACE_AFTER_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s+").expect("valid regex"));
static SPACE_BEFORE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\)").expect("valid regex"));
static SPACE_AFTER_GT: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+").expect("valid regex"));

/// Flatten a multi-line rule pattern into a single displayable line.
///
/// Conservative on purpose: only literal whitespace characters and inline
/// comments are touched. Escaped whitespace constructs (`\s`, `\b`) are two
/// characters of pattern text and survive untouched.
#[must_use]
pub fn clean_pattern(pattern: &str) -> String {
    let mut p = pattern.replace('\n', " ");
    p = COMMENT_BEFORE_PIPE.replace_all(&p, "|").into_owned();
    p = COMMENT_BEFORE_PAREN.replace_all(&p, ")").into_owned();
    p = SPACE_RUN.replace_all(&p, " ").trim().to_string();
    p = SPACED_PIPE.replace_all(&p, "|").into_owned();
    p = SPACE_AFTER_OPEN.replace_all(&p, "(").into_owned();
    p = SPACE_BEFORE_CLOSE.replace_all(&p, ")").into_owned();
    p = SPACE_AFTER_GT.replace_all(&p, ">").into_owned();
    p
}

// ============================================================================
// Group inference
// ============================================================================

/// Infer a group from a rule file name, in fixed priority order.
#[must_use]
pub fn infer_group_from_filename(name: &str) -> Group {
    let n = name.to_lowercase();
    let has = |needle: &str| n.contains(needle);
    if has("ni") || has("conjonction") {
        Group::Conjunction
    } else if has("ne_pas") || has("bipartites") || has("ne_") {
        Group::Bipartite
    } else if has("preposition") || has("sans") || has("prep") {
        Group::Preposition
    } else if has("det") || has("aucun") || has("determinant") || has("pas_de") {
        Group::Determinant
    } else if has("locution") {
        Group::Locution
    } else if has("lexical") {
        Group::Lexical
    } else if has("adversative") || has("mais") {
        Group::Adversative
    } else {
        Group::Other
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile a user-supplied pattern.
pub(crate) fn compile_pattern(
    pattern: &str,
    case_insensitive: bool,
    verbose: bool,
) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .ignore_whitespace(verbose)
        .build()
        .map_err(|e| Error::pattern(e.to_string()))
}

/// Non-draft YAML files of a directory, in lexicographic order.
pub(crate) fn list_yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)?;
    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "yaml")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('_'))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn is_quality_control(id: &str, action: &Option<String>) -> bool {
    action.is_some()
        || id
            .get(..2)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("qc"))
}

/// Compile one raw rule. Returns `None` when the rule must be dropped.
#[must_use]
pub fn compile_rule(raw: RawRule, file_name: &str) -> Option<Rule> {
    let id = raw.id.unwrap_or_else(|| "UNK_RULE".to_string());
    let group = raw
        .group
        .as_deref()
        .map(|g| {
            Group::parse(g).unwrap_or_else(|| {
                warn!("rule {}: unknown group '{}', using fallback bucket", id, g);
                Group::Other
            })
        })
        .unwrap_or_else(|| infer_group_from_filename(file_name));
    let options = RuleOptions::validate(&id, &raw.options);
    let deferred = is_quality_control(&id, &raw.action);

    let (pattern, display_pattern) = match (&raw.when_pattern, &raw.when_marker) {
        (Some(pat), _) => {
            let display = clean_pattern(pat);
            // Verbose mode so rule authors can keep multi-line, commented
            // patterns; insignificant whitespace and `#` comments are the
            // engine's concern, the cleaned rendition is only for display.
            match compile_pattern(pat, options.case_insensitive, true) {
                Ok(rx) => (Some(rx), Some(display)),
                Err(e) => {
                    warn!("rule {}: pattern failed to compile, dropped: {}", id, e);
                    return None;
                }
            }
        }
        (None, Some(marker)) => {
            let escaped = format!(r"\b{}\b", regex::escape(marker));
            match compile_pattern(&escaped, options.case_insensitive, false) {
                Ok(rx) => (Some(rx), Some(escaped)),
                Err(e) => {
                    warn!("rule {}: marker failed to compile, dropped: {}", id, e);
                    return None;
                }
            }
        }
        (None, None) => (None, None),
    };

    let mut guards = Vec::new();
    for spec in &raw.negative_guards {
        match compile_pattern(spec.pattern(), true, false) {
            Ok(rx) => guards.push(rx),
            Err(e) => warn!("rule {}: guard failed to compile, skipped: {}", id, e),
        }
    }

    Some(Rule {
        id,
        group,
        pattern,
        display_pattern,
        labels: raw.cue_label.map(LabelSpec::into_vec).unwrap_or_default(),
        options,
        guards,
        deferred,
        action: raw.action,
    })
}

/// Parse and compile one rule file's contents.
///
/// Parse failures drop the whole file with a warning; compile failures drop
/// single rules.
#[must_use]
pub fn parse_rule_file(file_name: &str, contents: &str) -> Vec<Rule> {
    let raw: Vec<RawRule> = match serde_yaml::from_str(contents) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("rule file {}: not a rule list, skipped: {}", file_name, e);
            return Vec::new();
        }
    };
    raw.into_iter()
        .filter_map(|r| compile_rule(r, file_name))
        .collect()
}

// ============================================================================
// Rule index
// ============================================================================

/// All compiled rules of a run, grouped, in deterministic load order.
///
/// Group order and the per-group rule order are exactly the load order; that
/// order is the only tie-break between rules competing for the same match
/// start, so a fixed rule directory always reproduces the same annotations.
#[derive(Debug, Default)]
pub struct RuleIndex {
    groups: Vec<(Group, Vec<Rule>)>,
    deferred: Vec<Rule>,
}

impl RuleIndex {
    /// Build an index from compiled rules, preserving order.
    #[must_use]
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut index = RuleIndex::default();
        for rule in rules {
            index.push(rule);
        }
        index
    }

    /// Add one rule, routing quality-control rules to the deferred list.
    pub fn push(&mut self, rule: Rule) {
        if rule.deferred {
            self.deferred.push(rule);
            return;
        }
        match self.groups.iter_mut().find(|(g, _)| *g == rule.group) {
            Some((_, rules)) => rules.push(rule),
            None => self.groups.push((rule.group, vec![rule])),
        }
    }

    /// Iterate groups in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Group, &[Rule])> {
        self.groups.iter().map(|(g, rules)| (*g, rules.as_slice()))
    }

    /// Quality-control rules, retained for downstream forwarding.
    #[must_use]
    pub fn deferred(&self) -> &[Rule] {
        &self.deferred
    }

    /// Number of executable rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, r)| r.len()).sum()
    }

    /// True when no executable rule was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load and compile every marker rule under `<rules_dir>/10_markers`.
///
/// Files are visited in lexicographic order; names starting with `_` are
/// ignored. A missing directory yields an empty index, never an error.
#[must_use]
pub fn load_markers(rules_dir: &Path) -> RuleIndex {
    let dir = rules_dir.join("10_markers");
    let mut index = RuleIndex::default();
    let paths = match list_yaml_files(&dir) {
        Ok(paths) => paths,
        Err(e) => {
            warn!("marker directory {} unreadable: {}", dir.display(), e);
            return index;
        }
    };
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let rules = parse_rule_file(&name, &contents);
                debug!("loaded {} rules from {}", rules.len(), name);
                for rule in rules {
                    index.push(rule);
                }
            }
            Err(e) => warn!("rule file {} unreadable, skipped: {}", path.display(), e),
        }
    }
    index
}
