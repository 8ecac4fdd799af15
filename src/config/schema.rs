//! Serde schema for TOML rule sets, structural validation, and compilation
//! into engine rules.
//!
//! The raw schema types mirror the TOML shape; the engine never sees them.
//! Regex compilation happens in [`RuleSet::compile`], so a bad pattern is a
//! load-time error, not a mid-pipeline surprise.

use crate::pattern::AnchorPattern;
use crate::rule::{
    Guard, IndentPolicy, Lookahead, Operation, PatchRule, DEFAULT_DELETE_WINDOW,
    DEFAULT_GUARD_WINDOW, DEFAULT_LOOKAHEAD_WINDOW,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver range the target version must satisfy, e.g. ">=0.3, <0.5".
    #[serde(default)]
    pub version_range: Option<String>,
    /// When true, rule `file` fields are resolved against the project root.
    #[serde(default)]
    pub root_relative: bool,
}

// Unknown keys are parse errors, not ignored hints: a misspelled field
// that silently vanishes is the same failure mode as a silently skipped
// anchor.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RuleDefinition {
    pub id: String,
    pub file: String,
    pub anchor: PatternSpec,
    #[serde(default)]
    pub lookahead: Option<WindowedPatternSpec>,
    #[serde(default)]
    pub guard: Option<WindowedPatternSpec>,
    pub operation: OperationSpec,
    #[serde(default)]
    pub from_start: bool,
}

/// A pattern is either `{ contains = "…" }` or `{ regex = "…" }`, never
/// both and never neither.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PatternSpec {
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WindowedPatternSpec {
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub window: Option<usize>,
}

impl WindowedPatternSpec {
    fn pattern(&self) -> PatternSpec {
        PatternSpec {
            contains: self.contains.clone(),
            regex: self.regex.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OperationSpec {
    InsertAfter {
        /// The lines to insert, without leading indentation; the indent
        /// policy supplies that.
        text: String,
        indent: IndentSpec,
    },
    ReplaceBlock {
        old: String,
        new: String,
    },
    DeleteLines {
        predicate: PatternSpec,
        #[serde(default)]
        window: Option<usize>,
    },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum IndentSpec {
    CopyFrom { offset: i64 },
    Explicit { width: usize },
}

/// Engine rules grouped by target file, declaration order preserved.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    pub meta: Metadata,
    pub files: Vec<FileRules>,
}

#[derive(Debug, Clone)]
pub struct FileRules {
    pub file: String,
    pub rules: Vec<PatchRule>,
}

impl RuleSet {
    /// Structural validation in the issue-list style: every problem in the
    /// file is reported at once, not just the first.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let mut seen_ids = HashSet::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyRuleList);
        }

        for rule in &self.rules {
            let id = if rule.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: None,
                    field: "id",
                });
                None
            } else {
                if !seen_ids.insert(rule.id.as_str()) {
                    issues.push(ValidationIssue::InvalidCombo {
                        rule_id: Some(rule.id.clone()),
                        message: "duplicate rule id".to_string(),
                    });
                }
                Some(rule.id.clone())
            };

            if rule.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: id.clone(),
                    field: "file",
                });
            }

            check_pattern(&rule.anchor, &id, "anchor", &mut issues);
            if let Some(lookahead) = &rule.lookahead {
                check_pattern(&lookahead.pattern(), &id, "lookahead", &mut issues);
                check_window(lookahead.window, &id, "lookahead.window", &mut issues);
            }
            if let Some(guard) = &rule.guard {
                check_pattern(&guard.pattern(), &id, "guard", &mut issues);
                check_window(guard.window, &id, "guard.window", &mut issues);
            }

            match &rule.operation {
                OperationSpec::InsertAfter { text, .. } => {
                    if text.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule_id: id.clone(),
                            field: "operation.text",
                        });
                    }
                }
                OperationSpec::ReplaceBlock { old, new } => {
                    if old.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule_id: id.clone(),
                            field: "operation.old",
                        });
                    }
                    if new.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule_id: id.clone(),
                            field: "operation.new",
                        });
                    }
                }
                OperationSpec::DeleteLines { predicate, window } => {
                    check_pattern(predicate, &id, "operation.predicate", &mut issues);
                    check_window(*window, &id, "operation.window", &mut issues);
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Validate, compile patterns, and group rules by target file.
    pub fn compile(&self) -> Result<CompiledRuleSet, ValidationError> {
        self.validate()?;

        let mut files: Vec<FileRules> = Vec::new();
        for definition in &self.rules {
            let rule = compile_rule(definition);
            match files.iter_mut().find(|f| f.file == definition.file) {
                Some(group) => group.rules.push(rule),
                None => files.push(FileRules {
                    file: definition.file.clone(),
                    rules: vec![rule],
                }),
            }
        }

        Ok(CompiledRuleSet {
            meta: self.meta.clone(),
            files,
        })
    }
}

fn check_pattern(
    spec: &PatternSpec,
    rule_id: &Option<String>,
    field: &'static str,
    issues: &mut Vec<ValidationIssue>,
) {
    match (&spec.contains, &spec.regex) {
        (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
            rule_id: rule_id.clone(),
            message: format!("{field} declares both 'contains' and 'regex'"),
        }),
        (None, None) => issues.push(ValidationIssue::InvalidCombo {
            rule_id: rule_id.clone(),
            message: format!("{field} declares neither 'contains' nor 'regex'"),
        }),
        (Some(needle), None) => {
            if needle.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: rule_id.clone(),
                    field,
                });
            }
        }
        (None, Some(pattern)) => {
            if let Err(error) = regex::Regex::new(pattern) {
                issues.push(ValidationIssue::InvalidPattern {
                    rule_id: rule_id.clone(),
                    field,
                    message: error.to_string(),
                });
            }
        }
    }
}

fn check_window(
    window: Option<usize>,
    rule_id: &Option<String>,
    field: &'static str,
    issues: &mut Vec<ValidationIssue>,
) {
    if window == Some(0) {
        issues.push(ValidationIssue::InvalidCombo {
            rule_id: rule_id.clone(),
            message: format!("{field} must be at least 1"),
        });
    }
}

/// Build an engine pattern from a validated spec.
fn compile_pattern(spec: &PatternSpec) -> AnchorPattern {
    match (&spec.contains, &spec.regex) {
        (Some(needle), _) => AnchorPattern::substring(needle.clone()),
        (_, Some(pattern)) => AnchorPattern::regex(pattern)
            .unwrap_or_else(|_| unreachable!("regex validated before compilation")),
        (None, None) => unreachable!("pattern validated before compilation"),
    }
}

fn compile_rule(definition: &RuleDefinition) -> PatchRule {
    let operation = match &definition.operation {
        OperationSpec::InsertAfter { text, indent } => Operation::InsertAfter {
            lines: split_block(text),
            indent: match indent {
                IndentSpec::CopyFrom { offset } => IndentPolicy::CopyFrom(*offset),
                IndentSpec::Explicit { width } => IndentPolicy::Explicit(*width),
            },
        },
        OperationSpec::ReplaceBlock { old, new } => Operation::ReplaceBlock {
            old: split_block(old),
            new: split_block(new),
        },
        OperationSpec::DeleteLines { predicate, window } => Operation::DeleteLines {
            predicate: compile_pattern(predicate),
            window: window.unwrap_or(DEFAULT_DELETE_WINDOW),
        },
    };

    let mut rule = PatchRule::new(
        definition.id.clone(),
        compile_pattern(&definition.anchor),
        operation,
    );
    if let Some(spec) = &definition.lookahead {
        rule = rule.with_lookahead(Lookahead::with_window(
            compile_pattern(&spec.pattern()),
            spec.window.unwrap_or(DEFAULT_LOOKAHEAD_WINDOW),
        ));
    }
    if let Some(spec) = &definition.guard {
        rule = rule.with_guard(Guard::with_window(
            compile_pattern(&spec.pattern()),
            spec.window.unwrap_or(DEFAULT_GUARD_WINDOW),
        ));
    }
    if definition.from_start {
        rule = rule.rescan_from_start();
    }
    rule
}

/// TOML multi-line strings end with `\n`; the final empty fragment is not a
/// line of the block.
fn split_block(text: &str) -> Vec<String> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n').map(str::to_string).collect()
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyRuleList,
    MissingField {
        rule_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        rule_id: Option<String>,
        message: String,
    },
    InvalidPattern {
        rule_id: Option<String>,
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = |id: &Option<String>| match id {
            Some(id) => format!("rule '{id}'"),
            None => "rule".to_string(),
        };
        match self {
            ValidationIssue::EmptyRuleList => write!(f, "rule set contains no rules"),
            ValidationIssue::MissingField { rule_id, field } => {
                write!(f, "{} missing required field '{field}'", rule(rule_id))
            }
            ValidationIssue::InvalidCombo { rule_id, message } => {
                write!(f, "{} has invalid configuration: {message}", rule(rule_id))
            }
            ValidationIssue::InvalidPattern {
                rule_id,
                field,
                message,
            } => {
                write!(f, "{} has invalid {field} regex: {message}", rule(rule_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_rule() -> RuleDefinition {
        RuleDefinition {
            id: "r1".to_string(),
            file: "template.yaml".to_string(),
            anchor: PatternSpec {
                contains: Some("Type: Api".to_string()),
                regex: None,
            },
            lookahead: None,
            guard: None,
            operation: OperationSpec::InsertAfter {
                text: "RestApiId: !Ref X".to_string(),
                indent: IndentSpec::Explicit { width: 2 },
            },
            from_start: false,
        }
    }

    #[test]
    fn test_validate_accepts_minimal_rule() {
        let set = RuleSet {
            meta: Metadata::default(),
            rules: vec![minimal_rule()],
        };
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_rule_list() {
        let set = RuleSet::default();
        let err = set.validate().unwrap_err();
        assert!(matches!(err.issues[0], ValidationIssue::EmptyRuleList));
    }

    #[test]
    fn test_validate_rejects_pattern_with_both_fields() {
        let mut rule = minimal_rule();
        rule.anchor.regex = Some(".*".to_string());
        let set = RuleSet {
            meta: Metadata::default(),
            rules: vec![rule],
        };
        let err = set.validate().unwrap_err();
        assert!(matches!(
            err.issues[0],
            ValidationIssue::InvalidCombo { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_bad_regex() {
        let mut rule = minimal_rule();
        rule.anchor = PatternSpec {
            contains: None,
            regex: Some("(unclosed".to_string()),
        };
        let set = RuleSet {
            meta: Metadata::default(),
            rules: vec![rule],
        };
        let err = set.validate().unwrap_err();
        assert!(matches!(
            err.issues[0],
            ValidationIssue::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let set = RuleSet {
            meta: Metadata::default(),
            rules: vec![minimal_rule(), minimal_rule()],
        };
        let err = set.validate().unwrap_err();
        assert!(err.issues.iter().any(|issue| matches!(
            issue,
            ValidationIssue::InvalidCombo { message, .. } if message.contains("duplicate")
        )));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut rule = minimal_rule();
        rule.guard = Some(WindowedPatternSpec {
            contains: Some("x".to_string()),
            regex: None,
            window: Some(0),
        });
        let set = RuleSet {
            meta: Metadata::default(),
            rules: vec![rule],
        };
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_compile_groups_rules_by_file_in_order() {
        let mut second = minimal_rule();
        second.id = "r2".to_string();
        second.file = "page.tsx".to_string();
        let mut third = minimal_rule();
        third.id = "r3".to_string();

        let set = RuleSet {
            meta: Metadata::default(),
            rules: vec![minimal_rule(), second, third],
        };
        let compiled = set.compile().unwrap();

        assert_eq!(compiled.files.len(), 2);
        assert_eq!(compiled.files[0].file, "template.yaml");
        assert_eq!(compiled.files[0].rules.len(), 2);
        assert_eq!(compiled.files[0].rules[1].id, "r3");
        assert_eq!(compiled.files[1].file, "page.tsx");
    }

    #[test]
    fn test_split_block_drops_trailing_toml_newline() {
        assert_eq!(split_block("a\nb\n"), vec!["a", "b"]);
        assert_eq!(split_block("a\nb"), vec!["a", "b"]);
        assert_eq!(split_block("a"), vec!["a"]);
    }
}
