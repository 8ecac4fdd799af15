//! Runs a compiled rule set against a project root.
//!
//! Rules are grouped by target file; each file is read once, its pipeline
//! runs all-or-nothing in memory, and the result is committed atomically
//! only when every rule succeeded. A failed pipeline leaves the file
//! byte-identical on disk and reports which rule failed and why.

use crate::config::schema::CompiledRuleSet;
use crate::config::version::matches_range;
use crate::document::Document;
use crate::engine::{self, RuleOutcome};
use crate::fs;
use crate::safety::RootGuard;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run the pipelines but commit nothing. `Applied` then means "would
    /// apply".
    pub dry_run: bool,
    /// Version checked against each set's `version-range`. When absent,
    /// gating is skipped entirely.
    pub target_version: Option<String>,
}

/// Per-rule result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleReport {
    pub id: String,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
#[must_use = "RunOutcome should be checked for success/failure"]
pub enum RunOutcome {
    Applied { file: PathBuf, detail: String },
    AlreadyApplied { file: PathBuf },
    SkippedVersion { reason: String },
    Failed { file: Option<PathBuf>, reason: String },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Applied { file, detail } => {
                write!(f, "applied to {} ({detail})", file.display())
            }
            RunOutcome::AlreadyApplied { file } => {
                write!(f, "already applied to {}", file.display())
            }
            RunOutcome::SkippedVersion { reason } => write!(f, "skipped: {reason}"),
            RunOutcome::Failed { file, reason } => match file {
                Some(file) => write!(f, "failed on {}: {reason}", file.display()),
                None => write!(f, "failed: {reason}"),
            },
        }
    }
}

/// Apply a rule set to the project at `root`, returning one report per
/// rule in declaration order per file.
pub fn run(set: &CompiledRuleSet, root: &Path, options: &RunOptions) -> Vec<RuleReport> {
    if let Some(version) = &options.target_version {
        match matches_range(version, set.meta.version_range.as_deref()) {
            Ok(true) => {}
            Ok(false) => {
                let range = set.meta.version_range.as_deref().unwrap_or("");
                let reason =
                    format!("target version {version} does not satisfy version-range {range}");
                return all_rules(set, |id| RuleReport {
                    id,
                    outcome: RunOutcome::SkippedVersion {
                        reason: reason.clone(),
                    },
                });
            }
            Err(error) => {
                let reason = error.to_string();
                return all_rules(set, |id| RuleReport {
                    id,
                    outcome: RunOutcome::Failed {
                        file: None,
                        reason: reason.clone(),
                    },
                });
            }
        }
    }

    let guard = match RootGuard::new(root) {
        Ok(guard) => guard,
        Err(error) => {
            let reason = error.to_string();
            return all_rules(set, |id| RuleReport {
                id,
                outcome: RunOutcome::Failed {
                    file: None,
                    reason: reason.clone(),
                },
            });
        }
    };

    let mut reports = Vec::new();
    for group in &set.files {
        let target = if set.meta.root_relative {
            guard.root().join(&group.file)
        } else {
            PathBuf::from(&group.file)
        };
        reports.extend(run_file(&guard, &target, group, options));
    }
    reports
}

fn all_rules(set: &CompiledRuleSet, mut make: impl FnMut(String) -> RuleReport) -> Vec<RuleReport> {
    set.files
        .iter()
        .flat_map(|group| &group.rules)
        .map(|rule| make(rule.id.clone()))
        .collect()
}

fn run_file(
    guard: &RootGuard,
    target: &Path,
    group: &crate::config::schema::FileRules,
    options: &RunOptions,
) -> Vec<RuleReport> {
    let fail_all = |reason: String, file: Option<PathBuf>| -> Vec<RuleReport> {
        group
            .rules
            .iter()
            .map(|rule| RuleReport {
                id: rule.id.clone(),
                outcome: RunOutcome::Failed {
                    file: file.clone(),
                    reason: reason.clone(),
                },
            })
            .collect()
    };

    let path = match guard.resolve(target) {
        Ok(path) => path,
        Err(error) => return fail_all(error.to_string(), Some(target.to_path_buf())),
    };

    let source = match fs::read_source(&path) {
        Ok(source) => source,
        Err(error) => return fail_all(error.to_string(), Some(path.clone())),
    };

    let document = Document::from_text(&source.text);
    let outcome = match engine::apply(&document, &group.rules) {
        Ok(outcome) => outcome,
        Err(failure) => {
            // All-or-nothing: nothing is written; every rule in this file's
            // pipeline reports the abort, the failing one with its own error.
            return group
                .rules
                .iter()
                .map(|rule| {
                    let reason = if rule.id == failure.rule {
                        failure.error.to_string()
                    } else {
                        format!("not applied: pipeline aborted by rule '{}'", failure.rule)
                    };
                    RuleReport {
                        id: rule.id.clone(),
                        outcome: RunOutcome::Failed {
                            file: Some(path.clone()),
                            reason,
                        },
                    }
                })
                .collect();
        }
    };

    let changed = outcome
        .outcomes
        .iter()
        .any(|(_, o)| matches!(o, RuleOutcome::Applied { .. }));

    if changed && !options.dry_run {
        if let Err(error) = fs::commit(&path, source.fingerprint, &outcome.document.to_text()) {
            return fail_all(error.to_string(), Some(path.clone()));
        }
    }

    outcome
        .outcomes
        .into_iter()
        .map(|(id, rule_outcome)| RuleReport {
            id,
            outcome: match rule_outcome {
                RuleOutcome::Applied { edit } => RunOutcome::Applied {
                    file: path.clone(),
                    detail: edit.to_string(),
                },
                RuleOutcome::AlreadyApplied => RunOutcome::AlreadyApplied { file: path.clone() },
            },
        })
        .collect()
}
