//! The patch engine: locate an anchor, check the guard, mutate.
//!
//! Application is a pure function over [`Document`] values. Correctness is
//! defined as idempotence: `apply(apply(D, R)) == apply(D, R)`. The guard
//! check runs before every mutation, and each operation additionally
//! recognizes its own output (an insert whose lines are already in place, a
//! replacement whose new block is already present) so a re-run degrades to
//! `AlreadyApplied` rather than a duplicate edit.
//!
//! A rule whose precondition is not met fails loudly. Silent skipping is
//! how half-patched files happen; a missing anchor is always an error.

use crate::document::Document;
use crate::pattern::AnchorPattern;
use crate::rule::{Guard, IndentPolicy, Lookahead, Operation, PatchRule};
use std::fmt;
use thiserror::Error;

/// A located edit site: the anchor line, and the lookahead line when the
/// rule used one to disambiguate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub anchor: usize,
    pub lookahead: Option<usize>,
}

impl Position {
    /// The line edits are measured from: the lookahead line when present,
    /// else the anchor itself.
    pub fn reference(&self) -> usize {
        self.lookahead.unwrap_or(self.anchor)
    }
}

/// Why a single rule could not be applied.
///
/// Every variant names the failing rule; a pipeline failure is never a
/// generic "something went wrong".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule '{rule}': anchor not found ({pattern}, searched from line {search_from})")]
    AnchorNotFound {
        rule: String,
        pattern: String,
        search_from: usize,
    },

    #[error("rule '{rule}': anchor is ambiguous ({pattern} matches {count} lines, first at {})",
        fmt_lines(.matched_lines))]
    AmbiguousAnchor {
        rule: String,
        pattern: String,
        count: usize,
        /// Up to the first three matching line indices, for diagnostics.
        matched_lines: Vec<usize>,
    },

    #[error("rule '{rule}': lookahead mismatch ({pattern} not within {window} non-blank lines after anchor at line {anchor_line})")]
    LookaheadMismatch {
        rule: String,
        pattern: String,
        window: usize,
        anchor_line: usize,
    },

    #[error("rule '{rule}': block not found{}", fmt_divergence(.divergence))]
    BlockNotFound {
        rule: String,
        /// First line of the block that was searched for.
        block_head: String,
        /// Where the closest candidate run stopped matching, if one existed.
        divergence: Option<Divergence>,
    },
}

fn fmt_lines(lines: &[usize]) -> String {
    lines
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_divergence(divergence: &Option<Divergence>) -> String {
    match divergence {
        Some(d) => format!(
            " (candidate at line {} diverges on line {}: expected {:?}, found {:?})",
            d.candidate_start, d.line, d.expected, d.found
        ),
        None => String::new(),
    }
}

/// Diagnostic detail for a near-miss block match. Matching itself is always
/// exact; this only explains where the closest run stopped agreeing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub candidate_start: usize,
    pub line: usize,
    pub expected: String,
    pub found: String,
}

/// What a successfully processed rule did to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "RuleOutcome should be checked for applied/already-applied"]
pub enum RuleOutcome {
    Applied { edit: EditKind },
    /// The guard matched, or the operation's result was already in place.
    AlreadyApplied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    Inserted { at: usize, count: usize },
    Replaced { at: usize, removed: usize, added: usize },
    Deleted { count: usize },
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditKind::Inserted { at, count } => {
                write!(f, "inserted {count} line(s) at line {at}")
            }
            EditKind::Replaced { at, removed, added } => {
                write!(f, "replaced {removed} line(s) at line {at} with {added}")
            }
            EditKind::Deleted { count } => write!(f, "deleted {count} line(s)"),
        }
    }
}

/// Result of applying one rule: the new document, what happened, and the
/// cursor the pipeline should continue from.
#[derive(Debug, Clone)]
pub struct RuleApplication {
    pub document: Document,
    pub outcome: RuleOutcome,
    pub cursor: usize,
}

/// Result of a whole pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub document: Document,
    pub outcomes: Vec<(String, RuleOutcome)>,
}

/// A failed pipeline run. Carries the original document (what the caller
/// should keep) and the partially-applied one (diagnostics only; the
/// default policy is to discard it and write nothing).
#[derive(Debug, Clone)]
pub struct PipelineError {
    pub rule: String,
    pub error: RuleError,
    pub original: Document,
    pub partial: Document,
    /// Outcomes of the rules that completed before the failure.
    pub completed: Vec<(String, RuleOutcome)>,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pipeline aborted after {} rule(s): {}",
            self.completed.len(),
            self.error
        )
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Locate the rule's anchor at or after `search_from`.
///
/// With a repeated anchor and no lookahead the engine refuses to pick
/// arbitrarily. With a lookahead, candidates whose following non-blank
/// lines never match it are filtered out; ambiguity after filtering is
/// still an error.
pub fn locate(
    document: &Document,
    rule: &PatchRule,
    search_from: usize,
) -> Result<Position, RuleError> {
    let candidates: Vec<usize> = (search_from..document.len())
        .filter(|&i| rule.anchor.matches(&document.lines()[i]))
        .collect();

    if candidates.is_empty() {
        return Err(RuleError::AnchorNotFound {
            rule: rule.id.clone(),
            pattern: rule.anchor.to_string(),
            search_from,
        });
    }

    let Some(lookahead) = &rule.lookahead else {
        if candidates.len() > 1 {
            return Err(ambiguous(rule, &rule.anchor, candidates));
        }
        return Ok(Position {
            anchor: candidates[0],
            lookahead: None,
        });
    };

    let confirmed: Vec<Position> = candidates
        .iter()
        .filter_map(|&anchor| {
            lookahead_hit(document, anchor, lookahead).map(|line| Position {
                anchor,
                lookahead: Some(line),
            })
        })
        .collect();

    match confirmed.as_slice() {
        [] => Err(RuleError::LookaheadMismatch {
            rule: rule.id.clone(),
            pattern: lookahead.pattern.to_string(),
            window: lookahead.window,
            anchor_line: candidates[0],
        }),
        [position] => Ok(*position),
        _ => Err(ambiguous(
            rule,
            &rule.anchor,
            confirmed.iter().map(|p| p.anchor).collect(),
        )),
    }
}

fn ambiguous(rule: &PatchRule, pattern: &AnchorPattern, lines: Vec<usize>) -> RuleError {
    RuleError::AmbiguousAnchor {
        rule: rule.id.clone(),
        pattern: pattern.to_string(),
        count: lines.len(),
        matched_lines: lines.into_iter().take(3).collect(),
    }
}

/// Scan the next `window` non-blank lines after `anchor` for the lookahead
/// pattern; returns the matching line index.
fn lookahead_hit(document: &Document, anchor: usize, lookahead: &Lookahead) -> Option<usize> {
    let mut seen = 0;
    for index in anchor + 1..document.len() {
        let line = &document.lines()[index];
        if line.trim().is_empty() {
            continue;
        }
        if lookahead.pattern.matches(line) {
            return Some(index);
        }
        seen += 1;
        if seen >= lookahead.window {
            break;
        }
    }
    None
}

/// Check the rule's guard over `[region_start, region_end]` (clamped).
fn guard_matches(
    document: &Document,
    guard: &Option<Guard>,
    region_start: usize,
    region_end: usize,
) -> bool {
    let Some(guard) = guard else {
        return false;
    };
    let end = region_end.min(document.len().saturating_sub(1));
    (region_start..=end).any(|i| guard.pattern.matches(&document.lines()[i]))
}

/// Apply one rule: seek the anchor, check the guard, mutate.
///
/// The returned cursor is the anchor's index; the pipeline continues its
/// search there, so rule order must follow document order (or reset via
/// [`PatchRule::from_start`]).
pub fn apply_rule(
    document: &Document,
    rule: &PatchRule,
    search_from: usize,
) -> Result<RuleApplication, RuleError> {
    let position = locate(document, rule, search_from)?;
    let guard_window = rule.guard.as_ref().map_or(0, |g| g.window);

    let (document, outcome) = match &rule.operation {
        Operation::InsertAfter { lines, indent } => {
            let reference = position.reference();
            if guard_matches(
                document,
                &rule.guard,
                position.anchor,
                reference + guard_window,
            ) {
                (document.clone(), RuleOutcome::AlreadyApplied)
            } else {
                insert_after(document, position, lines, indent)
            }
        }
        Operation::ReplaceBlock { old, new } => {
            if guard_matches(
                document,
                &rule.guard,
                position.anchor,
                position.anchor + guard_window,
            ) {
                (document.clone(), RuleOutcome::AlreadyApplied)
            } else {
                replace_block(document, rule, position, old, new)?
            }
        }
        Operation::DeleteLines { predicate, window } => {
            let window_end = position.anchor + window;
            if guard_matches(document, &rule.guard, position.anchor + 1, window_end) {
                (document.clone(), RuleOutcome::AlreadyApplied)
            } else {
                delete_lines(document, position, predicate, *window)
            }
        }
    };

    Ok(RuleApplication {
        document,
        outcome,
        cursor: position.anchor,
    })
}

fn insert_after(
    document: &Document,
    position: Position,
    lines: &[String],
    indent: &IndentPolicy,
) -> (Document, RuleOutcome) {
    let reference = position.reference();
    let indentation = match indent {
        IndentPolicy::Explicit(width) => " ".repeat(*width),
        IndentPolicy::CopyFrom(offset) => {
            let target = reference as i64 + offset;
            if target < 0 {
                String::new()
            } else {
                document.indent_of(target as usize).to_string()
            }
        }
    };

    let rendered: Vec<String> = lines
        .iter()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{indentation}{line}")
            }
        })
        .collect();

    // Already in place immediately after the reference line: the safety net
    // that keeps guardless rules idempotent.
    let insert_at = reference + 1;
    let existing = document.lines().get(insert_at..insert_at + rendered.len());
    if existing == Some(rendered.as_slice()) {
        return (document.clone(), RuleOutcome::AlreadyApplied);
    }

    let mut next = document.clone();
    let count = rendered.len();
    next.insert_lines(insert_at, rendered);
    (
        next,
        RuleOutcome::Applied {
            edit: EditKind::Inserted {
                at: insert_at,
                count,
            },
        },
    )
}

fn replace_block(
    document: &Document,
    rule: &PatchRule,
    position: Position,
    old: &[String],
    new: &[String],
) -> Result<(Document, RuleOutcome), RuleError> {
    let starts = find_runs(document, position.anchor, old);

    match starts.as_slice() {
        [start] => {
            let mut next = document.clone();
            next.replace_run(*start, old.len(), new.to_vec());
            Ok((
                next,
                RuleOutcome::Applied {
                    edit: EditKind::Replaced {
                        at: *start,
                        removed: old.len(),
                        added: new.len(),
                    },
                },
            ))
        }
        [] => {
            // The replacement may already be in place from an earlier run.
            if !find_runs(document, position.anchor, new).is_empty() {
                return Ok((document.clone(), RuleOutcome::AlreadyApplied));
            }
            Err(RuleError::BlockNotFound {
                rule: rule.id.clone(),
                block_head: old.first().cloned().unwrap_or_default(),
                divergence: nearest_divergence(document, position.anchor, old),
            })
        }
        _ => Err(RuleError::AmbiguousAnchor {
            rule: rule.id.clone(),
            pattern: format!("block starting {:?}", old.first().cloned().unwrap_or_default()),
            count: starts.len(),
            matched_lines: starts.into_iter().take(3).collect(),
        }),
    }
}

/// Indices at or after `from` where `block` occurs as an exact contiguous,
/// non-overlapping run.
fn find_runs(document: &Document, from: usize, block: &[String]) -> Vec<usize> {
    let lines = document.lines();
    let mut starts = Vec::new();
    if block.is_empty() {
        return starts;
    }

    let mut i = from;
    while i + block.len() <= lines.len() {
        if lines[i..i + block.len()] == *block {
            starts.push(i);
            i += block.len();
        } else {
            i += 1;
        }
    }
    starts
}

/// Where the first run whose head line matches stops agreeing with `block`.
fn nearest_divergence(document: &Document, from: usize, block: &[String]) -> Option<Divergence> {
    let head = block.first()?;
    let lines = document.lines();
    let start = (from..lines.len()).find(|&i| lines[i] == *head)?;

    for (offset, expected) in block.iter().enumerate() {
        match lines.get(start + offset) {
            Some(found) if found == expected => continue,
            Some(found) => {
                return Some(Divergence {
                    candidate_start: start,
                    line: start + offset,
                    expected: expected.clone(),
                    found: found.clone(),
                })
            }
            None => {
                return Some(Divergence {
                    candidate_start: start,
                    line: start + offset,
                    expected: expected.clone(),
                    found: "<end of document>".to_string(),
                })
            }
        }
    }
    None
}

fn delete_lines(
    document: &Document,
    position: Position,
    predicate: &AnchorPattern,
    window: usize,
) -> (Document, RuleOutcome) {
    // The window opens after the anchor: a rule must never delete its own
    // anchor, or it could not find it again on a re-run.
    let start = position.anchor + 1;
    let mut next = document.clone();
    let mut deleted = 0;

    // Deletion repeats until the window is clean. Without the fixpoint, a
    // matching line just past the window would slide into it and be deleted
    // by the next run instead, breaking idempotence.
    loop {
        let end = (position.anchor + window + 1).min(next.len());
        let doomed: Vec<usize> = (start..end)
            .filter(|&i| predicate.matches(&next.lines()[i]))
            .collect();
        if doomed.is_empty() {
            break;
        }
        deleted += doomed.len();
        next.remove_indices(&doomed);
    }

    if deleted == 0 {
        // Already-clean state.
        return (document.clone(), RuleOutcome::AlreadyApplied);
    }

    (
        next,
        RuleOutcome::Applied {
            edit: EditKind::Deleted { count: deleted },
        },
    )
}

/// Apply rules in declaration order, each against the previous rule's
/// output. All-or-nothing: the first failure aborts the run, and the error
/// carries both the original and the partially-applied document so the
/// caller can discard the partial result (the default policy: write
/// nothing on any failure).
pub fn apply(document: &Document, rules: &[PatchRule]) -> Result<PipelineOutcome, Box<PipelineError>> {
    let original = document.clone();
    let mut current = document.clone();
    let mut cursor = 0;
    let mut outcomes: Vec<(String, RuleOutcome)> = Vec::with_capacity(rules.len());

    for rule in rules {
        let search_from = if rule.from_start { 0 } else { cursor };
        match apply_rule(&current, rule, search_from) {
            Ok(application) => {
                current = application.document;
                cursor = application.cursor;
                outcomes.push((rule.id.clone(), application.outcome));
            }
            Err(error) => {
                return Err(Box::new(PipelineError {
                    rule: rule.id.clone(),
                    error,
                    original,
                    partial: current,
                    completed: outcomes,
                }));
            }
        }
    }

    Ok(PipelineOutcome {
        document: current,
        outcomes,
    })
}
