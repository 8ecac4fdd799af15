use crate::pattern::AnchorPattern;

/// Default lookahead window: the anchor's companion pattern must match
/// within this many non-blank lines after the anchor.
pub const DEFAULT_LOOKAHEAD_WINDOW: usize = 3;

/// Default guard window, measured in lines past the reference line.
pub const DEFAULT_GUARD_WINDOW: usize = 8;

/// Default deletion window for [`Operation::DeleteLines`], measured in
/// lines past the anchor.
pub const DEFAULT_DELETE_WINDOW: usize = 4;

/// A secondary predicate that disambiguates repeated anchors: it must match
/// one of the next `window` non-blank lines after a candidate anchor.
#[derive(Debug, Clone)]
pub struct Lookahead {
    pub pattern: AnchorPattern,
    pub window: usize,
}

impl Lookahead {
    pub fn new(pattern: AnchorPattern) -> Self {
        Self {
            pattern,
            window: DEFAULT_LOOKAHEAD_WINDOW,
        }
    }

    pub fn with_window(pattern: AnchorPattern, window: usize) -> Self {
        Self { pattern, window }
    }
}

/// The idempotence check: when the guard pattern already matches inside the
/// affected region, the rule is a no-op instead of a second application.
#[derive(Debug, Clone)]
pub struct Guard {
    pub pattern: AnchorPattern,
    pub window: usize,
}

impl Guard {
    pub fn new(pattern: AnchorPattern) -> Self {
        Self {
            pattern,
            window: DEFAULT_GUARD_WINDOW,
        }
    }

    pub fn with_window(pattern: AnchorPattern, window: usize) -> Self {
        Self { pattern, window }
    }
}

/// How inserted lines acquire their leading whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndentPolicy {
    /// Reuse the indentation of the line at this offset from the insertion
    /// reference line (the lookahead line when present, else the anchor).
    /// Offset 0 is the reference line itself; +1 the line after it, as the
    /// document stands before the insertion. An offset that lands outside
    /// the document yields empty indentation.
    CopyFrom(i64),
    /// Exactly this many spaces.
    Explicit(usize),
}

/// One edit, described relative to a located anchor. Absolute line numbers
/// never appear here: any prior edit would invalidate them.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Insert lines immediately after the reference line, never overwriting
    /// existing content. Each non-empty inserted line gets the indentation
    /// computed by the policy prepended to its declared text.
    InsertAfter {
        lines: Vec<String>,
        indent: IndentPolicy,
    },
    /// Replace the exact contiguous run `old` (located at or after the
    /// anchor, required to occur exactly once) with `new`. Replacement
    /// lines are taken verbatim; blocks carry their own indentation.
    ReplaceBlock {
        old: Vec<String>,
        new: Vec<String>,
    },
    /// Delete every line matching `predicate` within `window` lines after
    /// the anchor, draining the window until it is clean (a match sliding
    /// into the window after a deletion is removed in the same run, not the
    /// next). The anchor line itself is never deleted, so the rule can
    /// locate it again on a re-run. Zero matches is the already-clean
    /// state, not an error.
    DeleteLines {
        predicate: AnchorPattern,
        window: usize,
    },
}

/// A single declarative edit: where to look, how to know it already
/// happened, and what to change.
#[derive(Debug, Clone)]
pub struct PatchRule {
    /// Stable identity, carried into every outcome and error.
    pub id: String,
    pub anchor: AnchorPattern,
    pub lookahead: Option<Lookahead>,
    pub guard: Option<Guard>,
    pub operation: Operation,
    /// Reset the pipeline's search cursor to line 0 for this rule. Without
    /// this, each rule searches at or after the previous rule's anchor.
    pub from_start: bool,
}

impl PatchRule {
    pub fn new(id: impl Into<String>, anchor: AnchorPattern, operation: Operation) -> Self {
        Self {
            id: id.into(),
            anchor,
            lookahead: None,
            guard: None,
            operation,
            from_start: false,
        }
    }

    pub fn with_lookahead(mut self, lookahead: Lookahead) -> Self {
        self.lookahead = Some(lookahead);
        self
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Reset the pipeline's search cursor to line 0 for this rule.
    pub fn rescan_from_start(mut self) -> Self {
        self.from_start = true;
        self
    }
}
