//! Anchorpatch: anchor-guided line patching for semi-structured text
//!
//! Applies declarative, idempotent line-level edits to files such as
//! deployment templates and markup sources, locating every edit site by
//! content (anchors, lookaheads, guards) and never by absolute line
//! number.
//!
//! # Architecture
//!
//! The engine ([`engine::apply`]) is a pure function from a [`Document`]
//! and an ordered rule list to a new `Document`. Everything stateful sits
//! outside it: rule sets are loaded from TOML ([`config`]), files are read
//! and atomically written at the boundary ([`fs`]), and targets are
//! confined to a project root ([`safety`]).
//!
//! # Safety
//!
//! - Idempotent: re-applying a rule set to its own output is a no-op
//! - Guard check before every mutation; operations recognize their own output
//! - Repeated anchors fail as ambiguous instead of picking a site arbitrarily
//! - Block replacement is exact and contiguous, never fuzzy
//! - All-or-nothing: a pipeline failure writes nothing
//! - Atomic file writes (tempfile + fsync + rename), refused if the file
//!   changed since it was read
//!
//! # Example
//!
//! ```
//! use anchorpatch::{apply, AnchorPattern, Document, Guard, IndentPolicy, Lookahead,
//!     Operation, PatchRule};
//!
//! let doc = Document::from_text("Type: Api\nProperties:\n  Name: foo\n");
//! let rule = PatchRule::new(
//!     "rest-api-id",
//!     AnchorPattern::substring("Type: Api"),
//!     Operation::InsertAfter {
//!         lines: vec!["RestApiId: !Ref AppApi".to_string()],
//!         indent: IndentPolicy::CopyFrom(1),
//!     },
//! )
//! .with_lookahead(Lookahead::new(AnchorPattern::substring("Properties:")))
//! .with_guard(Guard::new(AnchorPattern::substring("RestApiId")));
//!
//! let outcome = apply(&doc, &[rule]).unwrap();
//! assert_eq!(
//!     outcome.document.to_text(),
//!     "Type: Api\nProperties:\n  RestApiId: !Ref AppApi\n  Name: foo\n"
//! );
//! ```

pub mod config;
pub mod document;
pub mod engine;
pub mod fs;
pub mod pattern;
pub mod rule;
pub mod runner;
pub mod safety;

// Re-exports
pub use config::{load_from_path, load_from_str, CompiledRuleSet, ConfigError, RuleSet};
pub use document::Document;
pub use engine::{
    apply, apply_rule, locate, EditKind, PipelineError, PipelineOutcome, Position,
    RuleApplication, RuleError, RuleOutcome,
};
pub use fs::{commit, read_source, FsError, Source};
pub use pattern::AnchorPattern;
pub use rule::{Guard, IndentPolicy, Lookahead, Operation, PatchRule};
pub use runner::{run, RuleReport, RunOptions, RunOutcome};
pub use safety::{RootGuard, SafetyError};
