pub mod loader;
pub mod schema;
pub mod version;

pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    CompiledRuleSet, FileRules, Metadata, RuleSet, ValidationError, ValidationIssue,
};
pub use version::{matches_range, VersionError};
