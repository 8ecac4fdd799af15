//! Semver gating for rule sets.
//!
//! A rule set written against one revision of a project is often wrong for
//! another; `version-range` in the metadata lets a set declare which target
//! versions it applies to.

use semver::{Version, VersionReq};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum VersionError {
    #[error("invalid target version '{value}': {message}")]
    InvalidVersion { value: String, message: String },

    #[error("invalid version range '{value}': {message}")]
    InvalidRange { value: String, message: String },
}

/// Check a target version against a rule set's declared range.
///
/// `None` and blank ranges apply to every version.
///
/// ```
/// use anchorpatch::config::version::matches_range;
///
/// assert!(matches_range("0.4.1", Some(">=0.3, <0.5")).unwrap());
/// assert!(!matches_range("0.5.0", Some(">=0.3, <0.5")).unwrap());
/// assert!(matches_range("1.0.0", None).unwrap());
/// ```
pub fn matches_range(version: &str, range: Option<&str>) -> Result<bool, VersionError> {
    let Some(range) = range.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(true);
    };

    let version = Version::parse(version).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        message: e.to_string(),
    })?;
    let requirement = VersionReq::parse(range).map_err(|e| VersionError::InvalidRange {
        value: range.to_string(),
        message: e.to_string(),
    })?;

    Ok(requirement.matches(&version))
}
