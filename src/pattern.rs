use regex::Regex;
use std::fmt;

/// A predicate over a single line, used to locate edit sites.
///
/// Matching is textual, not structural: a pattern knows nothing about
/// nesting or balanced delimiters. That bound is deliberate; exact
/// matching and ambiguity detection compensate for the missing grammar.
#[derive(Debug, Clone)]
pub enum AnchorPattern {
    /// Matches when the line contains this exact substring.
    Substring(String),
    /// Matches when the compiled regex finds a match anywhere in the line.
    Regex(Regex),
}

impl AnchorPattern {
    pub fn substring(needle: impl Into<String>) -> Self {
        AnchorPattern::Substring(needle.into())
    }

    /// Compile a regex pattern. Compilation happens once here, never in the
    /// engine's scan loop.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(AnchorPattern::Regex(Regex::new(pattern)?))
    }

    pub fn matches(&self, line: &str) -> bool {
        match self {
            AnchorPattern::Substring(needle) => line.contains(needle.as_str()),
            AnchorPattern::Regex(re) => re.is_match(line),
        }
    }
}

impl fmt::Display for AnchorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorPattern::Substring(needle) => write!(f, "contains {needle:?}"),
            AnchorPattern::Regex(re) => write!(f, "regex /{}/", re.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_match() {
        let pattern = AnchorPattern::substring("Type: Api");
        assert!(pattern.matches("      Type: Api"));
        assert!(!pattern.matches("      Type: Function"));
    }

    #[test]
    fn test_substring_is_not_anchored() {
        let pattern = AnchorPattern::substring("Properties:");
        assert!(pattern.matches("  Properties: # trailing comment"));
    }

    #[test]
    fn test_regex_match() {
        let pattern = AnchorPattern::regex(r"^\s*Type: Api$").unwrap();
        assert!(pattern.matches("      Type: Api"));
        assert!(!pattern.matches("      Type: Api  # no"));
    }

    #[test]
    fn test_regex_rejects_invalid_pattern() {
        assert!(AnchorPattern::regex("(unclosed").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AnchorPattern::substring("x").to_string(),
            "contains \"x\""
        );
        assert_eq!(
            AnchorPattern::regex("^x$").unwrap().to_string(),
            "regex /^x$/"
        );
    }
}
