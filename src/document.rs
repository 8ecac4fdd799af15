use std::fmt;

/// An ordered sequence of text lines, indexed from 0.
///
/// A `Document` is the unit the patch engine operates on. Engine operations
/// take `&Document` and return a new `Document`; callers never observe
/// in-place mutation. Conversion to and from raw text is lossless: the
/// presence of a trailing newline is recorded so `to_text` reproduces the
/// input byte-for-byte.
///
/// Lines are split on `\n` only. A trailing `\r` stays part of the line
/// content; mixed line-ending repair is not this crate's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl Document {
    /// Parse raw text into a document.
    pub fn from_text(text: &str) -> Self {
        if text.is_empty() {
            return Self {
                lines: Vec::new(),
                trailing_newline: false,
            };
        }

        let trailing_newline = text.ends_with('\n');
        let body = if trailing_newline {
            &text[..text.len() - 1]
        } else {
            text
        };

        Self {
            lines: body.split('\n').map(str::to_string).collect(),
            trailing_newline,
        }
    }

    /// Construct a document directly from lines, assuming a trailing newline.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            trailing_newline: true,
        }
    }

    /// Render the document back to text.
    pub fn to_text(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Leading whitespace of the given line, or `""` when the line does not
    /// exist. Character-for-character, so tabs are preserved as tabs.
    pub fn indent_of(&self, index: usize) -> &str {
        match self.lines.get(index) {
            Some(line) => {
                let end = line
                    .char_indices()
                    .find(|(_, c)| !c.is_whitespace())
                    .map_or(line.len(), |(i, _)| i);
                &line[..end]
            }
            None => "",
        }
    }

    /// Insert lines so that the first inserted line lands at `index`.
    pub(crate) fn insert_lines(&mut self, index: usize, lines: Vec<String>) {
        self.lines.splice(index..index, lines);
    }

    /// Replace the run `[start, start + removed)` with the given lines.
    pub(crate) fn replace_run(&mut self, start: usize, removed: usize, lines: Vec<String>) {
        self.lines.splice(start..start + removed, lines);
    }

    /// Remove the given line indices. Indices must be sorted ascending.
    pub(crate) fn remove_indices(&mut self, indices: &[usize]) {
        for &index in indices.iter().rev() {
            self.lines.remove(index);
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_trailing_newline() {
        let text = "a\nb\nc\n";
        assert_eq!(Document::from_text(text).to_text(), text);
    }

    #[test]
    fn test_round_trip_without_trailing_newline() {
        let text = "a\nb\nc";
        assert_eq!(Document::from_text(text).to_text(), text);
    }

    #[test]
    fn test_round_trip_empty() {
        assert_eq!(Document::from_text("").to_text(), "");
        assert!(Document::from_text("").is_empty());
    }

    #[test]
    fn test_round_trip_blank_lines() {
        let text = "a\n\n\nb\n";
        let doc = Document::from_text(text);
        assert_eq!(doc.len(), 4);
        assert_eq!(doc.to_text(), text);
    }

    #[test]
    fn test_indent_of() {
        let doc = Document::from_text("none\n  two\n\ttab\n");
        assert_eq!(doc.indent_of(0), "");
        assert_eq!(doc.indent_of(1), "  ");
        assert_eq!(doc.indent_of(2), "\t");
        assert_eq!(doc.indent_of(99), "");
    }

    #[test]
    fn test_indent_of_whitespace_only_line() {
        let doc = Document::from_text("   \n");
        assert_eq!(doc.indent_of(0), "   ");
    }

    #[test]
    fn test_insert_lines() {
        let mut doc = Document::from_text("a\nc\n");
        doc.insert_lines(1, vec!["b".to_string()]);
        assert_eq!(doc.to_text(), "a\nb\nc\n");
    }

    #[test]
    fn test_replace_run() {
        let mut doc = Document::from_text("a\nb\nc\nd\n");
        doc.replace_run(1, 2, vec!["x".to_string()]);
        assert_eq!(doc.to_text(), "a\nx\nd\n");
    }

    #[test]
    fn test_remove_indices() {
        let mut doc = Document::from_text("a\nb\nc\nd\n");
        doc.remove_indices(&[1, 3]);
        assert_eq!(doc.to_text(), "a\nc\n");
    }
}
