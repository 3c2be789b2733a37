//! Locating tables inside free-form tool output.
//!
//! Cluster tools print banners, separators and footers around the rows we
//! care about. A table is found through its marker line; the number of lines
//! skipped from the marker on is fixed per tool. A missing marker is an
//! error, never a guess at an offset.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected output format from {tool}: {reason}")]
pub struct ParseError {
    pub tool: &'static str,
    pub reason: String,
}

impl ParseError {
    pub fn new(tool: &'static str, reason: impl Into<String>) -> Self {
        Self {
            tool,
            reason: reason.into(),
        }
    }
}

/// Anchor of a table inside a tool's output.
#[derive(Clone, Copy)]
pub struct Marker {
    pub description: &'static str,
    pub matches: fn(&str) -> bool,
    /// Lines dropped starting at the marker line itself.
    pub skip: usize,
}

impl Marker {
    /// Index of the marker line.
    pub fn find(&self, lines: &[&str]) -> Option<usize> {
        lines.iter().position(|line| (self.matches)(line))
    }

    /// Lines following the marker and its fixed header, up to the end.
    pub fn rows<'a>(&self, tool: &'static str, text: &'a str) -> Result<Vec<&'a str>, ParseError> {
        let lines: Vec<&str> = text.lines().collect();
        let start = self.find(&lines).ok_or_else(|| {
            ParseError::new(tool, format!("marker line `{}` not found", self.description))
        })?;
        Ok(lines.into_iter().skip(start + self.skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: Marker = Marker {
        description: "HEADER",
        matches: |line| line.contains("HEADER"),
        skip: 2,
    };

    #[test]
    fn rows_start_after_the_skipped_lines() {
        let text = "banner\nHEADER\n-----\nrow 1\nrow 2\n";
        assert_eq!(HEADER.rows("tool", text).unwrap(), vec!["row 1", "row 2"]);
    }

    #[test]
    fn missing_marker_is_an_error() {
        let err = HEADER.rows("tool", "row 1\nrow 2\n").unwrap_err();
        assert_eq!(err.tool, "tool");
        assert!(err.reason.contains("HEADER"));
    }

    #[test]
    fn marker_on_the_last_line_yields_no_rows() {
        assert!(HEADER.rows("tool", "HEADER").unwrap().is_empty());
    }
}
