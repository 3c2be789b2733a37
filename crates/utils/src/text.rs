//! Field normalizers shared by the table parsers.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ABSOLUTE_PATH: Regex =
        Regex::new(r"(^|[\s'\x22(=])(?:/[^/\s:'\x22()]+)+/([^/\s:'\x22()]+)").unwrap();
}

/// Keep only digits and dots, then parse.
///
/// `"2.5TB"` is `Some(2.5)`, `"1,024"` is `Some(1024.0)`. Empty or unparseable
/// input is `None`; the caller decides on the default.
pub fn clean_number(text: Option<&str>) -> Option<f64> {
    let cleaned: String = text?
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Whitespace separated fields.
pub fn fields(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Cells of a `|` bordered table row, trimmed.
///
/// Only the border segment on each side is dropped, so an empty interior or
/// final cell still counts towards the row's width.
pub fn pipe_cells(line: &str) -> Vec<&str> {
    let mut cells: Vec<&str> = line.split('|').map(str::trim).collect();
    if cells.first().is_some_and(|cell| cell.is_empty()) {
        cells.remove(0);
    }
    if line.trim_end().ends_with('|') && cells.last().is_some_and(|cell| cell.is_empty()) {
        cells.pop();
    }
    cells
}

/// Replace absolute paths with their last component.
///
/// Used on tool output that is echoed back to API clients.
pub fn redact_paths(text: &str) -> String {
    ABSOLUTE_PATH.replace_all(text, "${1}${2}").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_number_strips_units() {
        assert_eq!(clean_number(Some("2.5TB")), Some(2.5));
        assert_eq!(clean_number(Some(" 5000.00 ")), Some(5000.0));
        assert_eq!(clean_number(Some("1,024")), Some(1024.0));
    }

    #[test]
    fn clean_number_has_no_default() {
        assert_eq!(clean_number(Some("")), None);
        assert_eq!(clean_number(None), None);
        assert_eq!(clean_number(Some("N/A")), None);
        assert_eq!(clean_number(Some("1.2.3")), None);
    }

    #[test]
    fn pipe_cells_drop_only_the_borders() {
        assert_eq!(
            pipe_cells("| 12345 | 2024 |  Y | 5.0 |"),
            vec!["12345", "2024", "Y", "5.0"]
        );
        assert_eq!(pipe_cells("| a |  | c |   |"), vec!["a", "", "c", ""]);
        assert_eq!(pipe_cells("a|b"), vec!["a", "b"]);
        assert!(pipe_cells("").is_empty());
        assert_eq!(pipe_cells("-------------"), vec!["-------------"]);
    }

    #[test]
    fn redacts_absolute_paths() {
        assert_eq!(
            redact_paths("/sw/local/bin/myproject: account 12 not found"),
            "myproject: account 12 not found"
        );
        assert_eq!(
            redact_paths("cannot open '/scratch/user/jdoe/venvs/meta.json'"),
            "cannot open 'meta.json'"
        );
        assert_eq!(redact_paths("no paths here"), "no paths here");
        assert_eq!(redact_paths("cpus 10/20/0/30"), "cpus 10/20/0/30");
    }
}
