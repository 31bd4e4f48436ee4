//! Report analysis utilities
//!
//! Works on the serialized text form of batch reports (and on anything else
//! that carries `Confidence:` labels): confidence extraction and a
//! positional line diff for comparing runs made with different filters.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static CONFIDENCE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Confidence: ([0-9.]+)").expect("confidence pattern is valid")
});

/// Every number that follows a `Confidence:` label, in text order
///
/// Lines without a label are ignored, as are labels followed by something
/// that is not a number (`Confidence: 1.2.3`).
pub fn extract_confidences(text: &str) -> Vec<f64> {
    CONFIDENCE_LABEL
        .captures_iter(text)
        .filter_map(|caps| {
            let raw = &caps[1];
            match raw.parse::<f64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    debug!(raw, "ignoring unparsable confidence value");
                    None
                }
            }
        })
        .collect()
}

/// Which input a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Side::First => "File 1",
            Side::Second => "File 2",
        }
    }
}

/// Two lines at the same position that differ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDifference {
    /// 1-based line number
    pub line: usize,
    pub first: String,
    pub second: String,
}

/// Lines beyond the end of the shorter input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surplus {
    pub side: Side,
    /// 1-based number of the first surplus line
    pub start_line: usize,
    pub lines: Vec<String>,
}

/// Result of a positional comparison of two reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportDiff {
    pub differences: Vec<LineDifference>,
    pub surplus: Option<Surplus>,
}

impl ReportDiff {
    pub fn is_identical(&self) -> bool {
        self.differences.is_empty() && self.surplus.is_none()
    }
}

impl fmt::Display for ReportDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diff in &self.differences {
            writeln!(f, "Difference found at line {}:", diff.line)?;
            writeln!(f, "File 1: {}", diff.first.trim())?;
            writeln!(f, "File 2: {}", diff.second.trim())?;
            writeln!(f)?;
        }

        if let Some(surplus) = &self.surplus {
            writeln!(f, "Additional lines in {}:", surplus.side.label())?;
            for line in &surplus.lines {
                writeln!(f, "{}: {}", surplus.side.label(), line.trim())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Compare two texts line by line, by position
///
/// Reordered entries show up as differences; this is a textual comparison,
/// not a structural one. Line terminators are not part of the comparison.
pub fn diff_lines(first: &str, second: &str) -> ReportDiff {
    let first_lines: Vec<&str> = first.lines().collect();
    let second_lines: Vec<&str> = second.lines().collect();

    let differences = first_lines
        .iter()
        .zip(&second_lines)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, (a, b))| LineDifference {
            line: i + 1,
            first: a.to_string(),
            second: b.to_string(),
        })
        .collect();

    let common = first_lines.len().min(second_lines.len());
    let (side, rest) = if first_lines.len() > common {
        (Side::First, &first_lines[common..])
    } else {
        (Side::Second, &second_lines[common..])
    };
    let surplus = (!rest.is_empty()).then(|| Surplus {
        side,
        start_line: common + 1,
        lines: rest.iter().map(|l| l.to_string()).collect(),
    });

    ReportDiff {
        differences,
        surplus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::average_confidence;

    const REPORT: &str = "File: sign.png\n\
                          Text: ROAD CLOSED, Confidence: 0.9994066640174729\n\
                          Text: DETOUR, Confidence: 0.5\n\
                          \n\
                          File: blank.jpg\n\
                          \n";

    #[test]
    fn test_extract_from_text_report() {
        assert_eq!(extract_confidences(REPORT), vec![0.9994066640174729, 0.5]);
    }

    #[test]
    fn test_extract_ignores_free_form_lines() {
        let text = "Scanning... (1/2)\nconfidence was high\nText: x, Confidence: 0.25\nnoise 0.7\n";
        assert_eq!(extract_confidences(text), vec![0.25]);
    }

    #[test]
    fn test_extract_skips_malformed_numbers() {
        let text = "Text: a, Confidence: 1.2.3\nText: b, Confidence: 0.75\n";
        assert_eq!(extract_confidences(text), vec![0.75]);
    }

    #[test]
    fn test_extract_from_csv_style_cells() {
        let text = "\"Text: a, Confidence: 0.5\",\"Text: b, Confidence: 0.25\"\n";
        assert_eq!(extract_confidences(text), vec![0.5, 0.25]);
    }

    #[test]
    fn test_average_of_extracted_values() {
        assert_eq!(average_confidence(&extract_confidences("")), None);
        assert_eq!(
            average_confidence(&extract_confidences("Text: a, Confidence: 0.42\n")),
            Some(0.42)
        );
    }

    #[test]
    fn test_diff_identical_inputs() {
        let diff = diff_lines(REPORT, REPORT);
        assert!(diff.is_identical());
        assert!(diff.differences.is_empty());
        assert_eq!(diff.surplus, None);
        assert_eq!(diff.to_string(), "");
    }

    #[test]
    fn test_diff_difference_and_surplus_from_second() {
        let diff = diff_lines("a\nb\n", "a\nc\nd\n");

        assert_eq!(
            diff.differences,
            vec![LineDifference {
                line: 2,
                first: "b".to_string(),
                second: "c".to_string(),
            }]
        );
        assert_eq!(
            diff.surplus,
            Some(Surplus {
                side: Side::Second,
                start_line: 3,
                lines: vec!["d".to_string()],
            })
        );
    }

    #[test]
    fn test_diff_surplus_from_first() {
        let diff = diff_lines("a\nb\nc\n", "a\n");
        assert!(diff.differences.is_empty());
        let surplus = diff.surplus.unwrap();
        assert_eq!(surplus.side, Side::First);
        assert_eq!(surplus.lines, vec!["b", "c"]);
    }

    #[test]
    fn test_diff_reordered_entries_are_reported() {
        let diff = diff_lines("File: a.png\nFile: b.png\n", "File: b.png\nFile: a.png\n");
        assert_eq!(diff.differences.len(), 2);
    }

    #[test]
    fn test_diff_display_format() {
        let diff = diff_lines("a\nb\n", "a\nc\nd\n");
        assert_eq!(
            diff.to_string(),
            "Difference found at line 2:\nFile 1: b\nFile 2: c\n\n\
             Additional lines in File 2:\nFile 2: d\n\n"
        );
    }
}
