//! Pattern/field extraction from raw command results.
//!
//! Rule evaluation works on "the matched line", not the matched
//! substring: a match span is bounded to its enclosing line, and the line
//! is split into fields on a separator run.

use indexmap::IndexMap;

use crate::error::ExtractError;
use crate::model::{CommandResult, Pattern};

/// Extract a delimited field from the line enclosing a match span.
///
/// The span is bounded to its line by scanning to the nearest line start
/// and end. The line is split on one-or-more repetitions of `separator`
/// (a run of whitespace when the separator is empty) and the 1-based
/// `field_number` selected; surrounding whitespace and commas are
/// trimmed. An out-of-range field is an error.
pub fn field_value(
    buffer: &[u8],
    span: (usize, usize),
    field_number: usize,
    separator: &str,
) -> Result<String, ExtractError> {
    if field_number == 0 {
        return Err(ExtractError::FieldOutOfRange {
            field_number,
            line: String::new(),
        });
    }
    if span.0 >= buffer.len() {
        return Err(ExtractError::LineBounds { offset: span.0 });
    }

    let line_start = memchr::memrchr(b'\n', &buffer[..span.0])
        .map(|i| i + 1)
        .unwrap_or(0);
    let line_end = memchr::memchr(b'\n', &buffer[span.0..])
        .map(|i| span.0 + i)
        .unwrap_or(buffer.len());
    let line = String::from_utf8_lossy(&buffer[line_start..line_end]).into_owned();

    let sep_pattern = if separator.is_empty() {
        r"\s+".to_string()
    } else {
        format!("[{}]+", regex::escape(separator))
    };
    let sep = regex::Regex::new(&sep_pattern).map_err(|e| ExtractError::Separator {
        separator: separator.to_string(),
        source: e,
    })?;

    let parts: Vec<&str> = sep.split(&line).collect();
    if field_number > parts.len() {
        return Err(ExtractError::FieldOutOfRange {
            field_number,
            line: line.clone(),
        });
    }

    Ok(parts[field_number - 1]
        .trim_matches([' ', '\t', '\n', ','])
        .to_string())
}

/// Observational per-line pattern matching over a command's results.
///
/// Returns, per pattern source, every line containing a match, trimmed of
/// surrounding whitespace. Used by collect-mode health checks; never
/// drives control flow.
pub fn match_lines(
    results: &[CommandResult],
    patterns: &[Pattern],
) -> IndexMap<String, Vec<String>> {
    let mut matches: IndexMap<String, Vec<String>> = IndexMap::new();
    for result in results {
        let text = String::from_utf8_lossy(&result.result);
        for line in text.lines() {
            for pattern in patterns {
                if pattern.regex().is_match(line.as_bytes()) {
                    matches
                        .entry(pattern.source().to_string())
                        .or_default()
                        .push(line.trim_matches([' ', '\t', '\n', '\r']).to_string());
                }
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_of(buffer: &[u8], needle: &[u8]) -> (usize, usize) {
        let start = buffer
            .windows(needle.len())
            .position(|w| w == needle)
            .expect("needle present");
        (start, start + needle.len())
    }

    #[test]
    fn test_field_from_simple_line() {
        let buffer = b"padding before\nA B C\npadding after";
        let span = span_of(buffer, b"B");
        assert_eq!(field_value(buffer, span, 2, " ").unwrap(), "B");
        assert_eq!(field_value(buffer, span, 1, " ").unwrap(), "A");
        assert_eq!(field_value(buffer, span, 3, " ").unwrap(), "C");
    }

    #[test]
    fn test_field_default_separator_is_whitespace_run() {
        let buffer = b"tcp        0      0 0.0.0.0:57800           0.0.0.0:*               LISTEN      34082/emsd";
        let span = span_of(buffer, b"0.0.0.0:57800");
        assert_eq!(field_value(buffer, span, 4, "").unwrap(), "0.0.0.0:57800");
        assert_eq!(field_value(buffer, span, 6, "").unwrap(), "LISTEN");
    }

    #[test]
    fn test_field_with_pipe_separator() {
        let buffer =
            b"| 0/FC4/0   | UP | 1|s123| UP/UP| 4/A | DONE| NRML       | 0| WB    |  1|  0|";
        let span = span_of(buffer, b"0/FC4/0");
        // Field 1 is the empty prefix before the leading separator.
        assert_eq!(field_value(buffer, span, 2, "|").unwrap(), "0/FC4/0");
        assert_eq!(field_value(buffer, span, 3, "|").unwrap(), "UP");
        assert_eq!(field_value(buffer, span, 6, "|").unwrap(), "UP/UP");
        assert_eq!(field_value(buffer, span, 9, "|").unwrap(), "NRML");
    }

    #[test]
    fn test_field_trims_commas() {
        let buffer = b"Metric: 20, tag: 0,";
        let span = span_of(buffer, b"Metric");
        assert_eq!(field_value(buffer, span, 2, " ").unwrap(), "20");
    }

    #[test]
    fn test_field_out_of_range() {
        let buffer = b"A B C";
        let span = span_of(buffer, b"B");
        let err = field_value(buffer, span, 9, " ").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::FieldOutOfRange { field_number: 9, .. }
        ));
    }

    #[test]
    fn test_field_number_zero_is_rejected() {
        let buffer = b"A B C";
        let span = span_of(buffer, b"A");
        assert!(field_value(buffer, span, 0, " ").is_err());
    }

    #[test]
    fn test_match_lines_collects_trimmed_lines() {
        let result = CommandResult {
            cmd: "admin show controller fabric plane all".to_string(),
            result: b"Plane Admin Plane    up->dn  up->mcast
Id    State State    counter   counter
--------------------------------------
0     UP    UP             4         7
1     DN    UP             4        11
2     UP    DN             5        14
3     UP    UP            46         6
5     DN    DN             4         4
"
            .to_vec(),
        };
        let patterns = vec![Pattern::new(r".+?(DN)").unwrap()];
        let matches = match_lines(std::slice::from_ref(&result), &patterns);
        let lines = matches.get(r".+?(DN)").unwrap();
        assert_eq!(
            lines,
            &vec![
                "1     DN    UP             4        11".to_string(),
                "2     UP    DN             5        14".to_string(),
                "5     DN    DN             4         4".to_string(),
            ]
        );
    }

    #[test]
    fn test_match_lines_no_patterns() {
        let result = CommandResult {
            cmd: "show clock".to_string(),
            result: b"12:00:00 UTC\n".to_vec(),
        };
        assert!(match_lines(std::slice::from_ref(&result), &[]).is_empty());
    }
}
