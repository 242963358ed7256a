//! Isolates one SQL statement from free-form model output.
//!
//! Priority is fixed: a fenced ```` ```sql ```` block wins outright; otherwise
//! the response is flattened to one line and scanned for a `SELECT` span.
//! Anything else is an [`ExtractionFailure`], which callers treat as a normal
//! outcome.

use crate::sql::{is_word_char, keyword_at, QuoteState};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, warn};

pub const EXTRACTION_FAILURE_MESSAGE: &str = "SQL 쿼리를 추출하지 못했습니다.";

// Clauses that end a statement. Matched only at parenthesis depth 0.
static TERMINAL_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:WHERE\s+ROWNUM\s*(?:<=|<|=)\s*\d+|FETCH\s+(?:FIRST|NEXT)\s+\d+\s+ROWS?\s+ONLY|LIMIT\s+\d+)",
    )
    .expect("terminal clause pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    FencedBlock,
    StatementSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCandidate {
    pub sql: String,
    pub source: CandidateSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionFailure;

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(EXTRACTION_FAILURE_MESSAGE)
    }
}

pub fn extract_sql(response: &str) -> Result<SqlCandidate, ExtractionFailure> {
    if let Some(body) = fenced_sql_block(response) {
        debug!("Extracted SQL from fenced block");
        return Ok(SqlCandidate {
            sql: body.trim().to_string(),
            source: CandidateSource::FencedBlock,
        });
    }

    let flattened: String = response
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    match statement_span(&flattened) {
        Some(span) => {
            debug!("Extracted SQL by statement span");
            Ok(SqlCandidate {
                sql: span.to_string(),
                source: CandidateSource::StatementSpan,
            })
        }
        None => {
            warn!("No SELECT statement found in model response");
            Err(ExtractionFailure)
        }
    }
}

/// Interior of the first fence whose info string is `sql`. Fences with any
/// other info string are skipped together with their closing fence.
fn fenced_sql_block(response: &str) -> Option<&str> {
    let mut from = 0;

    while let Some(found) = response[from..].find("```") {
        let info_start = from + found + 3;
        let line_end = info_start + response[info_start..].find('\n')?;
        let body_start = line_end + 1;
        let close = body_start + response[body_start..].find("```")?;

        if response[info_start..line_end].trim().eq_ignore_ascii_case("sql") {
            return Some(&response[body_start..close]);
        }
        from = close + 3;
    }

    None
}

fn find_select(text: &str) -> Option<usize> {
    text.char_indices().map(|(i, _)| i).find(|&i| {
        keyword_at(text, i, "SELECT")
            && text[i + "SELECT".len()..]
                .chars()
                .next()
                .is_some_and(char::is_whitespace)
    })
}

/// Scans from the first `SELECT` to the first semicolon, code fence or
/// terminal row-limiting clause, whichever comes first, else end of text.
fn statement_span(text: &str) -> Option<&str> {
    let start = find_select(text)?;
    let mut quotes = QuoteState::default();
    let mut depth = 0usize;
    let mut end = text.len();

    for (offset, c) in text[start..].char_indices() {
        let at = start + offset;
        let is_opener = matches!(c, '\'' | '"') && !quotes.is_open();
        if (!is_opener || opens_quoted(text, at, c)) && !quotes.advance(c) {
            continue;
        }

        match c {
            ';' => {
                end = at;
                break;
            }
            '`' if text[at..].starts_with("```") => {
                end = at;
                break;
            }
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && is_word_start(text, at) => {
                if let Some(clause) = TERMINAL_CLAUSE.find(&text[at..]) {
                    end = at + clause.end();
                    break;
                }
            }
            _ => {}
        }
    }

    Some(text[start..end].trim().trim_end_matches(';').trim_end())
}

/// Whether the quote at `at` starts a literal rather than being prose.
///
/// An apostrophe glued to a word (`That's`) is prose unless the word is a
/// one-letter literal prefix such as `N'..'` or `E'..'`. An opener without
/// a closing quote is prose as well.
fn opens_quoted(text: &str, at: usize, quote: char) -> bool {
    let mut before = text[..at].chars().rev();
    let glued = match before.next() {
        Some(prev) if is_word_char(prev) => {
            let prefix = matches!(prev.to_ascii_uppercase(), 'N' | 'E' | 'X' | 'B');
            !(quote == '\'' && prefix && before.next().is_none_or(|c| !is_word_char(c)))
        }
        _ => false,
    };
    !glued && text[at + quote.len_utf8()..].contains(quote)
}

fn is_word_start(text: &str, at: usize) -> bool {
    text[..at].chars().next_back().is_none_or(|c| !is_word_char(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(response: &str) -> String {
        extract_sql(response).unwrap().sql
    }

    #[test]
    fn fenced_block_is_returned_trimmed() {
        let response = "```sql\nSELECT COUNT(*) AS cnt FROM V_PROCESSED_MICROBE WHERE \"동정균주명\" = '대장균' AND \"검사시행일시\" >= ADD_MONTHS(TRUNC(SYSDATE, 'MM'), -1)\n```";
        let candidate = extract_sql(response).unwrap();
        assert_eq!(
            candidate.sql,
            "SELECT COUNT(*) AS cnt FROM V_PROCESSED_MICROBE WHERE \"동정균주명\" = '대장균' AND \"검사시행일시\" >= ADD_MONTHS(TRUNC(SYSDATE, 'MM'), -1)"
        );
        assert_eq!(candidate.source, CandidateSource::FencedBlock);
    }

    #[test]
    fn fenced_block_beats_select_in_prose() {
        let response = "You could try SELECT * FROM everything; but better:\n```sql\nSELECT ID FROM V_MEDICAL_CODEBOOK\n```\nDone.";
        assert_eq!(extract(response), "SELECT ID FROM V_MEDICAL_CODEBOOK");
    }

    #[test]
    fn fenced_block_keeps_interior_verbatim() {
        let response = "```SQL\r\n  SELECT a\n  FROM t;\n```";
        assert_eq!(extract(response), "SELECT a\n  FROM t;");
    }

    #[test]
    fn other_fences_are_skipped() {
        let response = "```text\nSELECT not this\n```\nand\n```sql\nSELECT this\n```";
        assert_eq!(extract(response), "SELECT this");
    }

    #[test]
    fn unclosed_fence_falls_back_to_span() {
        let response = "```sql\nSELECT a FROM t; trailing";
        let candidate = extract_sql(response).unwrap();
        assert_eq!(candidate.sql, "SELECT a FROM t");
        assert_eq!(candidate.source, CandidateSource::StatementSpan);
    }

    #[test]
    fn span_stops_at_first_semicolon() {
        let response = "Here is the query:\nSELECT a,\n  b FROM t\nWHERE x = 1; This returns a and b.";
        assert_eq!(extract(response), "SELECT a,   b FROM t WHERE x = 1");
    }

    #[test]
    fn span_is_case_insensitive() {
        assert_eq!(extract("query: select 1 from dual;"), "select 1 from dual");
    }

    #[test]
    fn span_includes_terminal_row_limit() {
        assert_eq!(
            extract("SELECT * FROM t ORDER BY x LIMIT 5 which gives the top five"),
            "SELECT * FROM t ORDER BY x LIMIT 5"
        );
        assert_eq!(
            extract("SELECT * FROM t FETCH FIRST 10 ROWS ONLY and more text"),
            "SELECT * FROM t FETCH FIRST 10 ROWS ONLY"
        );
        assert_eq!(
            extract("SELECT * FROM t WHERE ROWNUM = 1 그리고 설명"),
            "SELECT * FROM t WHERE ROWNUM = 1"
        );
    }

    #[test]
    fn nested_row_limit_does_not_end_statement() {
        let response = "SELECT * FROM (SELECT \"동정균주명\", COUNT(*) AS cnt FROM V_PROCESSED_MICROBE GROUP BY \"동정균주명\" ORDER BY cnt DESC) WHERE ROWNUM <= 5 위 쿼리는 상위 5개를 반환합니다";
        assert_eq!(
            extract(response),
            "SELECT * FROM (SELECT \"동정균주명\", COUNT(*) AS cnt FROM V_PROCESSED_MICROBE GROUP BY \"동정균주명\" ORDER BY cnt DESC) WHERE ROWNUM <= 5"
        );
    }

    #[test]
    fn quoted_semicolon_is_not_a_terminator() {
        assert_eq!(
            extract("SELECT * FROM t WHERE note = 'a;b'; done"),
            "SELECT * FROM t WHERE note = 'a;b'"
        );
    }

    #[test]
    fn apostrophe_in_trailing_prose_does_not_hide_semicolon() {
        assert_eq!(
            extract("SELECT name FROM t\nThat's all; ignore the rest"),
            "SELECT name FROM t That's all"
        );
        assert_eq!(
            extract("SELECT COUNT(*) AS cnt FROM t; I don't think it's slow; really"),
            "SELECT COUNT(*) AS cnt FROM t"
        );
    }

    #[test]
    fn unterminated_quote_is_treated_as_text() {
        assert_eq!(
            extract("SELECT * FROM t WHERE a = 'x; trailing words"),
            "SELECT * FROM t WHERE a = 'x"
        );
    }

    #[test]
    fn prefixed_literal_still_hides_semicolon() {
        assert_eq!(
            extract("SELECT * FROM t WHERE a = N'x;y'; done"),
            "SELECT * FROM t WHERE a = N'x;y'"
        );
    }

    #[test]
    fn span_runs_to_end_without_terminator() {
        assert_eq!(extract("SELECT a FROM t\n"), "SELECT a FROM t");
    }

    #[test]
    fn bare_fence_ends_span() {
        assert_eq!(extract("```\nSELECT a FROM t\n```"), "SELECT a FROM t");
    }

    #[test]
    fn prose_without_select_fails() {
        assert_eq!(
            extract_sql("죄송하지만 해당 질문에는 답할 수 없습니다."),
            Err(ExtractionFailure)
        );
        assert_eq!(extract_sql(""), Err(ExtractionFailure));
        assert_eq!(extract_sql("The selection is empty"), Err(ExtractionFailure));
    }

    #[test]
    fn failure_message_is_fixed() {
        assert_eq!(ExtractionFailure.to_string(), EXTRACTION_FAILURE_MESSAGE);
    }
}
