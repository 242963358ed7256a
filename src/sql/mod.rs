pub mod extractor;
pub mod validator;

/// Tracks whether a character stream is inside a quoted region.
///
/// `'...'` literals and `"..."` identifiers; doubled quotes toggle twice and
/// so need no special casing.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct QuoteState {
    single: bool,
    double: bool,
}

impl QuoteState {
    pub(crate) fn is_open(&self) -> bool {
        self.single || self.double
    }

    /// Feeds one character. Returns true when `c` is outside any quotes.
    pub(crate) fn advance(&mut self, c: char) -> bool {
        if self.single {
            if c == '\'' {
                self.single = false;
            }
            return false;
        }
        if self.double {
            if c == '"' {
                self.double = false;
            }
            return false;
        }
        match c {
            '\'' => {
                self.single = true;
                false
            }
            '"' => {
                self.double = true;
                false
            }
            _ => true,
        }
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True when `text[at..]` starts with `keyword` (ASCII, case-insensitive)
/// as a whole word.
pub(crate) fn keyword_at(text: &str, at: usize, keyword: &str) -> bool {
    let Some(candidate) = text.get(at..at + keyword.len()) else {
        return false;
    };
    if !candidate.eq_ignore_ascii_case(keyword) {
        return false;
    }
    let before_ok = text[..at].chars().next_back().is_none_or(|c| !is_word_char(c));
    let after_ok = text[at + keyword.len()..]
        .chars()
        .next()
        .is_none_or(|c| !is_word_char(c));
    before_ok && after_ok
}
