use crate::ner::{group_entities, EntityError, EntityRecognizer, EntitySpan, TokenPrediction};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Local recognizer backed by a `{label: [terms]}` JSON dictionary.
///
/// Whitespace tokens are matched against every term with a normalized edit
/// distance, longest n-gram first, and tagged B-/I- so the shared grouping
/// turns them into spans.
pub struct DictionaryRecognizer {
    terms: Vec<Term>,
    max_words: usize,
    threshold: f64,
}

struct Term {
    label: String,
    text: String,
    lowered: String,
}

struct Token {
    word: String,
    start: usize,
    end: usize,
}

impl DictionaryRecognizer {
    pub fn load(path: &Path, threshold: f64) -> Result<Self, EntityError> {
        info!("Loading NER dictionary from {}", path.display());
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EntityError::ModelUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let dictionary: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw)
            .map_err(|e| EntityError::ModelUnavailable(format!("{}: {}", path.display(), e)))?;

        let recognizer = Self::from_dictionary(dictionary, threshold);
        info!(
            "NER dictionary loaded: {} terms, longest term {} words",
            recognizer.terms.len(),
            recognizer.max_words
        );
        Ok(recognizer)
    }

    pub fn from_dictionary(dictionary: BTreeMap<String, Vec<String>>, threshold: f64) -> Self {
        let terms: Vec<Term> = dictionary
            .into_iter()
            .flat_map(|(label, terms)| {
                terms.into_iter().filter(|t| !t.trim().is_empty()).map(move |text| Term {
                    label: label.clone(),
                    lowered: text.trim().to_lowercase(),
                    text,
                })
            })
            .collect();

        let max_words = terms
            .iter()
            .map(|t| t.lowered.split_whitespace().count())
            .max()
            .unwrap_or(1);

        Self {
            terms,
            max_words,
            threshold,
        }
    }

    fn best_match(&self, candidate: &str, single_token: bool) -> Option<(&Term, f64, bool)> {
        let candidate = candidate.to_lowercase();
        let mut best: Option<(&Term, f64, bool)> = None;

        for term in &self.terms {
            // Korean postpositions ("대장균이", "대장균의") ride on the term.
            let prefixed = single_token
                && term.lowered.chars().count() >= 2
                && candidate.starts_with(&term.lowered)
                && candidate != term.lowered;
            let score = if prefixed {
                100.0
            } else {
                strsim::normalized_levenshtein(&candidate, &term.lowered) * 100.0
            };

            if score >= self.threshold && best.is_none_or(|(_, s, _)| score > s) {
                best = Some((term, score, prefixed));
            }
        }

        best
    }

    fn predict(&self, text: &str) -> Vec<TokenPrediction> {
        let tokens = tokenize(text);
        let mut predictions = Vec::with_capacity(tokens.len());
        let mut pos = 0;

        while pos < tokens.len() {
            let longest = self.max_words.min(tokens.len() - pos);
            let matched = (1..=longest).rev().find_map(|n| {
                let window = &tokens[pos..pos + n];
                let candidate = window
                    .iter()
                    .map(|t| t.word.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                self.best_match(&candidate, n == 1)
                    .map(|found| (n, found))
            });

            match matched {
                Some((n, (term, score, prefixed))) => {
                    debug!(
                        "NER dictionary hit: '{}' -> {} ({:.1})",
                        term.text, term.label, score
                    );
                    for (i, token) in tokens[pos..pos + n].iter().enumerate() {
                        let end = if prefixed {
                            token.start + term.lowered.chars().count()
                        } else {
                            token.end
                        };
                        predictions.push(TokenPrediction {
                            label: format!("{}-{}", if i == 0 { "B" } else { "I" }, term.label),
                            word: token.word.clone(),
                            start: Some(token.start),
                            end: Some(end),
                        });
                    }
                    pos += n;
                }
                None => {
                    let token = &tokens[pos];
                    predictions.push(TokenPrediction {
                        label: "O".to_string(),
                        word: token.word.clone(),
                        start: Some(token.start),
                        end: Some(token.end),
                    });
                    pos += 1;
                }
            }
        }

        predictions
    }
}

#[async_trait]
impl EntityRecognizer for DictionaryRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, EntityError> {
        let predictions = self.predict(text);
        Ok(group_entities(text, &predictions))
    }
}

fn is_edge_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || matches!(c, '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}' | '\u{00B7}' | '\u{2026}')
}

/// Whitespace tokens with surrounding punctuation trimmed, offsets in chars.
fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        let mut start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        let mut end = i;

        while start < end && is_edge_punctuation(chars[start]) {
            start += 1;
        }
        while end > start && is_edge_punctuation(chars[end - 1]) {
            end -= 1;
        }

        if start < end {
            tokens.push(Token {
                word: chars[start..end].iter().collect(),
                start,
                end,
            });
        }
    }

    tokens
}
