//! Named-entity recognition over the incoming question.
//!
//! Backends produce either token-level predictions, which are grouped here
//! into entity spans, or spans directly. The orchestrator only ever sees the
//! resulting [`EntityMap`].

pub mod dictionary;
pub mod remote;

use crate::config::NerConfig;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Entity label -> recognized surface text. Last span wins per label.
pub type EntityMap = BTreeMap<String, String>;

#[derive(Debug)]
pub enum EntityError {
    ModelUnavailable(String),
    InferenceError(String),
    ConfigError(String),
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::ModelUnavailable(msg) => write!(f, "NER model unavailable: {}", msg),
            EntityError::InferenceError(msg) => write!(f, "NER inference error: {}", msg),
            EntityError::ConfigError(msg) => write!(f, "NER configuration error: {}", msg),
        }
    }
}

impl Error for EntityError {}

/// A single token as classified by a token-classification model.
///
/// `start`/`end` are character offsets into the question when the model
/// reports them.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPrediction {
    pub label: String,
    pub word: String,
    pub start: Option<usize>,
    pub end: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpan {
    pub label: String,
    pub text: String,
}

#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, EntityError>;
}

pub struct EntityExtractor {
    recognizer: Box<dyn EntityRecognizer + Send + Sync>,
}

impl EntityExtractor {
    pub fn new(config: &NerConfig) -> Result<Self, EntityError> {
        let recognizer: Box<dyn EntityRecognizer + Send + Sync> = match config.backend.as_str() {
            "dictionary" => {
                let path = config.model_path.as_ref().ok_or_else(|| {
                    EntityError::ConfigError(
                        "model_path is required for the dictionary backend".to_string(),
                    )
                })?;
                Box::new(dictionary::DictionaryRecognizer::load(
                    path,
                    config.similarity_threshold,
                )?)
            }
            "remote" => Box::new(remote::RemoteRecognizer::new(config)?),
            _ => {
                return Err(EntityError::ConfigError(format!(
                    "Unsupported NER backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { recognizer })
    }

    pub fn from_recognizer(recognizer: Box<dyn EntityRecognizer + Send + Sync>) -> Self {
        Self { recognizer }
    }

    /// Runs the recognizer and folds its spans into an [`EntityMap`].
    /// A question without entities yields an empty map.
    pub async fn extract(&self, question: &str) -> Result<EntityMap, EntityError> {
        let spans = self.recognizer.recognize(question).await?;
        Ok(spans
            .into_iter()
            .map(|span| (span.label, span.text))
            .collect())
    }
}

/// Splits `B-ORG` style labels into (starts a new entity, bare label).
/// Returns `None` for the outside label `O`.
fn split_label(label: &str) -> Option<(bool, &str)> {
    if label.is_empty() || label == "O" {
        return None;
    }
    match label.split_once(['-', '_']) {
        Some((prefix, bare)) if matches!(prefix, "B" | "I" | "E" | "S") => {
            Some((matches!(prefix, "B" | "S"), bare))
        }
        _ => Some((false, label)),
    }
}

/// Merges adjacent tokens that share a label into entity spans.
///
/// A token whose label carries a `B-`/`S-` prefix always opens a new span;
/// `O` tokens close the current one.
pub fn group_entities(question: &str, tokens: &[TokenPrediction]) -> Vec<EntitySpan> {
    let mut spans = Vec::new();
    let mut current: Option<(&str, Vec<&TokenPrediction>)> = None;

    for token in tokens {
        match split_label(&token.label) {
            None => {
                if let Some((label, group)) = current.take() {
                    spans.push(build_span(question, label, &group));
                }
            }
            Some((begins, label)) => {
                let continues =
                    !begins && matches!(&current, Some((open, _)) if *open == label);
                if continues {
                    if let Some((_, group)) = current.as_mut() {
                        group.push(token);
                    }
                } else {
                    if let Some((open, group)) = current.take() {
                        spans.push(build_span(question, open, &group));
                    }
                    current = Some((label, vec![token]));
                }
            }
        }
    }

    if let Some((label, group)) = current {
        spans.push(build_span(question, label, &group));
    }

    spans
}

fn build_span(question: &str, label: &str, group: &[&TokenPrediction]) -> EntitySpan {
    let from_offsets = match (group.first().and_then(|t| t.start), group.last().and_then(|t| t.end)) {
        (Some(start), Some(end)) => char_slice(question, start, end),
        _ => None,
    };

    let text = match from_offsets {
        Some(text) => text.trim().to_string(),
        None => join_words(group),
    };

    EntitySpan {
        label: label.to_string(),
        text,
    }
}

fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start >= end {
        return None;
    }
    let byte_at = |idx: usize| {
        text.char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .nth(idx)
    };
    Some(&text[byte_at(start)?..byte_at(end)?])
}

// WordPiece continuations are glued, SentencePiece word starts get a space.
fn join_words(group: &[&TokenPrediction]) -> String {
    let mut text = String::new();
    for token in group {
        if let Some(rest) = token.word.strip_prefix("##") {
            text.push_str(rest);
        } else if let Some(rest) = token.word.strip_prefix('\u{2581}') {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(rest);
        } else {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&token.word);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(label: &str, word: &str) -> TokenPrediction {
        TokenPrediction {
            label: label.to_string(),
            word: word.to_string(),
            start: None,
            end: None,
        }
    }

    #[test]
    fn adjacent_tokens_with_same_label_merge() {
        let tokens = vec![
            token("B-MICROBE", "Klebsiella"),
            token("I-MICROBE", "pneumoniae"),
            token("O", "resistant"),
            token("B-DRUG", "mero"),
            token("I-DRUG", "##penem"),
        ];

        let spans = group_entities("", &tokens);
        assert_eq!(
            spans,
            vec![
                EntitySpan {
                    label: "MICROBE".to_string(),
                    text: "Klebsiella pneumoniae".to_string()
                },
                EntitySpan {
                    label: "DRUG".to_string(),
                    text: "meropenem".to_string()
                },
            ]
        );
    }

    #[test]
    fn begin_prefix_splits_same_label() {
        let tokens = vec![token("B-DRUG", "ampicillin"), token("B-DRUG", "cefazolin")];
        let spans = group_entities("", &tokens);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].text, "cefazolin");
    }

    #[test]
    fn unprefixed_labels_merge_until_label_changes() {
        let tokens = vec![
            token("DATE", "지난"),
            token("DATE", "달"),
            token("MICROBE", "대장균"),
        ];
        let spans = group_entities("", &tokens);
        assert_eq!(spans[0].text, "지난 달");
        assert_eq!(spans[1].label, "MICROBE");
    }

    #[test]
    fn offsets_slice_question_by_characters() {
        let question = "지난달 대장균 검출 건수는?";
        let tokens = vec![
            TokenPrediction {
                label: "B-MICROBE".to_string(),
                word: "대장".to_string(),
                start: Some(4),
                end: Some(6),
            },
            TokenPrediction {
                label: "I-MICROBE".to_string(),
                word: "##균".to_string(),
                start: Some(6),
                end: Some(7),
            },
        ];

        let spans = group_entities(question, &tokens);
        assert_eq!(spans[0].text, "대장균");
    }

    #[test]
    fn out_of_range_offsets_fall_back_to_words() {
        let tokens = vec![TokenPrediction {
            label: "B-DRUG".to_string(),
            word: "\u{2581}vancomycin".to_string(),
            start: Some(40),
            end: Some(50),
        }];
        let spans = group_entities("short", &tokens);
        assert_eq!(spans[0].text, "vancomycin");
    }

    struct FixedRecognizer(Vec<EntitySpan>);

    #[async_trait]
    impl EntityRecognizer for FixedRecognizer {
        async fn recognize(&self, _text: &str) -> Result<Vec<EntitySpan>, EntityError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn duplicate_labels_keep_last_span() {
        let extractor = EntityExtractor::from_recognizer(Box::new(FixedRecognizer(vec![
            EntitySpan {
                label: "DRUG".to_string(),
                text: "ampicillin".to_string(),
            },
            EntitySpan {
                label: "DRUG".to_string(),
                text: "cefazolin".to_string(),
            },
        ])));

        let entities = extractor.extract("ampicillin vs cefazolin").await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities["DRUG"], "cefazolin");
    }

    #[tokio::test]
    async fn no_entities_is_an_empty_map() {
        let extractor = EntityExtractor::from_recognizer(Box::new(FixedRecognizer(vec![])));
        let entities = extractor.extract("안녕하세요").await.unwrap();
        assert!(entities.is_empty());
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let config = NerConfig {
            backend: "transformers".to_string(),
            ..NerConfig::default()
        };
        assert!(matches!(
            EntityExtractor::new(&config),
            Err(EntityError::ConfigError(_))
        ));
    }
}
