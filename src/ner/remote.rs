use crate::config::NerConfig;
use crate::ner::{group_entities, EntityError, EntityRecognizer, EntitySpan, TokenPrediction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Token-classification model served over HTTP in the Hugging Face
/// inference format.
pub struct RemoteRecognizer {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Serialize)]
struct ClassificationRequest<'a> {
    inputs: &'a str,
}

#[derive(Deserialize, Debug)]
struct RawPrediction {
    entity_group: Option<String>,
    entity: Option<String>,
    word: String,
    start: Option<usize>,
    end: Option<usize>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ClassificationResponse {
    Flat(Vec<RawPrediction>),
    Batched(Vec<Vec<RawPrediction>>),
}

impl RemoteRecognizer {
    pub fn new(config: &NerConfig) -> Result<Self, EntityError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            EntityError::ConfigError("api_url is required for the remote NER backend".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EntityError::ModelUnavailable(e.to_string()))?;

        Ok(Self { client, api_url })
    }
}

#[async_trait]
impl EntityRecognizer for RemoteRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, EntityError> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&ClassificationRequest { inputs: text })
            .send()
            .await
            .map_err(|e| EntityError::InferenceError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            error!("NER endpoint responded with status code: {}", status);
            return Err(EntityError::InferenceError(format!(
                "NER endpoint responded with status code: {}",
                status
            )));
        }

        let predictions = match response
            .json::<ClassificationResponse>()
            .await
            .map_err(|e| EntityError::InferenceError(e.to_string()))?
        {
            ClassificationResponse::Flat(predictions) => predictions,
            ClassificationResponse::Batched(batches) => {
                batches.into_iter().next().unwrap_or_default()
            }
        };
        debug!("NER endpoint returned {} predictions", predictions.len());

        // Already aggregated server-side
        if predictions.iter().any(|p| p.entity_group.is_some()) {
            return Ok(predictions
                .into_iter()
                .filter_map(|p| {
                    Some(EntitySpan {
                        label: p.entity_group?,
                        text: p.word.trim().to_string(),
                    })
                })
                .collect());
        }

        let tokens: Vec<TokenPrediction> = predictions
            .into_iter()
            .map(|p| TokenPrediction {
                label: p.entity.unwrap_or_else(|| "O".to_string()),
                word: p.word,
                start: p.start,
                end: p.end,
            })
            .collect();

        Ok(group_entities(text, &tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn serve(body: Value) -> String {
        let app = Router::new().route(
            "/ner",
            post(move |Json(request): Json<Value>| {
                let body = body.clone();
                async move {
                    assert!(request["inputs"].is_string());
                    Json(body)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/ner", addr)
    }

    fn recognizer(api_url: String) -> RemoteRecognizer {
        RemoteRecognizer::new(&NerConfig {
            backend: "remote".to_string(),
            api_url: Some(api_url),
            ..NerConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn token_level_predictions_are_grouped() {
        let url = serve(json!([
            {"entity": "B-MICROBE", "word": "대장", "start": 4, "end": 6, "score": 0.98},
            {"entity": "I-MICROBE", "word": "##균", "start": 6, "end": 7, "score": 0.97}
        ]))
        .await;

        let spans = recognizer(url).recognize("지난달 대장균 검출 건수는?").await.unwrap();
        assert_eq!(
            spans,
            vec![EntitySpan {
                label: "MICROBE".to_string(),
                text: "대장균".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn grouped_batched_predictions_are_used_as_is() {
        let url = serve(json!([[
            {"entity_group": "ANTIBIOTIC", "word": "meropenem", "score": 0.91},
            {"entity_group": "MICROBE", "word": "K. pneumoniae", "score": 0.88}
        ]]))
        .await;

        let spans = recognizer(url).recognize("meropenem K. pneumoniae").await.unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].label, "ANTIBIOTIC");
        assert_eq!(spans[1].text, "K. pneumoniae");
    }

    #[test]
    fn missing_url_is_a_config_error() {
        let result = RemoteRecognizer::new(&NerConfig {
            backend: "remote".to_string(),
            ..NerConfig::default()
        });
        assert!(matches!(result, Err(EntityError::ConfigError(_))));
    }
}
