//! Question -> entities + SQL -> rows.

use crate::db::catalog::SchemaCatalog;
use crate::db::executor::{ExecutionError, QueryExecutor, ResultRow};
use crate::llm::prompt::PromptBuilder;
use crate::llm::{LlmError, LlmManager};
use crate::ner::{EntityError, EntityExtractor, EntityMap};
use crate::sql::extractor::extract_sql;
use crate::sql::validator::{SqlValidator, NO_VALID_SQL_MESSAGE};
use serde::Serialize;
use std::error::Error;
use std::fmt;
use tracing::{debug, info, warn};

/// Either the materialized rows or a terminal status for the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryRows {
    Rows(Vec<ResultRow>),
    Status(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub question: String,
    pub entities: EntityMap,
    pub generated_sql: String,
    pub raw_model_answer: String,
    pub rows: QueryRows,
}

#[derive(Debug)]
pub enum PipelineError {
    Entity(EntityError),
    Generation(LlmError),
    Execution(ExecutionError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Entity(e) => write!(f, "{}", e),
            PipelineError::Generation(e) => write!(f, "{}", e),
            PipelineError::Execution(e) => write!(f, "{}", e),
        }
    }
}

impl Error for PipelineError {}

pub struct ChatPipeline {
    entities: EntityExtractor,
    llm: LlmManager,
    catalog: SchemaCatalog,
    prompt: PromptBuilder,
    validator: SqlValidator,
    executor: QueryExecutor,
}

impl ChatPipeline {
    pub fn new(
        entities: EntityExtractor,
        llm: LlmManager,
        catalog: SchemaCatalog,
        prompt: PromptBuilder,
        validator: SqlValidator,
        executor: QueryExecutor,
    ) -> Self {
        Self {
            entities,
            llm,
            catalog,
            prompt,
            validator,
            executor,
        }
    }

    /// Entity extraction and SQL generation run side by side; neither needs
    /// the other's output. Extraction failures and validator rejections are
    /// reported in the payload, everything else fails the request.
    pub async fn answer(&self, question: &str) -> Result<ChatResponse, PipelineError> {
        let (entities, generated) =
            tokio::join!(self.entities.extract(question), self.generate(question));
        let entities = entities.map_err(PipelineError::Entity)?;
        let raw_model_answer = generated.map_err(PipelineError::Generation)?;

        let (generated_sql, rows) = match extract_sql(&raw_model_answer) {
            Err(failure) => (
                failure.to_string(),
                QueryRows::Status(NO_VALID_SQL_MESSAGE.to_string()),
            ),
            Ok(candidate) => {
                info!("Extracted SQL ({:?}): {}", candidate.source, candidate.sql);
                match self.validator.validate(&candidate.sql) {
                    Ok(query) => {
                        let rows = self
                            .executor
                            .execute(&query)
                            .await
                            .map_err(PipelineError::Execution)?;
                        (candidate.sql, QueryRows::Rows(rows))
                    }
                    Err(rejection) => {
                        warn!("Rejected generated SQL: {}", rejection);
                        (
                            candidate.sql,
                            QueryRows::Status(NO_VALID_SQL_MESSAGE.to_string()),
                        )
                    }
                }
            }
        };

        Ok(ChatResponse {
            question: question.to_string(),
            entities,
            generated_sql,
            raw_model_answer,
            rows,
        })
    }

    async fn generate(&self, question: &str) -> Result<String, LlmError> {
        let prompt = self.prompt.build(question, &self.catalog);
        debug!("Prepared LLM prompt: {}", prompt);

        let text = self.llm.generate(&prompt).await?;
        info!("Model answered with {} characters", text.chars().count());
        debug!("Raw model answer: {}", text);
        Ok(text)
    }
}
