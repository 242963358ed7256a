use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
    /// Open the store in read-only access mode. Has to be off for `:memory:`.
    pub read_only: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NerConfig {
    pub backend: String, // "dictionary" or "remote"
    pub model_path: Option<PathBuf>,
    pub api_url: Option<String>,
    /// Minimum similarity, 0-100, for a dictionary term to tag a token.
    pub similarity_threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub dialect: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    pub name: String,
    pub ddl: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SchemaConfig {
    pub version: Option<String>,
    /// Replaces the built-in catalog when non-empty.
    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnCase {
    #[default]
    Upper,
    Preserve,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ResultConfig {
    pub column_case: ColumnCase,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationConfig {
    pub strict: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub ner: NerConfig,
    pub prompt: PromptConfig,
    pub schema: SchemaConfig,
    pub result: ResultConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// DuckDB database file holding the antibiogram views
    #[arg(long)]
    pub database: Option<String>,
}

const ENV_PREFIX: &str = "ABCHAT";

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = [
                "config.toml",
                "config/config.toml",
                "/etc/antibiogram-chat/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // ABCHAT__LLM__MODEL=gpt-4o and friends
        config_builder = config_builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.connection_string = database.clone();
        }

        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        Ok(config)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: "antibiogram.duckdb".to_string(),
            pool_size: 5,
            read_only: true,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            base_path: "/chat".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "remote".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            api_url: None,
            temperature: 0.1,
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            backend: "dictionary".to_string(),
            model_path: None,
            api_url: None,
            similarity_threshold: 85.0,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            dialect: "DuckDB".to_string(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                "[llm]\nmodel = \"gpt-4o-mini\"\n\n[result]\ncolumn_case = \"preserve\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.backend, "remote");
        assert_eq!(config.result.column_case, ColumnCase::Preserve);
        assert_eq!(config.web.port, 8001);
        assert_eq!(config.ner.similarity_threshold, 85.0);
        assert!(config.validation.strict);
        assert!(config.schema.tables.is_empty());
    }

    #[test]
    fn schema_tables_override_is_ordered() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                r#"
[schema]
version = "lab-2"

[[schema.tables]]
name = "B"
ddl = "CREATE TABLE B (X NUMBER)"

[[schema.tables]]
name = "A"
ddl = "CREATE TABLE A (Y NUMBER)"
"#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let names: Vec<_> = config.schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(config.schema.version.as_deref(), Some("lab-2"));
    }
}
