use crate::config::SchemaConfig;
use serde::Serialize;

/// A table (or view) as described to the model.
///
/// `ddl` is free text: column names and types plus inline `COMMENT`s that
/// document ambiguous columns and dialect hints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaEntry {
    pub table_name: String,
    pub ddl: String,
}

/// Read-only registry of the views the generator may query.
///
/// Built once at startup and shared; iteration order is the order the
/// entries were declared in.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    version: String,
    entries: Vec<SchemaEntry>,
}

pub const BUILTIN_CATALOG_VERSION: &str = "antibiogram-v2";

// Column types and usage hints are written for the DuckDB store.
const BUILTIN_VIEWS: &[(&str, &str)] = &[
    (
        "V_MEDICAL_CODEBOOK",
        "CREATE TABLE V_MEDICAL_CODEBOOK (ID VARCHAR, CATEGORY VARCHAR, CODE_KO VARCHAR, CODE_EN VARCHAR)",
    ),
    (
        "V_PROCESSED_ANTIBIOTIC",
        "CREATE TABLE V_PROCESSED_ANTIBIOTIC (\"항생제결과_ID\" BIGINT, \"결과_ID\" BIGINT, \"항생제명\" VARCHAR, \"MIC_결과값\" VARCHAR, \"판정\" VARCHAR)",
    ),
    (
        "V_PROCESSED_MICROBE",
        "CREATE TABLE V_PROCESSED_MICROBE (\"결과_ID\" BIGINT, \"원본_내원번호\" VARCHAR, \"원본_환자번호\" VARCHAR, \"성별\" VARCHAR, \"생년월일\" DATE, \"입원일\" DATE, \"검사시행일시\" DATE, \"결과유형\" VARCHAR, \"동정균주명\" VARCHAR COMMENT 'This is the identified microbe species name. Also called ''균'', ''병원균'', ''균주''.', \"균_정량_상세\" VARCHAR, \"주요내성_특징\" VARCHAR, \"코멘트\" VARCHAR, \"최종보고일시\" DATE, \"검사명\" VARCHAR, \"검체명_주검체\" VARCHAR) COMMENT 'To get the top N results, use ORDER BY with LIMIT N. For relative periods use current_date with INTERVAL, e.g. date_trunc(''month'', current_date) - INTERVAL 1 MONTH for last month.'",
    ),
];

impl SchemaCatalog {
    pub fn new(version: impl Into<String>, entries: Vec<SchemaEntry>) -> Self {
        Self {
            version: version.into(),
            entries,
        }
    }

    /// The microbiology/antibiogram views shipped with the service.
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_CATALOG_VERSION,
            BUILTIN_VIEWS
                .iter()
                .map(|(name, ddl)| SchemaEntry {
                    table_name: name.to_string(),
                    ddl: ddl.to_string(),
                })
                .collect(),
        )
    }

    pub fn from_config(config: &SchemaConfig) -> Self {
        if config.tables.is_empty() {
            let mut catalog = Self::builtin();
            if let Some(version) = &config.version {
                catalog.version = version.clone();
            }
            return catalog;
        }

        Self::new(
            config.version.clone().unwrap_or_else(|| "custom".to_string()),
            config
                .tables
                .iter()
                .map(|t| SchemaEntry {
                    table_name: t.name.clone(),
                    ddl: t.ddl.clone(),
                })
                .collect(),
        )
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    pub fn table_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.table_name.clone()).collect()
    }
}
