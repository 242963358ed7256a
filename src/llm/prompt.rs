use crate::db::catalog::SchemaCatalog;

/// Composes the generation rules, the schema catalog and the question.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    dialect: String,
}

impl PromptBuilder {
    pub fn new(dialect: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
        }
    }

    /// Pure function of (dialect, catalog, question); catalog entries are
    /// emitted whole and in catalog order.
    pub fn build(&self, question: &str, catalog: &SchemaCatalog) -> String {
        let dialect = &self.dialect;
        let mut prompt = format!(
            r#"### {dialect} SQL 쿼리 생성 규칙:
- 질문에 답하기 위한 {dialect} SQL 쿼리 하나만 생성해주세요.
- 다른 설명이나 사과는 절대 포함하지 마세요.
- 쿼리는 `SELECT`로 시작해야 합니다.
- 쿼리 끝에는 세미콜론(;)을 붙이지 마세요.
- 컬럼 별칭(Alias)에는 한글을 사용하지 말고, 'cnt'나 'result_name' 같은 간단한 영어를 사용하세요.
- 집계 또는 분석 시, 주요 컬럼의 값이 NULL인 데이터는 반드시 제외하세요 (예: WHERE "column_name" IS NOT NULL).

### 테이블 스키마 정보:
"#
        );

        for entry in catalog.entries() {
            prompt.push_str(&format!("테이블명: {}\n스키마: {}\n", entry.table_name, entry.ddl));
        }

        prompt.push_str(&format!("\n### 질문:\n{}", question));
        prompt
    }
}
