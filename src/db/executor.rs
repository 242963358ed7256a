use crate::config::ColumnCase;
use crate::db::db_pool::DuckDBConnectionManager;
use crate::sql::validator::ValidatedQuery;
use duckdb::types::ValueRef;
use r2d2::Pool;
use serde_json::{Map, Number, Value};
use std::error::Error;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// One result row, column name -> scalar.
pub type ResultRow = Map<String, Value>;

#[derive(Debug)]
pub enum ExecutionError {
    Connection(String),
    Query(String),
    Task(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Connection(msg) => write!(f, "Database connection error: {}", msg),
            ExecutionError::Query(msg) => write!(f, "Database query failed: {}", msg),
            ExecutionError::Task(msg) => write!(f, "Database task execution failed: {}", msg),
        }
    }
}

impl Error for ExecutionError {}

/// Runs validated statements against the pooled data store.
#[derive(Clone)]
pub struct QueryExecutor {
    pool: Pool<DuckDBConnectionManager>,
    column_case: ColumnCase,
}

impl QueryExecutor {
    pub fn new(pool: Pool<DuckDBConnectionManager>, column_case: ColumnCase) -> Self {
        Self { pool, column_case }
    }

    /// Executes the statement and materializes every row before the
    /// connection goes back to the pool. All rows or an error, never a part.
    pub async fn execute(&self, query: &ValidatedQuery) -> Result<Vec<ResultRow>, ExecutionError> {
        let pool = self.pool.clone();
        let column_case = self.column_case;
        let sql = query.as_str().to_string();

        let rows = tokio::task::spawn_blocking(move || {
            let start_time = Instant::now();
            let conn = pool
                .get()
                .map_err(|e| ExecutionError::Connection(e.to_string()))?;
            let rows = fetch_rows(&conn, &sql, column_case)
                .map_err(|e| ExecutionError::Query(e.to_string()))?;
            debug!(
                "Query returned {} rows in {}ms",
                rows.len(),
                start_time.elapsed().as_millis()
            );
            Ok::<_, ExecutionError>(rows)
        })
        .await
        .map_err(|e| ExecutionError::Task(e.to_string()))??;

        info!("DB execution returned {} rows", rows.len());
        Ok(rows)
    }
}

fn fetch_rows(
    conn: &duckdb::Connection,
    sql: &str,
    column_case: ColumnCase,
) -> Result<Vec<ResultRow>, duckdb::Error> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    let columns: Vec<String> = rows
        .as_ref()
        .map(|stmt| stmt.column_names())
        .unwrap_or_default()
        .into_iter()
        .map(|name| match column_case {
            ColumnCase::Upper => name.to_uppercase(),
            ColumnCase::Preserve => name,
        })
        .collect();

    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Map::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), scalar(row, i)?);
        }
        result.push(record);
    }

    Ok(result)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn scalar(row: &duckdb::Row<'_>, i: usize) -> Result<Value, duckdb::Error> {
    let value = match row.get_ref(i)? {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(n) => Value::from(n),
        ValueRef::SmallInt(n) => Value::from(n),
        ValueRef::Int(n) => Value::from(n),
        ValueRef::BigInt(n) => Value::from(n),
        ValueRef::UTinyInt(n) => Value::from(n),
        ValueRef::USmallInt(n) => Value::from(n),
        ValueRef::UInt(n) => Value::from(n),
        ValueRef::UBigInt(n) => Value::from(n),
        ValueRef::HugeInt(n) => match i64::try_from(n) {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(n.to_string()),
        },
        ValueRef::Float(f) => float(f as f64),
        ValueRef::Double(f) => float(f),
        ValueRef::Decimal(d) => {
            let text = d.to_string();
            match text.parse::<f64>() {
                Ok(f) => float(f),
                Err(_) => Value::String(text),
            }
        }
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Date32(_) => {
            let date: chrono::NaiveDate = row.get(i)?;
            Value::String(date.format("%Y-%m-%d").to_string())
        }
        ValueRef::Timestamp(..) => {
            let ts: chrono::NaiveDateTime = row.get(i)?;
            Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        other => Value::String(format!("{:?}", other)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::validator::SqlValidator;

    fn executor(column_case: ColumnCase) -> QueryExecutor {
        let manager = DuckDBConnectionManager::open(":memory:", false).unwrap();
        let pool = Pool::builder().max_size(2).build(manager).unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TABLE V_PROCESSED_MICROBE ("결과_ID" INTEGER, "동정균주명" VARCHAR, "검사시행일시" DATE);
                INSERT INTO V_PROCESSED_MICROBE VALUES
                    (1, '대장균', DATE '2026-09-03'),
                    (2, '대장균', DATE '2026-09-17'),
                    (3, 'Klebsiella pneumoniae', DATE '2026-09-20'),
                    (4, NULL, DATE '2026-09-21');
                "#,
            )
            .unwrap();
        QueryExecutor::new(pool, column_case)
    }

    fn validated(sql: &str) -> ValidatedQuery {
        SqlValidator::new(true).validate(sql).unwrap()
    }

    #[tokio::test]
    async fn count_alias_is_upper_cased() {
        let rows = executor(ColumnCase::Upper)
            .execute(&validated(
                "SELECT COUNT(*) AS cnt FROM V_PROCESSED_MICROBE WHERE \"동정균주명\" = '대장균'",
            ))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["CNT"], Value::from(2));
    }

    #[tokio::test]
    async fn rows_carry_dates_strings_and_nulls() {
        let rows = executor(ColumnCase::Preserve)
            .execute(&validated(
                "SELECT \"동정균주명\" AS name, \"검사시행일시\" AS tested FROM V_PROCESSED_MICROBE ORDER BY \"결과_ID\"",
            ))
            .await
            .unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["name"], Value::from("대장균"));
        assert_eq!(rows[0]["tested"], Value::from("2026-09-03"));
        assert_eq!(rows[3]["name"], Value::Null);
    }

    #[tokio::test]
    async fn unknown_column_is_a_query_error() {
        let err = executor(ColumnCase::Upper)
            .execute(&validated("SELECT \"없는컬럼\" FROM V_PROCESSED_MICROBE"))
            .await
            .unwrap_err();

        match err {
            ExecutionError::Query(msg) => assert!(msg.contains("없는컬럼")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn empty_result_is_an_empty_vec() {
        let rows = executor(ColumnCase::Upper)
            .execute(&validated(
                "SELECT * FROM V_PROCESSED_MICROBE WHERE \"결과_ID\" > 100",
            ))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
