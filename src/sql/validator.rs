use crate::sql::{keyword_at, QuoteState};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::fmt;

pub const NO_VALID_SQL_MESSAGE: &str = "유효한 SQL이 생성되지 않았습니다.";

/// A single read-only statement that starts with `SELECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotSelect,
    MultipleStatements,
    Unparseable(String),
    NotReadOnly(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotSelect => write!(f, "statement does not start with SELECT"),
            Rejection::MultipleStatements => write!(f, "more than one statement"),
            Rejection::Unparseable(msg) => write!(f, "statement does not parse: {}", msg),
            Rejection::NotReadOnly(what) => write!(f, "statement is not read-only: {}", what),
        }
    }
}

/// Gate between extraction and execution.
///
/// The shape check always runs. With `strict` the candidate must also parse
/// as exactly one query whose body can only read.
#[derive(Debug, Clone, Copy)]
pub struct SqlValidator {
    strict: bool,
}

impl SqlValidator {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn validate(&self, candidate: &str) -> Result<ValidatedQuery, Rejection> {
        let sql = candidate.trim();

        if !keyword_at(skip_comments(sql), 0, "SELECT") {
            return Err(Rejection::NotSelect);
        }
        if has_trailing_statement(sql) {
            return Err(Rejection::MultipleStatements);
        }
        if self.strict {
            check_single_query(sql)?;
        }

        Ok(ValidatedQuery(sql.to_string()))
    }
}

/// Drops leading whitespace, `--` line comments and `/* */` block comments.
fn skip_comments(mut sql: &str) -> &str {
    loop {
        sql = sql.trim_start();
        if let Some(rest) = sql.strip_prefix("--") {
            sql = rest.find('\n').map_or("", |i| &rest[i + 1..]);
        } else if let Some(rest) = sql.strip_prefix("/*") {
            sql = rest.find("*/").map_or("", |i| &rest[i + 2..]);
        } else {
            return sql;
        }
    }
}

/// A semicolon outside quotes and comments followed by anything but comments.
fn has_trailing_statement(sql: &str) -> bool {
    let mut quotes = QuoteState::default();
    let mut i = 0;

    while let Some(c) = sql[i..].chars().next() {
        if !quotes.is_open() && (sql[i..].starts_with("--") || sql[i..].starts_with("/*")) {
            i = sql.len() - skip_comments(&sql[i..]).len();
            continue;
        }
        if quotes.advance(c) && c == ';' && !skip_comments(&sql[i + 1..]).is_empty() {
            return true;
        }
        i += c.len_utf8();
    }

    false
}

fn check_single_query(sql: &str) -> Result<(), Rejection> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| Rejection::Unparseable(e.to_string()))?;

    match statements.as_slice() {
        [Statement::Query(query)] => check_query(query),
        [other] => Err(Rejection::NotReadOnly(
            other
                .to_string()
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
        )),
        _ => Err(Rejection::MultipleStatements),
    }
}

fn check_query(query: &Query) -> Result<(), Rejection> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    if !query.locks.is_empty() {
        return Err(Rejection::NotReadOnly("row locking clause".to_string()));
    }
    check_set_expr(&query.body)
}

fn check_set_expr(expr: &SetExpr) -> Result<(), Rejection> {
    match expr {
        SetExpr::Select(select) => match &select.into {
            Some(_) => Err(Rejection::NotReadOnly("SELECT INTO".to_string())),
            None => Ok(()),
        },
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        other => Err(Rejection::NotReadOnly(other.to_string())),
    }
}
