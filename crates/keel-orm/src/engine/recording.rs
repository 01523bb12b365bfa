//! An in-memory engine that records statements instead of running them.
//!
//! Used by dry runs and `sqlmigrate` to print the SQL a migration would
//! execute, and by tests to assert on statement sequences.

use std::collections::VecDeque;

use tracing::debug;

use crate::dialect::{Dialect, SqliteDialect};
use crate::error::{OrmError, Result};
use crate::value::{Value, Values};

use super::Engine;

/// A statement seen by a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    /// SQL text.
    pub sql: String,
    /// Bound arguments.
    pub args: Vec<Value>,
}

/// Records every statement; never touches a database.
pub struct RecordingEngine {
    dialect: Box<dyn Dialect>,
    database: String,
    statements: Vec<RecordedStatement>,
    results: VecDeque<Vec<Values>>,
    fail_on: Option<String>,
    in_transaction: bool,
    commits: usize,
    rollbacks: usize,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new(Box::new(SqliteDialect::new()))
    }
}

impl RecordingEngine {
    /// Creates a recording engine speaking `dialect`.
    #[must_use]
    pub fn new(dialect: Box<dyn Dialect>) -> Self {
        Self {
            dialect,
            database: "recording".to_string(),
            statements: Vec::new(),
            results: VecDeque::new(),
            fail_on: None,
            in_transaction: false,
            commits: 0,
            rollbacks: 0,
        }
    }

    /// Queues rows returned by the next `query` call.
    pub fn push_result(&mut self, rows: Vec<Values>) {
        self.results.push_back(rows);
    }

    /// Makes every statement containing `needle` fail.
    #[must_use]
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on = Some(needle.into());
        self
    }

    /// Returns the recorded statements.
    #[must_use]
    pub fn statements(&self) -> &[RecordedStatement] {
        &self.statements
    }

    /// Returns the recorded SQL texts.
    #[must_use]
    pub fn sql(&self) -> Vec<&str> {
        self.statements.iter().map(|s| s.sql.as_str()).collect()
    }

    /// Forgets the recorded statements.
    pub fn clear(&mut self) {
        self.statements.clear();
    }

    /// Returns how many transactions were committed.
    #[must_use]
    pub const fn commits(&self) -> usize {
        self.commits
    }

    /// Returns how many transactions were rolled back.
    #[must_use]
    pub const fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    fn record(&mut self, sql: &str, args: &[Value]) -> Result<()> {
        debug!(sql = %sql, "record");
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(OrmError::Driver {
                    database: self.database.clone(),
                    sql: sql.to_string(),
                    source: sqlx::Error::Protocol(format!("injected failure on {needle}")),
                });
            }
        }
        self.statements.push(RecordedStatement {
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    fn transaction_error(&self, message: &str) -> OrmError {
        OrmError::Transaction {
            database: self.database.clone(),
            message: message.to_string(),
        }
    }
}

impl Engine for RecordingEngine {
    fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        self.record(sql, args)?;
        Ok(0)
    }

    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Values>> {
        self.record(sql, args)?;
        Ok(self.results.pop_front().unwrap_or_default())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(self.transaction_error("transaction already open"));
        }
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(self.transaction_error("commit without open transaction"));
        }
        self.in_transaction = false;
        self.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(self.transaction_error("rollback without open transaction"));
        }
        self.in_transaction = false;
        self.rollbacks += 1;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;
    use crate::fields::Field;
    use crate::model::ModelDeclaration;
    use crate::query::Q;

    fn user() -> crate::model::ModelSnapshot {
        ModelDeclaration::new("User")
            .field("email", Field::char(100))
            .field("active", Field::boolean().default(true))
            .build("main")
            .unwrap()
    }

    #[tokio::test]
    async fn test_remove_field_rebuild_sequence() {
        let mut engine = RecordingEngine::default();
        let old = user();
        let mut new = old.clone();
        new.remove_field("active").unwrap();

        engine
            .drop_columns(&old, &new, &["active".to_string()])
            .await
            .unwrap();

        assert_eq!(
            engine.sql(),
            vec![
                "CREATE TABLE \"main_user__new\" (\"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \"email\" TEXT NOT NULL)",
                "INSERT INTO \"main_user__new\" (\"id\", \"email\") SELECT \"id\", \"email\" FROM \"main_user\"",
                "DROP TABLE \"main_user\"",
                "ALTER TABLE \"main_user__new\" RENAME TO \"main_user\"",
            ]
        );
    }

    #[tokio::test]
    async fn test_postgres_drops_column_in_place() {
        let mut engine = RecordingEngine::new(Box::new(PostgresDialect::new()));
        let old = user();
        let mut new = old.clone();
        new.remove_field("active").unwrap();

        engine
            .drop_columns(&old, &new, &["active".to_string()])
            .await
            .unwrap();
        assert_eq!(
            engine.sql(),
            vec!["ALTER TABLE \"main_user\" DROP COLUMN \"active\""]
        );
    }

    #[tokio::test]
    async fn test_postgres_add_not_null_column() {
        let mut engine = RecordingEngine::new(Box::new(PostgresDialect::new()));
        let mut model = user();
        model
            .add_field("score", Field::integer().default(0))
            .unwrap();
        engine
            .add_columns(&model, &["score".to_string()])
            .await
            .unwrap();

        assert_eq!(
            engine.sql(),
            vec![
                "ALTER TABLE \"main_user\" ADD COLUMN \"score\" BIGINT DEFAULT 0",
                "UPDATE \"main_user\" SET \"score\" = $1",
                "ALTER TABLE \"main_user\" ALTER COLUMN \"score\" SET NOT NULL",
            ]
        );
        assert_eq!(engine.statements()[1].args, vec![Value::Int(0)]);
    }

    #[tokio::test]
    async fn test_update_where_placeholders_follow_set() {
        let mut engine = RecordingEngine::new(Box::new(PostgresDialect::new()));
        let mut values = Values::new();
        values.insert("email".to_string(), Value::from("x@y.z"));
        values.insert("active".to_string(), Value::Bool(false));

        engine
            .update_rows(&user(), &values, &Q::gte("id", 10).or(Q::eq("email", "old")))
            .await
            .unwrap();

        let statement = &engine.statements()[0];
        assert_eq!(
            statement.sql,
            "UPDATE \"main_user\" SET \"email\" = $1, \"active\" = $2 WHERE \"id\" >= $3 OR \"email\" = $4"
        );
        assert_eq!(statement.args.len(), 4);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let mut engine = RecordingEngine::default().fail_on("DROP TABLE");
        let result = engine.drop_table(&user()).await;
        assert!(matches!(result, Err(OrmError::Driver { .. })));
        assert!(engine.statements().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_results() {
        let mut engine = RecordingEngine::default();
        let mut row = Values::new();
        row.insert("n".to_string(), Value::Int(1));
        engine.push_result(vec![row.clone()]);

        assert_eq!(engine.query_row("SELECT 1", &[]).await.unwrap(), Some(row));
        assert_eq!(engine.query_row("SELECT 1", &[]).await.unwrap(), None);
    }
}
