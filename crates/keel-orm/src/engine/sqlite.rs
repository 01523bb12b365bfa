//! SQLite engine backed by a sqlx pool.

use std::str::FromStr;

use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, Sqlite, Transaction, TypeInfo, ValueRef};
use tracing::debug;

use crate::dialect::{Dialect, SqliteDialect};
use crate::error::{OrmError, Result};
use crate::value::{Value, Values};

use super::Engine;

/// A SQLite database reached through a sqlx pool.
///
/// While a transaction is open every statement runs on its connection.
pub struct SqliteEngine {
    pool: SqlitePool,
    database: String,
    dialect: SqliteDialect,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteEngine {
    /// Creates an engine over an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            database: "default".to_string(),
            dialect: SqliteDialect::new(),
            tx: None,
        }
    }

    /// Connects to `url`, creating the database file if missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let connection_error = |source| OrmError::Connection {
            database: url.to_string(),
            source,
        };
        let options = SqliteConnectOptions::from_str(url)
            .map_err(connection_error)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(connection_error)?;
        Ok(Self::new(pool))
    }

    /// Sets the identifier reported in errors.
    #[must_use]
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database = name.into();
        self
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn driver_error(&self, sql: &str, source: sqlx::Error) -> OrmError {
        OrmError::Driver {
            database: self.database.clone(),
            sql: sql.to_string(),
            source,
        }
    }

    fn transaction_error(&self, message: &str) -> OrmError {
        OrmError::Transaction {
            database: self.database.clone(),
            message: message.to_string(),
        }
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(n) => query.bind(*n),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.as_str()),
        Value::Date(d) => query.bind(*d),
        Value::Time(t) => query.bind(*t),
        Value::DateTime(dt) => query.bind(*dt),
    }
}

fn prepare<'q>(sql: &'q str, args: &'q [Value]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    args.iter().fold(sqlx::query(sql), bind_value)
}

/// Decodes a row by the storage class of each value.
fn decode_row(row: &SqliteRow) -> std::result::Result<Values, sqlx::Error> {
    let mut values = Values::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" | "BOOLEAN" => Value::Int(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
                _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        values.insert(column.name().to_string(), value);
    }
    Ok(values)
}

impl Engine for SqliteEngine {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        debug!(sql = %sql, args = args.len(), "execute");
        let query = prepare(sql, args);
        let result = match self.tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await,
            None => query.execute(&self.pool).await,
        };
        result
            .map(|r| r.rows_affected())
            .map_err(|source| self.driver_error(sql, source))
    }

    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Values>> {
        debug!(sql = %sql, args = args.len(), "query");
        let query = prepare(sql, args);
        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        }
        .map_err(|source| self.driver_error(sql, source))?;

        rows.iter()
            .map(|row| decode_row(row).map_err(|source| self.driver_error(sql, source)))
            .collect()
    }

    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(self.transaction_error("transaction already open"));
        }
        debug!(database = %self.database, "begin");
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|source| self.driver_error("BEGIN", source))?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| self.transaction_error("commit without open transaction"))?;
        debug!(database = %self.database, "commit");
        tx.commit()
            .await
            .map_err(|source| self.driver_error("COMMIT", source))
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| self.transaction_error("rollback without open transaction"))?;
        debug!(database = %self.database, "rollback");
        tx.rollback()
            .await
            .map_err(|source| self.driver_error("ROLLBACK", source))
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}
