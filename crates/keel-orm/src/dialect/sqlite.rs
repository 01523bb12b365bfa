//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support: columns can't be dropped and
//! nullability can't be changed in place, so engines fall back to the
//! table recreation strategy for those.

use crate::fields::SqlType;
use crate::value::Value;

use super::Dialect;

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn type_name(&self, sql_type: SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::Boolean => "INTEGER".to_string(),
            SqlType::Varchar(_) | SqlType::Text => "TEXT".to_string(),
            SqlType::Double => "REAL".to_string(),
            SqlType::Date | SqlType::Time | SqlType::DateTime => "TEXT".to_string(),
        }
    }

    fn auto_increment_column(&self) -> &'static str {
        "INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT"
    }

    fn supports_drop_column(&self) -> bool {
        false
    }

    fn supports_alter_nullability(&self) -> bool {
        false
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            other => other.to_sql_inline(),
        }
    }
}
