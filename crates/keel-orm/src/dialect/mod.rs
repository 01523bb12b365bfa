//! SQL dialects.
//!
//! A dialect knows the syntax rules of one backend: placeholder style,
//! operator spellings, column types and the DDL verbs the engines emit.
//! Capability flags tell the engines when a primitive is missing and a
//! fallback (table rebuild) is needed.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::fields::{Field, SqlType};
use crate::model::ModelSnapshot;
use crate::query::Operator;
use crate::value::Value;

/// Driver-specific SQL syntax rules.
pub trait Dialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the positional placeholder for the 1-based argument `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Returns the spelling of a comparison operator.
    fn operator(&self, op: Operator) -> &'static str {
        match op {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
        }
    }

    /// Returns the column type for the given SQL type.
    fn type_name(&self, sql_type: SqlType) -> String;

    /// Returns the full column definition tail for auto-increment primary keys.
    fn auto_increment_column(&self) -> &'static str;

    /// Returns whether this dialect can drop a column in place.
    fn supports_drop_column(&self) -> bool;

    /// Returns whether this dialect can change a column's nullability in place.
    fn supports_alter_nullability(&self) -> bool;

    /// Returns whether DDL statements take part in transactions.
    fn supports_transactional_ddl(&self) -> bool;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Renders a value inline, for DEFAULT clauses.
    fn literal(&self, value: &Value) -> String {
        value.to_sql_inline()
    }

    /// Generates column definition SQL.
    fn column_definition(&self, name: &str, field: &Field) -> String {
        let column = self.quote_identifier(name);
        if field.is_auto() {
            return format!("{column} {}", self.auto_increment_column());
        }

        let mut parts = vec![column, self.type_name(field.sql_type())];

        if field.is_pk() {
            parts.push("PRIMARY KEY".to_string());
        } else {
            if !field.is_null() {
                parts.push("NOT NULL".to_string());
            }
            if field.is_unique() {
                parts.push("UNIQUE".to_string());
            }
        }

        if let Some(default) = field.default_value() {
            parts.push(format!("DEFAULT {}", self.literal(default)));
        }

        parts.join(" ")
    }

    /// Generates SQL for creating the table of a model.
    fn create_table_sql(&self, model: &ModelSnapshot, if_not_exists: bool) -> String {
        let mut sql = String::from("CREATE TABLE ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.quote_identifier(model.table()));
        sql.push_str(" (");

        let col_defs: Vec<String> = model
            .fields()
            .iter()
            .map(|(name, field)| self.column_definition(field.db_column(name), field))
            .collect();
        sql.push_str(&col_defs.join(", "));
        sql.push(')');
        sql
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(table))
    }

    /// Generates SQL for renaming a table.
    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for adding a column.
    fn add_column_sql(&self, table: &str, column: &str, field: &Field) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column, field)
        )
    }

    /// Generates SQL for dropping a column.
    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Generates SQL for making a column NOT NULL.
    fn set_not_null_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Generates SQL for creating an index.
    fn create_index_sql(&self, name: &str, table: &str, columns: &[&str]) -> String {
        let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote_identifier(name),
            self.quote_identifier(table),
            quoted.join(", ")
        )
    }

    /// Generates SQL for dropping an index.
    fn drop_index_sql(&self, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }
}

/// Looks up a dialect by name.
#[must_use]
pub fn by_name(name: &str) -> Option<Box<dyn Dialect>> {
    match name {
        "sqlite" | "sqlite3" => Some(Box::new(SqliteDialect::new())),
        "postgres" | "postgresql" => Some(Box::new(PostgresDialect::new())),
        _ => None,
    }
}
