//! The migration ledger.
//!
//! This module manages the `keel_migration` table that records which
//! migrations have been applied to a database: one row per applied
//! migration, deleted again on rollback. The table is itself described as a
//! model, so it goes through the same dialect and engine as everything else.

use chrono::{NaiveDateTime, Utc};
use keel_orm::{Engine, Field, ModelDeclaration, ModelSnapshot, OrmError, Q, Value, Values};

use crate::error::{MigrateError, Result};

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "keel_migration";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMigration {
    /// Unique ID in the ledger table.
    pub id: i64,
    /// Application name.
    pub app: String,
    /// Migration name.
    pub name: String,
    /// Migration number.
    pub number: String,
    /// When the migration was applied, if recorded.
    pub applied: Option<NaiveDateTime>,
}

fn ledger_error(err: OrmError) -> MigrateError {
    MigrateError::Ledger {
        message: err.to_string(),
    }
}

fn ledger_model() -> Result<ModelSnapshot> {
    ModelDeclaration::new("Migration")
        .table(LEDGER_TABLE)
        .field("app", Field::char(50))
        .field("name", Field::char(100))
        .field("number", Field::text())
        .field("applied", Field::datetime().null())
        .build("keel")
        .map_err(ledger_error)
}

fn text(row: &Values, key: &str) -> String {
    match row.get(key) {
        Some(Value::Text(s)) => s.clone(),
        Some(Value::Int(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn timestamp(row: &Values) -> Option<NaiveDateTime> {
    match row.get("applied") {
        Some(Value::DateTime(dt)) => Some(*dt),
        Some(Value::Text(s)) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok(),
        _ => None,
    }
}

fn applied_from_row(row: &Values) -> AppliedMigration {
    AppliedMigration {
        id: match row.get("id") {
            Some(Value::Int(id)) => *id,
            _ => 0,
        },
        app: text(row, "app"),
        name: text(row, "name"),
        number: text(row, "number"),
        applied: timestamp(row),
    }
}

/// Reads and writes the ledger through an engine.
pub struct Ledger<'e, E: Engine> {
    engine: &'e mut E,
    model: ModelSnapshot,
}

impl<'e, E: Engine> Ledger<'e, E> {
    /// Creates a ledger over `engine`.
    pub fn new(engine: &'e mut E) -> Result<Self> {
        Ok(Self {
            engine,
            model: ledger_model()?,
        })
    }

    /// Ensures the ledger table exists.
    pub async fn ensure_table(&mut self) -> Result<()> {
        let sql = self.engine.dialect().create_table_sql(&self.model, true);
        self.engine.execute(&sql, &[]).await.map_err(ledger_error)?;
        Ok(())
    }

    /// Records a migration as applied.
    pub async fn record_applied(&mut self, app: &str, name: &str, number: &str) -> Result<()> {
        let mut row = Values::new();
        row.insert("app".to_string(), Value::from(app));
        row.insert("name".to_string(), Value::from(name));
        row.insert("number".to_string(), Value::from(number));
        row.insert(
            "applied".to_string(),
            Value::DateTime(Utc::now().naive_utc()),
        );
        self.engine
            .insert_row(&self.model, &row)
            .await
            .map_err(ledger_error)?;
        Ok(())
    }

    /// Removes a migration record (for rollback).
    pub async fn record_unapplied(&mut self, app: &str, name: &str) -> Result<()> {
        let deleted = self
            .engine
            .delete_rows(&self.model, &Q::eq("app", app).and(Q::eq("name", name)))
            .await
            .map_err(ledger_error)?;

        if deleted == 0 {
            return Err(MigrateError::MigrationNotFound {
                app: app.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Gets applied migrations for an app, in the order they were applied.
    pub async fn applied(&mut self, app: &str) -> Result<Vec<AppliedMigration>> {
        let rows = self
            .engine
            .select_rows(&self.model, &Q::eq("app", app).into())
            .await
            .map_err(ledger_error)?;
        Ok(rows.iter().map(applied_from_row).collect())
    }

    /// Checks if a migration has been applied.
    pub async fn is_applied(&mut self, app: &str, name: &str) -> Result<bool> {
        Ok(self.applied(app).await?.iter().any(|m| m.name == name))
    }

    /// Gets the last applied migration for an app.
    pub async fn latest(&mut self, app: &str) -> Result<Option<AppliedMigration>> {
        Ok(self.applied(app).await?.into_iter().last())
    }
}
