#![allow(dead_code)]

use keel_migrate::prelude::*;
use keel_orm::{Engine, Field, FieldMap, SqliteEngine, Value, Values};
use sqlx::sqlite::SqlitePoolOptions;

pub async fn sqlite() -> SqliteEngine {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    SqliteEngine::new(pool)
}

pub async fn executor() -> MigrationExecutor<SqliteEngine> {
    let mut executor = MigrationExecutor::new(sqlite().await);
    executor.init().await.expect("Failed to create the ledger");
    executor
}

pub fn fields(entries: Vec<(&str, Field)>) -> FieldMap {
    entries
        .into_iter()
        .map(|(name, field)| (name.to_string(), field))
        .collect()
}

/// `User{id, email, active, name}` with an index on `email`.
pub fn user_initial() -> Migration {
    Migration::new("main", "0001_initial")
        .unwrap()
        .operation(Operation::CreateModel(CreateModel {
            name: "User".to_string(),
            table: None,
            fields: fields(vec![
                ("id", Field::auto()),
                ("email", Field::char(100)),
                ("active", Field::boolean().default(true)),
                ("name", Field::char(50).null()),
            ]),
        }))
        .operation(Operation::AddIndex(AddIndex {
            model: "User".to_string(),
            name: "main_user_email_idx".to_string(),
            fields: vec!["email".to_string()],
        }))
}

pub fn single(name: &str, operation: Operation) -> Migration {
    Migration::new("main", name).unwrap().operation(operation)
}

/// Returns the table and column names of a SQLite table, in order.
pub async fn columns<E: Engine>(engine: &mut E, table: &str) -> Vec<String> {
    engine
        .query(
            "SELECT name FROM pragma_table_info(?) ORDER BY cid",
            &[Value::from(table)],
        )
        .await
        .unwrap()
        .into_iter()
        .filter_map(|row| match row.get("name") {
            Some(Value::Text(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// A structural fingerprint of every user table: columns with declared
/// type, nullability and primary key flag, and the index names.
pub async fn schema<E: Engine>(engine: &mut E) -> Vec<Values> {
    let tables = engine
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' AND name != 'keel_migration' ORDER BY name",
            &[],
        )
        .await
        .unwrap();

    let mut shape = Vec::new();
    for table in tables {
        let Some(Value::Text(name)) = table.get("name").cloned() else {
            continue;
        };
        let mut table_columns = engine
            .query(
                "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?) ORDER BY cid",
                &[Value::from(name.as_str())],
            )
            .await
            .unwrap();
        for column in &mut table_columns {
            column.insert("table".to_string(), Value::from(name.as_str()));
        }
        shape.extend(table_columns);
    }

    shape.extend(
        engine
            .query(
                "SELECT name, tbl_name FROM sqlite_master WHERE type = 'index' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .await
            .unwrap(),
    );
    shape
}
