//! The driver engine boundary.
//!
//! An [`Engine`] runs statements against one database and exposes the DDL
//! primitives migrations are built from. The primitives are provided
//! methods written against the engine's [`Dialect`]: when the dialect lacks
//! a primitive (dropping a column, tightening nullability) they rebuild the
//! table instead. Every statement of a rebuild goes through the same
//! engine, so it runs inside whatever transaction is open.

mod recording;
mod sqlite;

pub use recording::{RecordedStatement, RecordingEngine};
pub use sqlite::SqliteEngine;

use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{OrmError, Result};
use crate::fields::Field;
use crate::model::ModelSnapshot;
use crate::query::{compile, Condition};
use crate::value::{Getter, Value, Values};

/// Suffix of shadow tables used during table rebuilds.
pub const SHADOW_SUFFIX: &str = "__new";

/// A database engine: statement execution, transactions and DDL.
#[allow(async_fn_in_trait)]
pub trait Engine {
    /// Returns the dialect statements are written in.
    fn dialect(&self) -> &dyn Dialect;

    /// Returns the identifier of the database, used in errors.
    fn database(&self) -> &str;

    /// Executes a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64>;

    /// Runs a query, returning rows keyed by column name.
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Values>>;

    /// Runs a query, returning its first row.
    async fn query_row(&mut self, sql: &str, args: &[Value]) -> Result<Option<Values>> {
        Ok(self.query(sql, args).await?.into_iter().next())
    }

    /// Opens a transaction. Following statements run inside it.
    async fn begin(&mut self) -> Result<()>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Returns whether a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Creates the table of a model. Indexes are created separately.
    async fn create_table(&mut self, model: &ModelSnapshot) -> Result<()> {
        let sql = self.dialect().create_table_sql(model, false);
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Drops the table of a model.
    async fn drop_table(&mut self, model: &ModelSnapshot) -> Result<()> {
        let sql = self.dialect().drop_table_sql(model.table());
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Renames a table.
    async fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let sql = self.dialect().rename_table_sql(old_name, new_name);
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Adds `fields` of `model` as columns to its existing table.
    ///
    /// `model` is the final shape, already containing the new fields.
    /// NOT NULL columns are added nullable, existing rows are filled with
    /// the field's default, then the constraint is applied in place or by
    /// rebuilding the table.
    async fn add_columns(&mut self, model: &ModelSnapshot, fields: &[String]) -> Result<()> {
        let in_place = self.dialect().supports_alter_nullability();
        let mut fill = Values::new();
        let mut not_null = Vec::new();
        let mut rebuild = false;

        for name in fields {
            let field = model.field(name).ok_or_else(|| OrmError::FieldResolution {
                model: model.name().to_string(),
                field: name.clone(),
            })?;
            let column = field.db_column(name).to_string();

            if !field.is_null() {
                let value = field.fill_value().ok_or_else(|| OrmError::MissingDefault {
                    model: model.name().to_string(),
                    field: name.clone(),
                })?;
                fill.insert(name.clone(), value);
                not_null.push(column.clone());
            }
            if !in_place && (!field.is_null() || field.is_unique()) {
                rebuild = true;
            }

            let addable = addable_column(field, in_place);
            let sql = self
                .dialect()
                .add_column_sql(model.table(), &column, &addable);
            self.execute(&sql, &[]).await?;
        }

        if !fill.is_empty() {
            self.update_rows(model, &fill, &Condition::Empty).await?;
        }

        if rebuild {
            let columns = model.columns().into_iter().map(String::from).collect::<Vec<_>>();
            self.rebuild_table(model, &columns).await?;
        } else if in_place {
            for column in not_null {
                let sql = self.dialect().set_not_null_sql(model.table(), &column);
                self.execute(&sql, &[]).await?;
            }
        }
        Ok(())
    }

    /// Removes `fields` from the table of `old`.
    ///
    /// `new` is the shape after removal. Dialects that can't drop columns
    /// rebuild the table with the columns of `new`.
    async fn drop_columns(
        &mut self,
        old: &ModelSnapshot,
        new: &ModelSnapshot,
        fields: &[String],
    ) -> Result<()> {
        if self.dialect().supports_drop_column() {
            for name in fields {
                let sql = self
                    .dialect()
                    .drop_column_sql(old.table(), old.column(name)?);
                self.execute(&sql, &[]).await?;
            }
            return Ok(());
        }

        for name in fields {
            old.column(name)?;
        }
        let columns = new.columns().into_iter().map(String::from).collect::<Vec<_>>();
        self.rebuild_table(new, &columns).await
    }

    /// Recreates the table of `model` and copies `columns` into it.
    ///
    /// Creates `{table}__new` with the final columns, copies the rows,
    /// drops the original, renames the shadow table and recreates the
    /// model's indexes.
    async fn rebuild_table(&mut self, model: &ModelSnapshot, columns: &[String]) -> Result<()> {
        let table = model.table().to_string();
        let shadow = model.with_table(format!("{table}{SHADOW_SUFFIX}"));
        debug!(table = %table, shadow = %shadow.table(), "rebuilding table");

        self.create_table(&shadow).await?;

        let quoted = columns
            .iter()
            .map(|c| self.dialect().quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let copy = format!(
            "INSERT INTO {} ({quoted}) SELECT {quoted} FROM {}",
            self.dialect().quote_identifier(shadow.table()),
            self.dialect().quote_identifier(&table)
        );
        self.execute(&copy, &[]).await?;

        let drop = self.dialect().drop_table_sql(&table);
        self.execute(&drop, &[]).await?;
        self.rename_table(shadow.table(), &table).await?;

        for name in model.indexes().keys() {
            self.add_index(model, name).await?;
        }
        Ok(())
    }

    /// Creates the named index of `model`.
    async fn add_index(&mut self, model: &ModelSnapshot, name: &str) -> Result<()> {
        let fields = model.indexes().get(name).ok_or_else(|| {
            OrmError::invalid_model(model.name(), format!("index not found: {name}"))
        })?;
        let columns = fields
            .iter()
            .map(|f| model.column(f))
            .collect::<Result<Vec<_>>>()?;
        let sql = self.dialect().create_index_sql(name, model.table(), &columns);
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Drops the named index.
    async fn drop_index(&mut self, name: &str) -> Result<()> {
        let sql = self.dialect().drop_index_sql(name);
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Inserts a row with the model's fields found in `values`.
    async fn insert_row<G: Getter + ?Sized>(
        &mut self,
        model: &ModelSnapshot,
        values: &G,
    ) -> Result<u64> {
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        let mut args = Vec::new();
        for (name, field) in model.fields() {
            if let Some(value) = values.get_field(name) {
                columns.push(self.dialect().quote_identifier(field.db_column(name)));
                placeholders.push(self.dialect().placeholder(args.len() + 1));
                args.push(value);
            }
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.dialect().quote_identifier(model.table()),
            columns.join(", "),
            placeholders.join(", ")
        );
        self.execute(&sql, &args).await
    }

    /// Updates the rows matching `condition` with the model's fields found
    /// in `values`. The primary key is never updated.
    async fn update_rows<G: Getter + ?Sized>(
        &mut self,
        model: &ModelSnapshot,
        values: &G,
        condition: &Condition,
    ) -> Result<u64> {
        let mut sets = Vec::new();
        let mut args = Vec::new();
        for (name, field) in model.fields() {
            if name == model.pk() {
                continue;
            }
            if let Some(value) = values.get_field(name) {
                sets.push(format!(
                    "{} = {}",
                    self.dialect().quote_identifier(field.db_column(name)),
                    self.dialect().placeholder(args.len() + 1)
                ));
                args.push(value);
            }
        }
        if sets.is_empty() {
            return Ok(0);
        }

        let predicate = compile(condition, model, self.dialect(), args.len() + 1)?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.dialect().quote_identifier(model.table()),
            sets.join(", "),
            predicate.where_clause()
        );
        args.extend(predicate.args);
        self.execute(&sql, &args).await
    }

    /// Deletes the rows matching `condition`.
    async fn delete_rows(&mut self, model: &ModelSnapshot, condition: &Condition) -> Result<u64> {
        let predicate = compile(condition, model, self.dialect(), 1)?;
        let sql = format!(
            "DELETE FROM {}{}",
            self.dialect().quote_identifier(model.table()),
            predicate.where_clause()
        );
        self.execute(&sql, &predicate.args).await
    }

    /// Selects the rows matching `condition`, keyed by field name.
    async fn select_rows(
        &mut self,
        model: &ModelSnapshot,
        condition: &Condition,
    ) -> Result<Vec<Values>> {
        let columns = model
            .fields()
            .iter()
            .map(|(name, field)| self.dialect().quote_identifier(field.db_column(name)))
            .collect::<Vec<_>>();
        let predicate = compile(condition, model, self.dialect(), 1)?;
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            columns.join(", "),
            self.dialect().quote_identifier(model.table()),
            predicate.where_clause(),
            self.dialect().quote_identifier(model.column(model.pk())?)
        );
        let rows = self.query(&sql, &predicate.args).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| {
                model
                    .fields()
                    .iter()
                    .map(|(name, field)| {
                        let value = row.remove(field.db_column(name)).unwrap_or(Value::Null);
                        (name.clone(), value)
                    })
                    .collect()
            })
            .collect())
    }
}

/// The definition a column is first added with.
///
/// Always nullable so existing rows stay valid. Dialects without in-place
/// constraint changes can't add UNIQUE columns either; the rebuild that
/// follows puts the constraint back.
fn addable_column(field: &Field, in_place: bool) -> Field {
    let mut addable = field.clone();
    let options = addable.options_mut();
    options.null = true;
    if !in_place {
        options.unique = false;
    }
    addable
}
