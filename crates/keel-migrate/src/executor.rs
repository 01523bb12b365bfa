//! Migration executor.
//!
//! This module applies and rolls back the migrations of one application
//! against an [`Engine`], keeping the [`Ledger`] in step. A migration runs
//! inside one transaction when the dialect has transactional DDL. Otherwise
//! its operations run one after the other and a failure undoes the
//! operations that already completed, as far as that is possible.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use keel_orm::{dialect, Engine, RecordingEngine};
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::ledger::{AppliedMigration, Ledger};
use crate::migration::{parse_name, Migration};
use crate::state::AppState;

/// The `(after, before)` states around each operation of a migration.
type StatePairs = [(AppState, AppState)];

/// Whether a migration has been applied, as shown by `showmigrations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration name.
    pub name: String,
    /// Migration number.
    pub number: String,
    /// Whether the ledger records it.
    pub applied: bool,
    /// When it was applied.
    pub applied_at: Option<NaiveDateTime>,
}

/// Accepts either a bare number (`0002`) or a full migration name.
fn target_number(target: &str) -> &str {
    parse_name(target).map_or(target, |(number, _)| number)
}

fn sorted<'m>(app: &str, migrations: &'m [Migration]) -> Result<Vec<&'m Migration>> {
    let mut sorted = Vec::with_capacity(migrations.len());
    for migration in migrations {
        if migration.app != app {
            return Err(MigrateError::state(
                app,
                format!(
                    "migration {} belongs to app '{}'",
                    migration.name, migration.app
                ),
            ));
        }
        sorted.push(migration);
    }
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sorted)
}

fn recorder(dialect: &str) -> Result<RecordingEngine> {
    dialect::by_name(dialect)
        .map(RecordingEngine::new)
        .ok_or_else(|| MigrateError::UnknownDialect(dialect.to_string()))
}

/// Runs the operations forward, counting the ones that completed.
async fn run_forward<E: Engine>(
    engine: &mut E,
    migration: &Migration,
    pairs: &StatePairs,
    completed: &mut usize,
) -> Result<()> {
    for (operation, (state, prev)) in migration.operations.iter().zip(pairs) {
        operation.run(engine, state, prev).await?;
        *completed += 1;
    }
    Ok(())
}

/// Undoes the first `count` operations, last one first.
async fn run_backwards<E: Engine>(
    engine: &mut E,
    migration: &Migration,
    pairs: &StatePairs,
    count: usize,
) -> Result<()> {
    let steps: Vec<_> = migration.operations.iter().zip(pairs).take(count).collect();
    for (operation, (state, prev)) in steps.into_iter().rev() {
        operation.backwards(engine, state, prev).await?;
    }
    Ok(())
}

fn print_statements(engine: &RecordingEngine) {
    for sql in engine.sql() {
        println!("{sql};");
    }
}

/// Returns the SQL that applying `name`, or with `reverse` rolling it
/// back, would execute in `dialect`. Nothing touches a database.
pub async fn migration_sql(
    dialect: &str,
    app: &str,
    migrations: &[Migration],
    name: &str,
    reverse: bool,
) -> Result<Vec<String>> {
    let sorted = sorted(app, migrations)?;
    let position = sorted.iter().position(|m| m.name == name).ok_or_else(|| {
        MigrateError::MigrationNotFound {
            app: app.to_string(),
            name: name.to_string(),
        }
    })?;
    let migration = sorted[position];
    let state = AppState::replay(app, sorted[..position].iter().copied())?;
    let pairs = state
        .operation_states(migration)
        .map_err(|e| e.in_migration(app, name))?;

    let mut engine = recorder(dialect)?;
    let result = if reverse {
        run_backwards(&mut engine, migration, &pairs, pairs.len()).await
    } else {
        run_forward(&mut engine, migration, &pairs, &mut 0).await
    };
    result.map_err(|e| e.in_migration(app, name))?;
    Ok(engine.sql().into_iter().map(String::from).collect())
}

/// Executes migrations against a database.
pub struct MigrationExecutor<E: Engine> {
    engine: E,
    dry_run: bool,
}

impl<E: Engine> MigrationExecutor<E> {
    /// Creates a new migration executor.
    pub const fn new(engine: E) -> Self {
        Self {
            engine,
            dry_run: false,
        }
    }

    /// Enables dry-run mode: statements are printed, never executed, and
    /// the ledger is only read.
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the engine.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the engine mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Consumes the executor, returning its engine.
    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Ensures the ledger table exists.
    pub async fn init(&mut self) -> Result<()> {
        if !self.dry_run {
            Ledger::new(&mut self.engine)?.ensure_table().await?;
        }
        Ok(())
    }

    /// Reads the ledger rows of `app`. A dry run against a database without
    /// a ledger sees an empty history.
    async fn applied(&mut self, app: &str) -> Result<Vec<AppliedMigration>> {
        match Ledger::new(&mut self.engine)?.applied(app).await {
            Err(MigrateError::Ledger { message }) if self.dry_run => {
                debug!(app = %app, message = %message, "No ledger, assuming nothing applied");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Checks if a migration has been applied.
    pub async fn is_applied(&mut self, app: &str, name: &str) -> Result<bool> {
        Ok(self.applied(app).await?.iter().any(|m| m.name == name))
    }

    /// Returns the status of each migration of `app`, sorted by name.
    pub async fn status(
        &mut self,
        app: &str,
        migrations: &[Migration],
    ) -> Result<Vec<MigrationStatus>> {
        let applied = self.applied(app).await?;
        Ok(sorted(app, migrations)?
            .into_iter()
            .map(|migration| {
                let record = applied.iter().find(|a| a.name == migration.name);
                MigrationStatus {
                    name: migration.name.clone(),
                    number: migration.number().to_string(),
                    applied: record.is_some(),
                    applied_at: record.and_then(|a| a.applied),
                }
            })
            .collect())
    }

    /// Applies the unapplied migrations of `app` in ascending order, up to
    /// and including `target` when given. Returns the names applied.
    ///
    /// Migrations already in the ledger are skipped. A failure rolls the
    /// failing migration back and leaves its ledger row unwritten.
    pub async fn apply(
        &mut self,
        app: &str,
        migrations: &[Migration],
        target: Option<&str>,
    ) -> Result<Vec<String>> {
        let sorted = sorted(app, migrations)?;
        let target = target.map(target_number);
        if let Some(target) = target {
            if !sorted.iter().any(|m| m.number() == target) {
                return Err(MigrateError::MigrationNotFound {
                    app: app.to_string(),
                    name: target.to_string(),
                });
            }
        }

        let recorded: BTreeSet<String> = self
            .applied(app)
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect();

        let mut state = AppState::new(app);
        let mut applied = Vec::new();
        for migration in sorted {
            if target.is_some_and(|t| migration.number() > t) {
                break;
            }
            if recorded.contains(&migration.name) {
                warn!(
                    app = %app,
                    name = %migration.name,
                    "Migration already applied, skipping"
                );
                state.apply_migration(migration)?;
                continue;
            }
            self.check_dependencies(migration, &applied).await?;
            state = self
                .apply_one(state, migration)
                .await
                .map_err(|e| e.in_migration(app, &migration.name))?;
            applied.push(migration.name.clone());
        }

        if applied.is_empty() {
            info!(app = %app, "No migrations to apply");
        }
        Ok(applied)
    }

    async fn check_dependencies(&mut self, migration: &Migration, applied: &[String]) -> Result<()> {
        for (dep_app, dep_name) in &migration.dependencies {
            let satisfied = (*dep_app == migration.app && applied.contains(dep_name))
                || self.is_applied(dep_app, dep_name).await?;
            if !satisfied {
                return Err(MigrateError::MissingDependency {
                    migration: format!("{}/{}", migration.app, migration.name),
                    dependency: format!("{dep_app}/{dep_name}"),
                });
            }
        }
        Ok(())
    }

    async fn apply_one(&mut self, mut state: AppState, migration: &Migration) -> Result<AppState> {
        info!(
            app = %migration.app,
            name = %migration.name,
            "Applying migration"
        );
        let pairs = state.operation_states(migration)?;

        if self.dry_run {
            let mut recording = recorder(self.engine.dialect().name())?;
            run_forward(&mut recording, migration, &pairs, &mut 0).await?;
            print_statements(&recording);
        } else if self.engine.dialect().supports_transactional_ddl() {
            self.engine.begin().await?;
            match self.forward_and_record(migration, &pairs).await {
                Ok(()) => self.engine.commit().await?,
                Err(err) => {
                    self.abort().await;
                    return Err(err);
                }
            }
        } else {
            let mut completed = 0;
            if let Err(err) = run_forward(&mut self.engine, migration, &pairs, &mut completed).await {
                warn!(
                    app = %migration.app,
                    name = %migration.name,
                    completed,
                    "Migration failed, undoing completed operations"
                );
                if let Err(cleanup) =
                    run_backwards(&mut self.engine, migration, &pairs, completed).await
                {
                    warn!(error = %cleanup, "Cleanup failed, schema may be partially migrated");
                }
                return Err(err);
            }
            Ledger::new(&mut self.engine)?
                .record_applied(&migration.app, &migration.name, migration.number())
                .await?;
        }

        state.apply_migration(migration)?;
        info!(
            app = %migration.app,
            name = %migration.name,
            "Migration applied successfully"
        );
        Ok(state)
    }

    async fn forward_and_record(&mut self, migration: &Migration, pairs: &StatePairs) -> Result<()> {
        run_forward(&mut self.engine, migration, pairs, &mut 0).await?;
        Ledger::new(&mut self.engine)?
            .record_applied(&migration.app, &migration.name, migration.number())
            .await
    }

    async fn backwards_and_unrecord(
        &mut self,
        migration: &Migration,
        pairs: &StatePairs,
    ) -> Result<()> {
        run_backwards(&mut self.engine, migration, pairs, pairs.len()).await?;
        Ledger::new(&mut self.engine)?
            .record_unapplied(&migration.app, &migration.name)
            .await
    }

    async fn abort(&mut self) {
        if let Err(err) = self.engine.rollback().await {
            warn!(error = %err, "Transaction rollback failed");
        }
    }

    /// Rolls back the applied migrations of `app` in descending order, down
    /// to but not including `target` (`0000` rolls back everything).
    /// Returns the names rolled back; nothing to roll back is not an error.
    pub async fn rollback(
        &mut self,
        app: &str,
        migrations: &[Migration],
        target: &str,
    ) -> Result<Vec<String>> {
        let target = target_number(target);
        let sorted = sorted(app, migrations)?;
        let recorded = self.applied(app).await?;
        for record in &recorded {
            if !sorted.iter().any(|m| m.name == record.name) {
                return Err(MigrateError::MigrationNotFound {
                    app: app.to_string(),
                    name: record.name.clone(),
                });
            }
        }
        let recorded: BTreeSet<&str> = recorded.iter().map(|m| m.name.as_str()).collect();

        let mut state = AppState::new(app);
        let mut undo = Vec::new();
        for migration in sorted {
            if !recorded.contains(migration.name.as_str()) {
                continue;
            }
            let pairs = state
                .operation_states(migration)
                .map_err(|e| e.in_migration(app, &migration.name))?;
            state.apply_migration(migration)?;
            if migration.number() > target {
                undo.push((migration, pairs));
            }
        }

        if undo.is_empty() {
            info!(app = %app, target = %target, "Nothing to roll back");
            return Ok(Vec::new());
        }

        let mut rolled_back = Vec::with_capacity(undo.len());
        for (migration, pairs) in undo.into_iter().rev() {
            self.rollback_one(migration, &pairs)
                .await
                .map_err(|e| e.in_migration(app, &migration.name))?;
            rolled_back.push(migration.name.clone());
        }
        Ok(rolled_back)
    }

    async fn rollback_one(&mut self, migration: &Migration, pairs: &StatePairs) -> Result<()> {
        info!(
            app = %migration.app,
            name = %migration.name,
            "Rolling back migration"
        );

        if self.dry_run {
            let mut recording = recorder(self.engine.dialect().name())?;
            run_backwards(&mut recording, migration, pairs, pairs.len()).await?;
            print_statements(&recording);
        } else if self.engine.dialect().supports_transactional_ddl() {
            self.engine.begin().await?;
            match self.backwards_and_unrecord(migration, pairs).await {
                Ok(()) => self.engine.commit().await?,
                Err(err) => {
                    self.abort().await;
                    return Err(err);
                }
            }
        } else {
            self.backwards_and_unrecord(migration, pairs).await?;
        }

        info!(
            app = %migration.app,
            name = %migration.name,
            "Migration rolled back successfully"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{
        AddFields, AddIndex, CreateModel, Operation, RemoveFields,
    };
    use keel_orm::{
        Dialect, Field, FieldMap, OrmError, SqlType, SqliteDialect, SqliteEngine, Value,
    };
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_engine() -> SqliteEngine {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        SqliteEngine::new(pool)
    }

    async fn table_exists<E: Engine>(engine: &mut E, table: &str) -> bool {
        engine
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[Value::from(table)],
            )
            .await
            .unwrap()
            .is_some()
    }

    fn create_model(name: &str) -> Operation {
        let mut fields = FieldMap::new();
        fields.insert("id".to_string(), Field::auto());
        fields.insert("email".to_string(), Field::char(100));
        Operation::CreateModel(CreateModel {
            name: name.to_string(),
            table: None,
            fields,
        })
    }

    fn initial() -> Migration {
        Migration::new("main", "0001_initial")
            .unwrap()
            .operation(create_model("User"))
            .operation(Operation::AddIndex(AddIndex {
                model: "User".to_string(),
                name: "main_user_email_idx".to_string(),
                fields: vec!["email".to_string()],
            }))
    }

    fn add_active() -> Migration {
        let mut fields = FieldMap::new();
        fields.insert("active".to_string(), Field::boolean().default(true));
        Migration::new("main", "0002_auto")
            .unwrap()
            .depends_on("main", "0001_initial")
            .operation(Operation::AddFields(AddFields {
                model: "User".to_string(),
                fields,
            }))
    }

    fn remove_active() -> Migration {
        Migration::new("main", "0003_auto")
            .unwrap()
            .depends_on("main", "0002_auto")
            .operation(Operation::RemoveFields(RemoveFields {
                model: "User".to_string(),
                fields: vec!["active".to_string()],
            }))
    }

    #[tokio::test]
    async fn test_apply_and_rollback() {
        let mut executor = MigrationExecutor::new(create_test_engine().await);
        executor.init().await.unwrap();

        let migrations = vec![initial(), add_active()];
        let applied = executor.apply("main", &migrations, None).await.unwrap();
        assert_eq!(applied, vec!["0001_initial", "0002_auto"]);
        assert!(table_exists(executor.engine_mut(), "main_user").await);
        assert!(executor.is_applied("main", "0002_auto").await.unwrap());

        let rolled_back = executor.rollback("main", &migrations, "0000").await.unwrap();
        assert_eq!(rolled_back, vec!["0002_auto", "0001_initial"]);
        assert!(!table_exists(executor.engine_mut(), "main_user").await);
        assert!(!executor.is_applied("main", "0001_initial").await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_idempotent() {
        let mut executor = MigrationExecutor::new(create_test_engine().await);
        executor.init().await.unwrap();

        let migrations = vec![initial()];
        executor.apply("main", &migrations, None).await.unwrap();
        let again = executor.apply("main", &migrations, None).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_apply_to_target_then_continue() {
        let mut executor = MigrationExecutor::new(create_test_engine().await);
        executor.init().await.unwrap();

        let migrations = vec![initial(), add_active(), remove_active()];
        let applied = executor
            .apply("main", &migrations, Some("0001"))
            .await
            .unwrap();
        assert_eq!(applied, vec!["0001_initial"]);

        // The later migrations replay the state of the applied one.
        let applied = executor.apply("main", &migrations, None).await.unwrap();
        assert_eq!(applied, vec!["0002_auto", "0003_auto"]);

        let columns = executor
            .engine_mut()
            .query("SELECT name FROM pragma_table_info('main_user')", &[])
            .await
            .unwrap();
        assert_eq!(columns.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let mut executor = MigrationExecutor::new(create_test_engine().await);
        executor.init().await.unwrap();
        assert!(matches!(
            executor.apply("main", &[initial()], Some("0007")).await,
            Err(MigrateError::MigrationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_apply_missing_dependency() {
        let mut executor = MigrationExecutor::new(create_test_engine().await);
        executor.init().await.unwrap();

        let migration = initial().depends_on("auth", "0001_initial");
        let result = executor.apply("main", &[migration], None).await;
        assert!(matches!(
            result,
            Err(MigrateError::MissingDependency { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_migration_leaves_no_trace() {
        let mut executor = MigrationExecutor::new(create_test_engine().await);
        executor.init().await.unwrap();
        executor
            .engine_mut()
            .execute("CREATE TABLE \"main_user\" (\"id\" INTEGER)", &[])
            .await
            .unwrap();

        let migration = Migration::new("main", "0001_initial")
            .unwrap()
            .operation(create_model("Tag"))
            .operation(create_model("User"));
        let err = executor.apply("main", &[migration], None).await.unwrap_err();

        match err {
            MigrateError::Migration { name, source, .. } => {
                assert_eq!(name, "0001_initial");
                assert!(matches!(
                    *source,
                    MigrateError::Orm(OrmError::Driver { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!table_exists(executor.engine_mut(), "main_tag").await);
        assert!(!executor.is_applied("main", "0001_initial").await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_nothing() {
        let mut executor = MigrationExecutor::new(create_test_engine().await);
        executor.init().await.unwrap();
        let rolled_back = executor.rollback("main", &[initial()], "0000").await.unwrap();
        assert!(rolled_back.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_to_target() {
        let mut executor = MigrationExecutor::new(create_test_engine().await);
        executor.init().await.unwrap();

        let migrations = vec![initial(), add_active(), remove_active()];
        executor.apply("main", &migrations, None).await.unwrap();
        let rolled_back = executor
            .rollback("main", &migrations, "0001_initial")
            .await
            .unwrap();
        assert_eq!(rolled_back, vec!["0003_auto", "0002_auto"]);

        let status = executor.status("main", &migrations).await.unwrap();
        let applied: Vec<bool> = status.iter().map(|s| s.applied).collect();
        assert_eq!(applied, vec![true, false, false]);
        assert!(status[0].applied_at.is_some());
    }

    #[tokio::test]
    async fn test_dry_run() {
        let engine = create_test_engine().await;
        let mut executor = MigrationExecutor::new(engine).dry_run(true);

        let applied = executor.apply("main", &[initial()], None).await.unwrap();
        assert_eq!(applied, vec!["0001_initial"]);

        // Neither the table nor the ledger exists.
        assert!(!table_exists(executor.engine_mut(), "main_user").await);
        assert!(!table_exists(executor.engine_mut(), "keel_migration").await);
    }

    #[tokio::test]
    async fn test_migration_sql() {
        let migrations = vec![initial(), add_active(), remove_active()];

        let forward = migration_sql("sqlite", "main", &migrations, "0003_auto", false)
            .await
            .unwrap();
        assert_eq!(
            forward,
            vec![
                "CREATE TABLE \"main_user__new\" (\"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \"email\" TEXT NOT NULL)",
                "INSERT INTO \"main_user__new\" (\"id\", \"email\") SELECT \"id\", \"email\" FROM \"main_user\"",
                "DROP TABLE \"main_user\"",
                "ALTER TABLE \"main_user__new\" RENAME TO \"main_user\"",
                "CREATE INDEX \"main_user_email_idx\" ON \"main_user\" (\"email\")",
            ]
        );

        let reverse = migration_sql("postgres", "main", &migrations, "0003_auto", true)
            .await
            .unwrap();
        assert_eq!(reverse[0], "ALTER TABLE \"main_user\" ADD COLUMN \"active\" BOOLEAN DEFAULT TRUE");
        assert_eq!(reverse.last().map(String::as_str), Some("ALTER TABLE \"main_user\" ALTER COLUMN \"active\" SET NOT NULL"));

        assert!(matches!(
            migration_sql("oracle", "main", &migrations, "0003_auto", false).await,
            Err(MigrateError::UnknownDialect(_))
        ));
    }

    /// SQLite syntax without transactional DDL.
    struct AutocommitDialect(SqliteDialect);

    impl Dialect for AutocommitDialect {
        fn name(&self) -> &'static str {
            "autocommit"
        }

        fn placeholder(&self, index: usize) -> String {
            self.0.placeholder(index)
        }

        fn type_name(&self, sql_type: SqlType) -> String {
            self.0.type_name(sql_type)
        }

        fn auto_increment_column(&self) -> &'static str {
            self.0.auto_increment_column()
        }

        fn supports_drop_column(&self) -> bool {
            false
        }

        fn supports_alter_nullability(&self) -> bool {
            false
        }

        fn supports_transactional_ddl(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_non_transactional_failure_undoes_completed_operations() {
        let engine = RecordingEngine::new(Box::new(AutocommitDialect(SqliteDialect::new())))
            .fail_on("CREATE TABLE \"main_user\"");
        let mut executor = MigrationExecutor::new(engine);

        let migration = Migration::new("main", "0001_initial")
            .unwrap()
            .operation(create_model("Tag"))
            .operation(create_model("User"));
        assert!(executor.apply("main", &[migration], None).await.is_err());

        let engine = executor.into_engine();
        let sql = engine.sql();
        assert!(sql[sql.len() - 2].starts_with("CREATE TABLE \"main_tag\""));
        assert_eq!(sql[sql.len() - 1], "DROP TABLE \"main_tag\"");
        assert!(!sql.iter().any(|s| s.starts_with("INSERT INTO \"keel_migration\"")));
        assert_eq!(engine.commits(), 0);
    }

    #[tokio::test]
    async fn test_transaction_per_migration() {
        let mut executor = MigrationExecutor::new(RecordingEngine::default());
        executor
            .apply("main", &[initial(), add_active()], None)
            .await
            .unwrap();

        let engine = executor.into_engine();
        assert_eq!(engine.commits(), 2);
        assert_eq!(engine.rollbacks(), 0);
        let ledger_rows = engine
            .sql()
            .iter()
            .filter(|s| s.starts_with("INSERT INTO \"keel_migration\""))
            .count();
        assert_eq!(ledger_rows, 2);
    }
}
