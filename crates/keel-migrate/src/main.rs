//! keel-migrate CLI
//!
//! Command-line tool for managing database migrations.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use keel_migrate::prelude::*;
use keel_orm::{ModelDeclaration, SqliteEngine};

/// Reversible schema migrations for keel models.
#[derive(Parser)]
#[command(name = "keel-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL.
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Migrations directory.
    #[arg(short, long, env = "KEEL_MIGRATIONS_DIR", default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Database identifier reported in driver errors.
    #[arg(long, default_value = "default")]
    database_name: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations.
    Migrate {
        /// App name to migrate (all if not specified).
        #[arg(short, long)]
        app: Option<String>,

        /// Last migration number to apply.
        #[arg(short, long, requires = "app")]
        to: Option<String>,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back applied migrations.
    Rollback {
        /// App name.
        #[arg(short, long)]
        app: String,

        /// Migration number to roll back to, exclusive; `0000` for all.
        #[arg(short, long)]
        to: String,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Show migration status.
    ShowMigrations {
        /// App name to show (all if not specified).
        #[arg(short, long)]
        app: Option<String>,
    },

    /// Generate a new migration from model declarations.
    MakeMigrations {
        /// App name to generate migrations for.
        #[arg(short, long)]
        app: String,

        /// JSON file holding the list of model declarations.
        #[arg(long)]
        models: PathBuf,

        /// Migration label (`initial` or `auto` if not specified).
        #[arg(short, long)]
        name: Option<String>,

        /// Print the migration without writing it (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Show SQL for a migration without executing.
    SqlMigrate {
        /// App name.
        #[arg(short, long)]
        app: String,

        /// Migration name.
        #[arg(short, long)]
        migration: String,

        /// Show rollback SQL instead of forward SQL.
        #[arg(short, long)]
        reverse: bool,

        /// Dialect to render the SQL in.
        #[arg(long, default_value = "sqlite")]
        dialect: String,
    },

    /// Initialize the migrations system (create the ledger table).
    Init,
}

async fn connect(database: &str, name: &str) -> anyhow::Result<SqliteEngine> {
    Ok(SqliteEngine::connect(database)
        .await?
        .with_database_name(name))
}

/// Splits a plan into runs of consecutive migrations of one app, keeping
/// the last migration name of each run.
fn runs<'m>(plan: &[&'m Migration]) -> Vec<(&'m str, &'m str)> {
    let mut runs: Vec<(&str, &str)> = Vec::new();
    for &migration in plan {
        match runs.last_mut() {
            Some((app, last)) if *app == migration.app => *last = migration.name.as_str(),
            _ => runs.push((migration.app.as_str(), migration.name.as_str())),
        }
    }
    runs
}

/// Ends a plan at the migration of `app` named or numbered `to`.
fn cut_plan<'m>(
    mut plan: Vec<&'m Migration>,
    app: &str,
    to: &str,
) -> Result<Vec<&'m Migration>> {
    let end = plan
        .iter()
        .position(|m| m.app == app && (m.name == to || m.number() == to))
        .ok_or_else(|| MigrateError::MigrationNotFound {
            app: app.to_string(),
            name: to.to_string(),
        })?;
    plan.truncate(end + 1);
    Ok(plan)
}

async fn migrate(
    executor: &mut MigrationExecutor<SqliteEngine>,
    loader: &MigrationLoader,
    app: Option<&str>,
    to: Option<&str>,
) -> anyhow::Result<()> {
    let graph: MigrationGraph = loader.load_all()?.into_iter().collect();
    let plan = match app {
        Some(app) => {
            if graph.app_migrations(app).is_empty() {
                return Err(MigrateError::UnknownApp(app.to_string()).into());
            }
            let plan = graph.plan(app)?;
            match to {
                Some(to) => cut_plan(plan, app, to)?,
                None => plan,
            }
        }
        None => graph.order()?,
    };
    if plan.is_empty() {
        info!("No migrations found. Use `makemigrations` first.");
        return Ok(());
    }

    for (run_app, last) in runs(&plan) {
        let migrations: Vec<Migration> = graph
            .app_migrations(run_app)
            .into_iter()
            .cloned()
            .collect();
        executor.apply(run_app, &migrations, Some(last)).await?;
    }
    Ok(())
}

async fn show_migrations(
    executor: &mut MigrationExecutor<SqliteEngine>,
    loader: &MigrationLoader,
    app: Option<String>,
) -> anyhow::Result<()> {
    let apps = match app {
        Some(app) => vec![app],
        None => loader.apps()?,
    };
    if apps.is_empty() {
        info!("No migrations found.");
        return Ok(());
    }

    for app in apps {
        let migrations = loader.load_app(&app)?;
        println!("{app}");
        for status in executor.status(&app, &migrations).await? {
            match status.applied_at {
                Some(at) if status.applied => println!(
                    " [X] {} ({})",
                    status.name,
                    at.format("%Y-%m-%d %H:%M:%S")
                ),
                _ if status.applied => println!(" [X] {}", status.name),
                _ => println!(" [ ] {}", status.name),
            }
        }
        println!();
    }
    Ok(())
}

fn make_migrations(
    loader: &MigrationLoader,
    app: &str,
    models: &Path,
    name: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let declarations: Vec<ModelDeclaration> =
        serde_json::from_str(&std::fs::read_to_string(models)?)?;

    let state = AppState::replay(app, &loader.load_app(app)?)?;
    let declared = declarations
        .iter()
        .map(|d| d.clone().build(app))
        .collect::<keel_orm::Result<Vec<_>>>()?;
    for altered in Autodetector::new(&state).altered_fields(&declared) {
        warn!(
            model = %altered.model,
            field = %altered.field,
            "Field definition changed; altering fields is not supported, change ignored"
        );
    }

    let Some(migration) = make_migration(app, &declarations, loader, name)? else {
        info!(app = %app, "No changes detected");
        return Ok(());
    };
    for operation in &migration.operations {
        info!("  - {}", operation.description());
    }

    if dry_run {
        println!("Would create migration: {}/{}", migration.app, migration.name);
        println!("\n{}", migration.to_json()?);
    } else {
        let path = loader.write(&migration)?;
        info!("Created migration: {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        database,
        migrations_dir,
        database_name,
        verbose,
        command,
    } = Cli::parse();

    // Setup logging
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let loader = MigrationLoader::new(migrations_dir, OperationRegistry::default());

    match command {
        Commands::Init => {
            info!("Initializing migrations system...");
            let mut executor = MigrationExecutor::new(connect(&database, &database_name).await?);
            executor.init().await?;
            info!("Migrations table created successfully.");
        }

        Commands::Migrate { app, to, dry_run } => {
            let mut executor =
                MigrationExecutor::new(connect(&database, &database_name).await?).dry_run(dry_run);
            executor.init().await?;
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            migrate(&mut executor, &loader, app.as_deref(), to.as_deref()).await?;
        }

        Commands::Rollback { app, to, dry_run } => {
            let migrations = loader.load_app(&app)?;
            if migrations.is_empty() {
                return Err(MigrateError::UnknownApp(app).into());
            }
            let mut executor =
                MigrationExecutor::new(connect(&database, &database_name).await?).dry_run(dry_run);
            executor.init().await?;
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            executor.rollback(&app, &migrations, &to).await?;
        }

        Commands::ShowMigrations { app } => {
            let mut executor = MigrationExecutor::new(connect(&database, &database_name).await?);
            executor.init().await?;
            show_migrations(&mut executor, &loader, app).await?;
        }

        Commands::MakeMigrations {
            app,
            models,
            name,
            dry_run,
        } => make_migrations(&loader, &app, &models, name.as_deref(), dry_run)?,

        Commands::SqlMigrate {
            app,
            migration,
            reverse,
            dialect,
        } => {
            let migrations = loader.load_app(&app)?;
            for sql in migration_sql(&dialect, &app, &migrations, &migration, reverse).await? {
                println!("{sql};");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_orm::{Field, FieldMap};
    use sqlx::sqlite::SqlitePoolOptions;

    fn create(app: &str, name: &str, model: &str) -> Migration {
        let mut fields = FieldMap::new();
        fields.insert("id".to_string(), Field::auto());
        Migration::new(app, name)
            .unwrap()
            .operation(Operation::CreateModel(CreateModel {
                name: model.to_string(),
                table: None,
                fields,
            }))
    }

    /// `main/0002_auto` needs `auth/0001_initial`, which needs `main/0001_initial`.
    fn interleaved() -> Vec<Migration> {
        vec![
            create("main", "0001_initial", "User"),
            create("auth", "0001_initial", "Group").depends_on("main", "0001_initial"),
            create("main", "0002_auto", "Post").depends_on("auth", "0001_initial"),
        ]
    }

    async fn setup() -> (tempfile::TempDir, MigrationLoader, MigrationExecutor<SqliteEngine>) {
        let dir = tempfile::tempdir().unwrap();
        let loader = MigrationLoader::new(dir.path(), OperationRegistry::default());
        for migration in interleaved() {
            loader.write(&migration).unwrap();
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        let mut executor = MigrationExecutor::new(SqliteEngine::new(pool));
        executor.init().await.unwrap();
        (dir, loader, executor)
    }

    async fn applied(
        executor: &mut MigrationExecutor<SqliteEngine>,
        loader: &MigrationLoader,
        app: &str,
    ) -> Vec<bool> {
        let migrations = loader.load_app(app).unwrap();
        executor
            .status(app, &migrations)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.applied)
            .collect()
    }

    #[test]
    fn test_cut_plan() {
        let migrations = interleaved();
        let plan: Vec<&Migration> = migrations.iter().collect();

        assert_eq!(cut_plan(plan.clone(), "main", "0001").unwrap().len(), 1);
        assert_eq!(cut_plan(plan.clone(), "auth", "0001_initial").unwrap().len(), 2);
        assert_eq!(cut_plan(plan.clone(), "main", "0002_auto").unwrap().len(), 3);
        assert!(matches!(
            cut_plan(plan, "main", "0009"),
            Err(MigrateError::MigrationNotFound { .. })
        ));
    }

    #[test]
    fn test_runs_split_by_app() {
        let migrations = interleaved();
        let plan: Vec<&Migration> = migrations.iter().collect();
        assert_eq!(
            runs(&plan),
            vec![
                ("main", "0001_initial"),
                ("auth", "0001_initial"),
                ("main", "0002_auto"),
            ]
        );
    }

    #[tokio::test]
    async fn test_migrate_to_through_another_app() {
        let (_dir, loader, mut executor) = setup().await;

        migrate(&mut executor, &loader, Some("main"), Some("0002"))
            .await
            .unwrap();

        assert_eq!(applied(&mut executor, &loader, "main").await, vec![true, true]);
        assert_eq!(applied(&mut executor, &loader, "auth").await, vec![true]);
    }

    #[tokio::test]
    async fn test_migrate_to_stops_early() {
        let (_dir, loader, mut executor) = setup().await;

        migrate(&mut executor, &loader, Some("main"), Some("0001"))
            .await
            .unwrap();

        assert_eq!(applied(&mut executor, &loader, "main").await, vec![true, false]);
        assert_eq!(applied(&mut executor, &loader, "auth").await, vec![false]);
        assert!(migrate(&mut executor, &loader, Some("main"), Some("0007"))
            .await
            .is_err());
    }
}
