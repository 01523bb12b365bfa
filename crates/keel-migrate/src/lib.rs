//! Reversible schema migrations for keel models.
//!
//! `keel-migrate` records schema history as a sequence of migrations per
//! application. Each migration is a list of reversible operations:
//!
//! - **Operations** - `CreateModel`, `DeleteModel`, `AddFields`,
//!   `RemoveFields`, `AddIndex`, `RemoveIndex`, each able to move an
//!   [`AppState`](state::AppState) forward and to run or undo its DDL
//! - **State** - the schema of an app, rebuilt by replaying its migrations
//! - **Autodetector** - diffs declared models against the replayed state
//! - **Loader** - reads and writes JSON migration files
//! - **Graph** - orders migrations across apps by their dependencies
//! - **Ledger** - the `keel_migration` table of applied migrations
//! - **Executor** - applies and rolls back migrations, one transaction each
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_migrate::prelude::*;
//! use keel_orm::{Field, ModelDeclaration, SqliteEngine};
//!
//! let loader = MigrationLoader::new("migrations", OperationRegistry::default());
//! let user = ModelDeclaration::new("User").field("email", Field::char(100));
//! if let Some(migration) = make_migration("main", &[user], &loader, None)? {
//!     loader.write(&migration)?;
//! }
//!
//! let mut executor = MigrationExecutor::new(SqliteEngine::connect("sqlite:db.sqlite3").await?);
//! executor.init().await?;
//! executor.apply("main", &loader.load_app("main")?, None).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Generate a migration from model declarations
//! keel-migrate makemigrations --app main --models models.json
//!
//! # Apply pending migrations
//! keel-migrate migrate --app main
//!
//! # Show migration status
//! keel-migrate showmigrations
//!
//! # Roll everything back
//! keel-migrate rollback --app main --to 0000
//! ```

pub mod autodetector;
pub mod error;
pub mod executor;
pub mod graph;
pub mod ledger;
pub mod loader;
pub mod migration;
pub mod operations;
pub mod registry;
pub mod state;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::autodetector::{diff, make_migration, AlteredField, Autodetector};
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{migration_sql, MigrationExecutor, MigrationStatus};
    pub use crate::graph::MigrationGraph;
    pub use crate::ledger::{AppliedMigration, Ledger, LEDGER_TABLE};
    pub use crate::loader::MigrationLoader;
    pub use crate::migration::{Dependency, Migration};
    pub use crate::operations::{
        AddFields, AddIndex, CreateModel, DeleteModel, Operation, RemoveFields, RemoveIndex,
    };
    pub use crate::registry::OperationRegistry;
    pub use crate::state::AppState;
}
