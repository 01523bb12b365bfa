//! Error types for the migration system.

use std::path::PathBuf;

use keel_orm::OrmError;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// An ORM or driver error (field resolution, driver failures, ...).
    #[error(transparent)]
    Orm(#[from] OrmError),

    /// The replayed application state lacks a model or field an operation
    /// expects, or already has one it is about to create.
    #[error("inconsistent state for app '{app}': {message}")]
    StateConsistency {
        /// Application name.
        app: String,
        /// What is inconsistent.
        message: String,
    },

    /// The migration ledger is missing or unwritable.
    #[error("migration ledger: {message}")]
    Ledger {
        /// Error message.
        message: String,
    },

    /// A migration file names an operation the registry doesn't know.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A payload doesn't match the shape of its operation or field type.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A migration name doesn't follow `NNNN_label`.
    #[error("invalid migration name '{0}': expected NNNN_label")]
    InvalidMigrationName(String),

    /// Two migrations of an app share a number.
    #[error("duplicate migration number {number} in app '{app}'")]
    DuplicateMigration {
        /// Application name.
        app: String,
        /// The shared number.
        number: String,
    },

    /// A migration depends on another that doesn't exist or isn't applied.
    #[error("Migration '{migration}' depends on '{dependency}' which doesn't exist")]
    MissingDependency {
        /// The migration with the missing dependency.
        migration: String,
        /// The dependency that's missing.
        dependency: String,
    },

    /// A migration has a circular dependency.
    #[error("Circular dependency detected in migrations")]
    CircularDependency,

    /// Migration not found.
    #[error("Migration not found: {app}/{name}")]
    MigrationNotFound {
        /// Application name.
        app: String,
        /// Migration name.
        name: String,
    },

    /// No migrations exist for the app.
    #[error("no migrations found for app '{0}'")]
    UnknownApp(String),

    /// No dialect is known by that name.
    #[error("unknown dialect '{0}'")]
    UnknownDialect(String),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse migration file.
    #[error("Failed to parse migration file '{path}': {message}")]
    ParseError {
        /// Path to the migration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A failure while applying or rolling back a migration.
    #[error("migration {app}/{name}: {source}")]
    Migration {
        /// Application name.
        app: String,
        /// Migration name.
        name: String,
        /// The underlying failure.
        #[source]
        source: Box<MigrateError>,
    },
}

impl MigrateError {
    /// Builds a [`MigrateError::StateConsistency`].
    pub fn state(app: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateConsistency {
            app: app.into(),
            message: message.into(),
        }
    }

    /// Wraps the error with the migration it happened in.
    #[must_use]
    pub fn in_migration(self, app: &str, name: &str) -> Self {
        Self::Migration {
            app: app.to_string(),
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
