//! Error types for the ORM.

use thiserror::Error;

/// ORM-specific errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// A condition or operation references a field the model doesn't have.
    #[error("{model}: unknown field: {field}")]
    FieldResolution {
        /// Model the lookup was resolved against.
        model: String,
        /// The unresolvable field name.
        field: String,
    },

    /// A condition key carries an operator the dialect doesn't support.
    #[error("invalid lookup: {0}")]
    InvalidLookup(String),

    /// A model declaration violates a structural rule.
    #[error("invalid model {model}: {message}")]
    InvalidModel {
        /// Model name.
        model: String,
        /// What is wrong with it.
        message: String,
    },

    /// A NOT NULL column was added without a default to fill existing rows.
    #[error("{model}: cannot add not null column without default: {field}")]
    MissingDefault {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
    },

    /// The driver rejected a statement.
    #[error("database {database}: {source} (statement: {sql})")]
    Driver {
        /// Identifier of the database the statement ran against.
        database: String,
        /// The statement that failed.
        sql: String,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Connecting to the database failed.
    #[error("database {database}: cannot connect: {source}")]
    Connection {
        /// Database identifier.
        database: String,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Transaction misuse (commit without begin, nested begin, ...).
    #[error("database {database}: {message}")]
    Transaction {
        /// Database identifier.
        database: String,
        /// Error message.
        message: String,
    },
}

impl OrmError {
    /// Builds an [`OrmError::InvalidModel`].
    pub fn invalid_model(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidModel {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error came from the database driver.
    #[must_use]
    pub const fn is_driver_error(&self) -> bool {
        matches!(self, Self::Driver { .. } | Self::Connection { .. })
    }
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;
