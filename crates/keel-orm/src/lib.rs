//! # keel-orm
//!
//! Model snapshots, condition trees and the driver engine boundary used by
//! keel's migration machinery.
//!
//! This crate provides:
//! - [`Field`] descriptors and [`ModelDeclaration`] / [`ModelSnapshot`]
//! - [`Q`] objects and [`Condition`] trees, compiled to SQL by [`compile`]
//! - SQL [`Dialect`]s for SQLite and PostgreSQL
//! - the [`Engine`] trait with a sqlx-backed [`SqliteEngine`] and an
//!   in-memory [`RecordingEngine`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use keel_orm::{Engine, Field, ModelDeclaration, Q, SqliteEngine};
//!
//! async fn example() -> keel_orm::Result<()> {
//!     let user = ModelDeclaration::new("User")
//!         .field("email", Field::char(100).unique())
//!         .field("age", Field::integer().null())
//!         .build("main")?;
//!
//!     let mut engine = SqliteEngine::connect("sqlite::memory:").await?;
//!     engine.create_table(&user).await?;
//!
//!     let adults = engine
//!         .select_rows(&user, &Q::gte("age", 18).and_not(Q::eq("email", "root@localhost")))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Condition Trees
//!
//! Chains associate left to right and every nested chain gets its own
//! parentheses, so precedence never depends on the database:
//!
//! ```ignore
//! // ("a" = ? OR "b" = ?) AND NOT ("c" = ?)
//! let cond = Q::eq("a", 1).or(Q::eq("b", 2)).and_not(Q::eq("c", 3));
//! ```

pub mod dialect;
pub mod engine;
mod error;
pub mod fields;
pub mod model;
pub mod query;
mod value;

pub use dialect::{Dialect, PostgresDialect, SqliteDialect};
pub use engine::{Engine, RecordedStatement, RecordingEngine, SqliteEngine};
pub use error::{OrmError, Result};
pub use fields::{Field, FieldMap, SqlType};
pub use model::{default_table_name, Indexes, ModelDeclaration, ModelSnapshot};
pub use query::{compile, CompiledPredicate, Condition, Operator, Q};
pub use value::{Getter, Value, Values};
