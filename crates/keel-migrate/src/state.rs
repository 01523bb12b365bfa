//! Application state reconstruction.
//!
//! An [`AppState`] is the schema of one application as of a migration: its
//! model snapshots plus the names of the migrations that produced it. It is
//! always rebuilt from scratch by replaying every operation in order, so a
//! diff compares against the cumulative effect of the recorded history.

use std::collections::BTreeMap;

use keel_orm::ModelSnapshot;

use crate::error::{MigrateError, Result};
use crate::migration::Migration;

/// The schema of one application at a point in its migration history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    app: String,
    models: BTreeMap<String, ModelSnapshot>,
    migrations: Vec<String>,
}

impl AppState {
    /// Creates an empty state for `app`.
    #[must_use]
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            ..Self::default()
        }
    }

    /// Replays `migrations` in order on an empty state.
    pub fn replay<'a>(
        app: &str,
        migrations: impl IntoIterator<Item = &'a Migration>,
    ) -> Result<Self> {
        let mut state = Self::new(app);
        for migration in migrations {
            state.apply_migration(migration)?;
        }
        Ok(state)
    }

    /// Applies the operations of one migration and records its name.
    pub fn apply_migration(&mut self, migration: &Migration) -> Result<()> {
        if migration.app != self.app {
            return Err(MigrateError::state(
                &self.app,
                format!("migration {} belongs to app '{}'", migration.name, migration.app),
            ));
        }
        for operation in &migration.operations {
            operation
                .set_state(self)
                .map_err(|e| e.in_migration(&migration.app, &migration.name))?;
        }
        self.migrations.push(migration.name.clone());
        Ok(())
    }

    /// Returns the application name.
    #[must_use]
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Returns the models by name.
    #[must_use]
    pub fn models(&self) -> &BTreeMap<String, ModelSnapshot> {
        &self.models
    }

    /// Looks up a model by name.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&ModelSnapshot> {
        self.models.get(name)
    }

    /// Looks up a model that must exist.
    pub fn require_model(&self, name: &str) -> Result<&ModelSnapshot> {
        self.models
            .get(name)
            .ok_or_else(|| MigrateError::state(&self.app, format!("model not found: {name}")))
    }

    pub(crate) fn require_model_mut(&mut self, name: &str) -> Result<&mut ModelSnapshot> {
        let app = &self.app;
        self.models
            .get_mut(name)
            .ok_or_else(|| MigrateError::state(app, format!("model not found: {name}")))
    }

    pub(crate) fn insert_model(&mut self, model: ModelSnapshot) -> Result<()> {
        if self.models.contains_key(model.name()) {
            return Err(MigrateError::state(
                &self.app,
                format!("duplicate model: {}", model.name()),
            ));
        }
        self.models.insert(model.name().to_string(), model);
        Ok(())
    }

    pub(crate) fn remove_model(&mut self, name: &str) -> Result<ModelSnapshot> {
        self.models
            .remove(name)
            .ok_or_else(|| MigrateError::state(&self.app, format!("model not found: {name}")))
    }

    /// Returns the names of the migrations replayed into this state.
    #[must_use]
    pub fn migrations(&self) -> &[String] {
        &self.migrations
    }

    /// Returns the name of the last migration replayed, if any.
    #[must_use]
    pub fn last_migration(&self) -> Option<&str> {
        self.migrations.last().map(String::as_str)
    }

    /// Computes the state pair `(after, before)` around each operation of
    /// `migration`, starting from this state.
    pub fn operation_states(&self, migration: &Migration) -> Result<Vec<(Self, Self)>> {
        let mut pairs = Vec::with_capacity(migration.operations.len());
        let mut current = self.clone();
        for operation in &migration.operations {
            let before = current.clone();
            operation.set_state(&mut current)?;
            pairs.push((current.clone(), before));
        }
        Ok(pairs)
    }
}
