//! Reading and writing migration files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::migration::{format_number, Migration};
use crate::registry::OperationRegistry;

/// Loads migrations from `<dir>/<app>/<name>.json` files.
#[derive(Debug, Clone)]
pub struct MigrationLoader {
    dir: PathBuf,
    registry: OperationRegistry,
}

impl MigrationLoader {
    /// Creates a loader rooted at `dir`, decoding with `registry`.
    pub fn new(dir: impl Into<PathBuf>, registry: OperationRegistry) -> Self {
        Self {
            dir: dir.into(),
            registry,
        }
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the directory holding the migrations of `app`.
    #[must_use]
    pub fn app_dir(&self, app: &str) -> PathBuf {
        self.dir.join(app)
    }

    /// Lists apps that have a migrations directory, sorted.
    pub fn apps(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut apps = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                apps.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        apps.sort();
        Ok(apps)
    }

    /// Loads the migrations of `app`, sorted by number.
    ///
    /// An app without a directory has no migrations.
    pub fn load_app(&self, app: &str) -> Result<Vec<Migration>> {
        let dir = self.app_dir(app);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut migrations = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            migrations.push(self.load_file(&path, app)?);
        }
        migrations.sort_by(|a, b| a.name.cmp(&b.name));

        let mut numbers = BTreeSet::new();
        for migration in &migrations {
            if !numbers.insert(migration.number().to_string()) {
                return Err(MigrateError::DuplicateMigration {
                    app: app.to_string(),
                    number: migration.number().to_string(),
                });
            }
        }
        debug!(app = %app, count = migrations.len(), "loaded migrations");
        Ok(migrations)
    }

    /// Loads the migrations of every app.
    pub fn load_all(&self) -> Result<Vec<Migration>> {
        let mut all = Vec::new();
        for app in self.apps()? {
            all.extend(self.load_app(&app)?);
        }
        Ok(all)
    }

    fn load_file(&self, path: &Path, app: &str) -> Result<Migration> {
        let parse_error = |message: String| MigrateError::ParseError {
            path: path.to_path_buf(),
            message,
        };
        let raw = fs::read_to_string(path)?;
        let migration = Migration::from_json(&raw, &self.registry)
            .map_err(|e| parse_error(e.to_string()))?;

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if migration.name != stem {
            return Err(parse_error(format!(
                "file name does not match migration name {}",
                migration.name
            )));
        }
        if migration.app != app {
            return Err(parse_error(format!(
                "migration belongs to app '{}'",
                migration.app
            )));
        }
        Ok(migration)
    }

    /// Finds a migration of `app` by name.
    pub fn find(&self, app: &str, name: &str) -> Result<Migration> {
        self.load_app(app)?
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| MigrateError::MigrationNotFound {
                app: app.to_string(),
                name: name.to_string(),
            })
    }

    /// Returns the number the next migration of `app` gets.
    pub fn next_number(&self, app: &str) -> Result<String> {
        let last = self
            .load_app(app)?
            .last()
            .map_or(0, Migration::number_value);
        Ok(format_number(last + 1))
    }

    /// Writes a migration file, returning its path.
    pub fn write(&self, migration: &Migration) -> Result<PathBuf> {
        let dir = self.app_dir(&migration.app);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", migration.name));
        fs::write(&path, migration.to_json()?)?;
        debug!(path = %path.display(), "wrote migration");
        Ok(path)
    }
}
