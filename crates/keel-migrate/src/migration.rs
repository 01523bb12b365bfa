//! Migration definitions and the migration file format.
//!
//! A migration file is JSON stored at `<dir>/<app>/<name>.json`:
//!
//! ```json
//! {
//!   "app": "main",
//!   "name": "0002_auto",
//!   "dependencies": [["main", "0001_initial"]],
//!   "operations": [
//!     {"AddFields": {"model": "User", "fields": {"active": {"BooleanField": {"default": true}}}}}
//!   ]
//! }
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::operations::Operation;
use crate::registry::OperationRegistry;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})_(\w+)$").expect("Invalid migration name regex"));

/// Splits a migration name like `0002_add_email` into number and label.
pub fn parse_name(name: &str) -> Result<(&str, &str)> {
    let invalid = || MigrateError::InvalidMigrationName(name.to_string());
    let captures = NAME_PATTERN.captures(name).ok_or_else(invalid)?;
    match (captures.get(1), captures.get(2)) {
        (Some(number), Some(label)) => Ok((number.as_str(), label.as_str())),
        _ => Err(invalid()),
    }
}

/// Formats a migration number as used in names and the ledger.
#[must_use]
pub fn format_number(number: u32) -> String {
    format!("{number:04}")
}

/// A dependency on another migration: `(app, name)`.
pub type Dependency = (String, String);

/// A migration: an ordered list of operations for one application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Migration {
    /// Application name.
    pub app: String,
    /// Migration name, `NNNN_label`.
    pub name: String,
    /// Migrations that must be applied first.
    pub dependencies: Vec<Dependency>,
    /// Operations, applied in order.
    pub operations: Vec<Operation>,
}

#[derive(Deserialize)]
struct RawMigration {
    app: String,
    name: String,
    #[serde(default)]
    dependencies: Vec<Dependency>,
    operations: serde_json::Value,
}

impl Migration {
    /// Creates an empty migration, validating its name.
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        parse_name(&name)?;
        Ok(Self {
            app: app.into(),
            name,
            dependencies: Vec::new(),
            operations: Vec::new(),
        })
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, app: impl Into<String>, name: impl Into<String>) -> Self {
        self.dependencies.push((app.into(), name.into()));
        self
    }

    /// Adds an operation.
    #[must_use]
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Returns the 4-digit number of the migration.
    #[must_use]
    pub fn number(&self) -> &str {
        parse_name(&self.name).map_or("", |(number, _)| number)
    }

    /// Returns the number as an integer.
    #[must_use]
    pub fn number_value(&self) -> u32 {
        self.number().parse().unwrap_or(0)
    }

    /// Returns the label after the number.
    #[must_use]
    pub fn label(&self) -> &str {
        parse_name(&self.name).map_or("", |(_, label)| label)
    }

    /// Serializes the migration file.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a migration file, decoding operations through `registry`.
    pub fn from_json(raw: &str, registry: &OperationRegistry) -> Result<Self> {
        let raw: RawMigration = serde_json::from_str(raw)?;
        parse_name(&raw.name)?;
        Ok(Self {
            app: raw.app,
            name: raw.name,
            dependencies: raw.dependencies,
            operations: registry.decode_list(raw.operations)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{DeleteModel, RemoveFields};

    #[test]
    fn test_parse_name() {
        assert_eq!(parse_name("0002_add_email").unwrap(), ("0002", "add_email"));
        assert!(parse_name("2_add_email").is_err());
        assert!(parse_name("0002-add").is_err());
        assert!(parse_name("0002_").is_err());
    }

    #[test]
    fn test_parse_name_repeatedly() {
        for n in 1..=500 {
            let name = format!("{}_step_{n}", format_number(n));
            let (number, label) = parse_name(&name).unwrap();
            assert_eq!(number.parse::<u32>().unwrap(), n);
            assert_eq!(label, format!("step_{n}"));
        }
    }

    #[test]
    fn test_number_and_label() {
        let migration = Migration::new("main", "0013_auto").unwrap();
        assert_eq!(migration.number(), "0013");
        assert_eq!(migration.number_value(), 13);
        assert_eq!(migration.label(), "auto");
        assert_eq!(format_number(13), "0013");
    }

    #[test]
    fn test_file_round_trip() {
        let migration = Migration::new("main", "0002_auto")
            .unwrap()
            .depends_on("main", "0001_initial")
            .operation(Operation::RemoveFields(RemoveFields {
                model: "User".to_string(),
                fields: vec!["active".to_string()],
            }))
            .operation(Operation::DeleteModel(DeleteModel {
                name: "Tag".to_string(),
            }));

        let json = migration.to_json().unwrap();
        assert!(json.contains("\"0001_initial\""));
        let back = Migration::from_json(&json, &OperationRegistry::default()).unwrap();
        assert_eq!(back, migration);
    }

    #[test]
    fn test_from_json_rejects_unknown_operation() {
        let raw = r#"{"app": "main", "name": "0001_initial", "operations": [{"Bogus": {}}]}"#;
        let err = Migration::from_json(raw, &OperationRegistry::default()).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidOperation(name) if name == "Bogus"));
    }

    #[test]
    fn test_from_json_rejects_bad_name() {
        let raw = r#"{"app": "main", "name": "initial", "operations": []}"#;
        assert!(matches!(
            Migration::from_json(raw, &OperationRegistry::default()),
            Err(MigrateError::InvalidMigrationName(_))
        ));
    }
}
