//! Model declarations and snapshots.
//!
//! A [`ModelSnapshot`] is the schema shape of one table at a point in
//! migration history: its fields in declaration order, the primary key,
//! the physical table name and the named indexes. Snapshots are built either
//! from a [`ModelDeclaration`] (what the application code declares) or from
//! raw parts while replaying migration operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{OrmError, Result};
use crate::fields::{Field, FieldMap};

/// Named indexes: index name to the indexed field names.
pub type Indexes = BTreeMap<String, Vec<String>>;

/// Returns the default table name for a model of an application.
#[must_use]
pub fn default_table_name(app: &str, model: &str) -> String {
    format!("{}_{}", app.to_lowercase(), model.to_lowercase())
}

/// A model as declared by application code.
///
/// # Example
///
/// ```ignore
/// use keel_orm::{Field, ModelDeclaration};
///
/// let user = ModelDeclaration::new("User")
///     .field("email", Field::char(100).index())
///     .field("active", Field::boolean().default(true))
///     .build("main")?;
/// assert_eq!(user.pk(), "id");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDeclaration {
    /// Model name.
    pub name: String,
    /// Table name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Declared fields.
    #[serde(default)]
    pub fields: FieldMap,
    /// Explicitly declared indexes.
    #[serde(default)]
    pub indexes: Indexes,
}

impl ModelDeclaration {
    /// Starts a declaration for the named model.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Adds a named index over the given fields.
    #[must_use]
    pub fn index<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.indexes
            .insert(name.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Validates the declaration and registers it under `app`.
    ///
    /// Adds an `id` [`Field::auto`] primary key when none is declared and one
    /// `{app}_{model}_{field}_auto_idx` index per field flagged with `index`.
    pub fn build(self, app: &str) -> Result<ModelSnapshot> {
        let Self {
            name,
            table,
            mut fields,
            mut indexes,
        } = self;

        let pks: Vec<&String> = fields
            .iter()
            .filter(|(_, f)| f.is_pk())
            .map(|(n, _)| n)
            .collect();
        if pks.len() > 1 {
            return Err(OrmError::invalid_model(
                &name,
                format!("duplicate pk: {}", pks[1]),
            ));
        }
        if pks.is_empty() {
            if fields.contains_key("id") {
                return Err(OrmError::invalid_model(
                    &name,
                    "field id is not a primary key but no other primary key is declared",
                ));
            }
            fields.shift_insert(0, "id".to_string(), Field::auto());
        }

        for (field_name, field) in &fields {
            if field.has_index() {
                let idx_name = format!(
                    "{}_{}_{}_auto_idx",
                    app.to_lowercase(),
                    name.to_lowercase(),
                    field_name.to_lowercase()
                );
                if indexes.contains_key(&idx_name) {
                    return Err(OrmError::invalid_model(
                        &name,
                        format!("duplicate index: {idx_name}"),
                    ));
                }
                indexes.insert(idx_name, vec![field_name.clone()]);
            }
        }

        let table = table.unwrap_or_else(|| default_table_name(app, &name));
        ModelSnapshot::from_parts(app, name, table, fields, indexes)
    }
}

/// The schema shape of one table at a specific point in migration history.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSnapshot {
    app: String,
    name: String,
    table: String,
    pk: String,
    fields: FieldMap,
    indexes: Indexes,
}

impl ModelSnapshot {
    /// Builds a snapshot from raw parts, as recorded by migrations.
    ///
    /// Unlike [`ModelDeclaration::build`] nothing is added implicitly: the
    /// fields must contain exactly one primary key and every index must
    /// reference existing fields.
    pub fn from_parts(
        app: impl Into<String>,
        name: impl Into<String>,
        table: impl Into<String>,
        fields: FieldMap,
        indexes: Indexes,
    ) -> Result<Self> {
        let name = name.into();
        let mut pks = fields.iter().filter(|(_, f)| f.is_pk()).map(|(n, _)| n);
        let pk = match (pks.next(), pks.next()) {
            (Some(pk), None) => pk.clone(),
            (Some(_), Some(dup)) => {
                return Err(OrmError::invalid_model(&name, format!("duplicate pk: {dup}")));
            }
            (None, _) => return Err(OrmError::invalid_model(&name, "missing primary key")),
        };
        let mut snapshot = Self {
            app: app.into(),
            name,
            table: table.into(),
            pk,
            fields,
            indexes: Indexes::new(),
        };
        for (idx_name, idx_fields) in indexes {
            snapshot.add_index(idx_name, idx_fields)?;
        }
        Ok(snapshot)
    }

    /// Returns the application name.
    #[must_use]
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Returns the model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the physical table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the primary key field name.
    #[must_use]
    pub fn pk(&self) -> &str {
        &self.pk
    }

    /// Returns the fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Returns the indexes.
    #[must_use]
    pub fn indexes(&self) -> &Indexes {
        &self.indexes
    }

    /// Resolves a field name to its physical column.
    pub fn column(&self, field: &str) -> Result<&str> {
        self.fields
            .get_key_value(field)
            .map(|(name, f)| f.db_column(name))
            .ok_or_else(|| OrmError::FieldResolution {
                model: self.name.clone(),
                field: field.to_string(),
            })
    }

    /// Returns the physical column names in declaration order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|(name, f)| f.db_column(name))
            .collect()
    }

    /// Returns whether the table is the app's default name.
    #[must_use]
    pub fn has_default_table(&self) -> bool {
        self.table == default_table_name(&self.app, &self.name)
    }

    /// Returns a copy stored under another table, without indexes.
    ///
    /// Used for shadow tables during table rebuilds.
    #[must_use]
    pub fn with_table(&self, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            indexes: Indexes::new(),
            ..self.clone()
        }
    }

    /// Adds a field.
    pub fn add_field(&mut self, name: impl Into<String>, field: Field) -> Result<()> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return Err(OrmError::invalid_model(
                &self.name,
                format!("duplicate field: {name}"),
            ));
        }
        if field.is_pk() {
            return Err(OrmError::invalid_model(
                &self.name,
                format!("duplicate pk: {name}"),
            ));
        }
        self.fields.insert(name, field);
        Ok(())
    }

    /// Removes a field. The primary key and indexed fields can't be removed.
    pub fn remove_field(&mut self, name: &str) -> Result<Field> {
        if self.pk == name {
            return Err(OrmError::invalid_model(
                &self.name,
                "pk field cannot be removed",
            ));
        }
        if self.indexes.values().any(|fields| fields.iter().any(|f| f == name)) {
            return Err(OrmError::invalid_model(
                &self.name,
                format!("cannot remove indexed field: {name}"),
            ));
        }
        self.fields
            .shift_remove(name)
            .ok_or_else(|| OrmError::FieldResolution {
                model: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// Adds a named index.
    pub fn add_index(&mut self, name: impl Into<String>, fields: Vec<String>) -> Result<()> {
        let name = name.into();
        if self.indexes.contains_key(&name) {
            return Err(OrmError::invalid_model(
                &self.name,
                format!("duplicate index: {name}"),
            ));
        }
        if fields.is_empty() {
            return Err(OrmError::invalid_model(
                &self.name,
                format!("index with no fields: {name}"),
            ));
        }
        if let Some(unknown) = fields.iter().find(|f| !self.fields.contains_key(*f)) {
            return Err(OrmError::FieldResolution {
                model: self.name.clone(),
                field: unknown.clone(),
            });
        }
        self.indexes.insert(name, fields);
        Ok(())
    }

    /// Removes a named index, returning its fields.
    pub fn remove_index(&mut self, name: &str) -> Result<Vec<String>> {
        self.indexes.remove(name).ok_or_else(|| {
            OrmError::invalid_model(&self.name, format!("index not found: {name}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> ModelSnapshot {
        ModelDeclaration::new("User")
            .field("email", Field::char(100))
            .field("active", Field::boolean().default(false))
            .index("user_email_idx", ["email"])
            .build("main")
            .unwrap()
    }

    #[test]
    fn test_declaration_adds_pk() {
        let model = user();
        assert_eq!(model.pk(), "id");
        assert_eq!(model.columns(), vec!["id", "email", "active"]);
        assert_eq!(model.table(), "main_user");
        assert!(model.has_default_table());
    }

    #[test]
    fn test_declaration_auto_index() {
        let model = ModelDeclaration::new("Post")
            .field("slug", Field::char(50).index())
            .build("Blog")
            .unwrap();
        assert_eq!(
            model.indexes().get("blog_post_slug_auto_idx"),
            Some(&vec!["slug".to_string()])
        );
    }

    #[test]
    fn test_duplicate_pk_rejected() {
        let result = ModelDeclaration::new("User")
            .field("uid", Field::integer().primary_key())
            .field("code", Field::char(10).primary_key())
            .build("main");
        assert!(matches!(result, Err(OrmError::InvalidModel { .. })));
    }

    #[test]
    fn test_unknown_indexed_field_rejected() {
        let result = ModelDeclaration::new("User")
            .field("email", Field::char(100))
            .index("bad_idx", ["missing"])
            .build("main");
        assert!(matches!(result, Err(OrmError::FieldResolution { .. })));
    }

    #[test]
    fn test_from_parts_requires_pk() {
        let mut fields = FieldMap::new();
        fields.insert("email".to_string(), Field::char(100));
        let result = ModelSnapshot::from_parts("main", "User", "main_user", fields, Indexes::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_column_resolution() {
        let model = ModelDeclaration::new("User")
            .field("email", Field::char(100).column("mail"))
            .build("main")
            .unwrap();
        assert_eq!(model.column("email").unwrap(), "mail");
        assert!(matches!(
            model.column("missing"),
            Err(OrmError::FieldResolution { .. })
        ));
    }

    #[test]
    fn test_remove_indexed_field_rejected() {
        let mut model = user();
        assert!(model.remove_field("email").is_err());
        model.remove_index("user_email_idx").unwrap();
        model.remove_field("email").unwrap();
        assert!(model.field("email").is_none());
    }

    #[test]
    fn test_remove_pk_rejected() {
        let mut model = user();
        assert!(model.remove_field("id").is_err());
    }

    #[test]
    fn test_with_table_drops_indexes() {
        let shadow = user().with_table("main_user__new");
        assert_eq!(shadow.table(), "main_user__new");
        assert!(shadow.indexes().is_empty());
        assert_eq!(shadow.fields().len(), 3);
    }
}
