//! Autodetector for generating migrations from model declarations.
//!
//! This module compares declared models with the [`AppState`] replayed from
//! the recorded migrations and produces the operations that move the state
//! to the declarations. Only added and removed models, fields and indexes
//! are detected; a field whose definition changed in place is reported by
//! [`Autodetector::altered_fields`] but never migrated.

use keel_orm::{Field, ModelDeclaration, ModelSnapshot};

use crate::error::Result;
use crate::loader::MigrationLoader;
use crate::migration::Migration;
use crate::operations::{
    AddFields, AddIndex, CreateModel, DeleteModel, Operation, RemoveFields, RemoveIndex,
};
use crate::state::AppState;

/// A field whose declaration differs from its recorded definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AlteredField {
    /// Model name.
    pub model: String,
    /// Field name.
    pub field: String,
    /// The recorded definition.
    pub from: Field,
    /// The declared definition.
    pub to: Field,
}

/// Returns the operations that bring `declared` from its shape in `prior`
/// to its declared shape.
#[must_use]
pub fn diff(declared: &ModelSnapshot, prior: &AppState) -> Vec<Operation> {
    Autodetector::new(prior).diff_model(declared)
}

/// Detects changes between declared models and a recorded state.
#[derive(Debug, Clone, Copy)]
pub struct Autodetector<'s> {
    state: &'s AppState,
}

impl<'s> Autodetector<'s> {
    /// Creates an autodetector comparing against `state`.
    #[must_use]
    pub const fn new(state: &'s AppState) -> Self {
        Self { state }
    }

    /// Diffs one model.
    ///
    /// A new model becomes `CreateModel` plus one `AddIndex` per index. An
    /// existing one gets `RemoveIndex`, `RemoveFields`, `AddFields` and
    /// `AddIndex` in that order, so removed fields are no longer indexed and
    /// new indexes can cover new fields.
    #[must_use]
    pub fn diff_model(&self, declared: &ModelSnapshot) -> Vec<Operation> {
        let Some(prior) = self.state.model(declared.name()) else {
            return Self::create(declared);
        };
        let model = declared.name().to_string();
        let mut operations = Vec::new();

        for (name, fields) in prior.indexes() {
            if declared.indexes().get(name) != Some(fields) {
                operations.push(Operation::RemoveIndex(RemoveIndex {
                    model: model.clone(),
                    name: name.clone(),
                }));
            }
        }

        let removed: Vec<String> = prior
            .fields()
            .keys()
            .filter(|name| declared.field(name).is_none())
            .cloned()
            .collect();
        if !removed.is_empty() {
            operations.push(Operation::RemoveFields(RemoveFields {
                model: model.clone(),
                fields: removed,
            }));
        }

        let added: keel_orm::FieldMap = declared
            .fields()
            .iter()
            .filter(|(name, _)| prior.field(name).is_none())
            .map(|(name, field)| (name.clone(), field.clone()))
            .collect();
        if !added.is_empty() {
            operations.push(Operation::AddFields(AddFields {
                model: model.clone(),
                fields: added,
            }));
        }

        for (name, fields) in declared.indexes() {
            if prior.indexes().get(name) != Some(fields) {
                operations.push(Operation::AddIndex(AddIndex {
                    model: model.clone(),
                    name: name.clone(),
                    fields: fields.clone(),
                }));
            }
        }
        operations
    }

    fn create(declared: &ModelSnapshot) -> Vec<Operation> {
        let mut operations = vec![Operation::CreateModel(CreateModel {
            name: declared.name().to_string(),
            table: (!declared.has_default_table()).then(|| declared.table().to_string()),
            fields: declared.fields().clone(),
        })];
        operations.extend(declared.indexes().iter().map(|(name, fields)| {
            Operation::AddIndex(AddIndex {
                model: declared.name().to_string(),
                name: name.clone(),
                fields: fields.clone(),
            })
        }));
        operations
    }

    /// Diffs every declared model, in declaration order, then deletes the
    /// recorded models no longer declared.
    #[must_use]
    pub fn diff(&self, declared: &[ModelSnapshot]) -> Vec<Operation> {
        let mut operations: Vec<Operation> = declared
            .iter()
            .flat_map(|model| self.diff_model(model))
            .collect();
        for name in self.state.models().keys() {
            if !declared.iter().any(|m| m.name() == name) {
                operations.push(Operation::DeleteModel(DeleteModel { name: name.clone() }));
            }
        }
        operations
    }

    /// Returns the fields present on both sides whose definition changed.
    #[must_use]
    pub fn altered_fields(&self, declared: &[ModelSnapshot]) -> Vec<AlteredField> {
        let mut altered = Vec::new();
        for model in declared {
            let Some(prior) = self.state.model(model.name()) else {
                continue;
            };
            for (name, field) in model.fields() {
                if let Some(recorded) = prior.field(name) {
                    if recorded != field {
                        altered.push(AlteredField {
                            model: model.name().to_string(),
                            field: name.clone(),
                            from: recorded.clone(),
                            to: field.clone(),
                        });
                    }
                }
            }
        }
        altered
    }
}

/// Builds the next migration of `app` from its declared models.
///
/// The recorded migrations come from `loader`. The first migration is named
/// `0001_initial`, later ones `NNNN_auto` unless a `label` is given, and each
/// depends on the previous migration of the app. Returns `None` when
/// nothing changed.
pub fn make_migration(
    app: &str,
    declarations: &[ModelDeclaration],
    loader: &MigrationLoader,
    label: Option<&str>,
) -> Result<Option<Migration>> {
    let existing = loader.load_app(app)?;
    let state = AppState::replay(app, &existing)?;
    let declared = declarations
        .iter()
        .map(|d| d.clone().build(app))
        .collect::<keel_orm::Result<Vec<_>>>()?;

    let operations = Autodetector::new(&state).diff(&declared);
    if operations.is_empty() {
        return Ok(None);
    }

    let label = label.unwrap_or(if existing.is_empty() { "initial" } else { "auto" });
    let number = loader.next_number(app)?;
    let mut migration = Migration::new(app, format!("{number}_{label}"))?;
    if let Some(previous) = existing.last() {
        migration = migration.depends_on(app, &previous.name);
    }
    migration.operations = operations;
    Ok(Some(migration))
}
