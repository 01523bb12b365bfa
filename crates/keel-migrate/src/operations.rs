//! Migration operations.
//!
//! This module defines the reversible schema changes a migration is made of.
//! Every operation can:
//!
//! - move an [`AppState`] forward ([`Operation::set_state`]),
//! - run its forward DDL against an [`Engine`] ([`Operation::run`]),
//! - undo that DDL ([`Operation::backwards`]).
//!
//! `run` and `backwards` receive the state right after the operation
//! (`state`) and right before it (`prev`); `set_state` must have produced
//! `state` first. Forward and backward work are structural inverses:
//! `AddFields::backwards` does what `RemoveFields::run` does for the same
//! fields, and vice versa.

use keel_orm::{default_table_name, Engine, FieldMap, ModelSnapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::state::AppState;

/// Creates a model and its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateModel {
    /// Model name.
    pub name: String,
    /// Table name, when not the default `{app}_{model}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// All fields, primary key included.
    pub fields: FieldMap,
}

/// Deletes a model and drops its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteModel {
    /// Model name.
    pub name: String,
}

/// Adds fields to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddFields {
    /// Model name.
    pub model: String,
    /// The new fields, in declaration order.
    pub fields: FieldMap,
}

/// Removes fields from a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveFields {
    /// Model name.
    pub model: String,
    /// Names of the removed fields.
    pub fields: Vec<String>,
}

/// Adds a named index to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddIndex {
    /// Model name.
    pub model: String,
    /// Index name.
    pub name: String,
    /// Indexed fields.
    pub fields: Vec<String>,
}

/// Removes a named index from a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveIndex {
    /// Model name.
    pub model: String,
    /// Index name.
    pub name: String,
}

/// A single migration operation.
///
/// Serializes as `{"AddFields": {"model": "User", "fields": {...}}}`.
/// Deserialization goes through an
/// [`OperationRegistry`](crate::registry::OperationRegistry).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operation {
    /// Create a model.
    CreateModel(CreateModel),
    /// Delete a model.
    DeleteModel(DeleteModel),
    /// Add fields to a model.
    AddFields(AddFields),
    /// Remove fields from a model.
    RemoveFields(RemoveFields),
    /// Add an index.
    AddIndex(AddIndex),
    /// Remove an index.
    RemoveIndex(RemoveIndex),
}

impl Operation {
    /// Returns the operation type name used in migration files.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateModel(_) => "CreateModel",
            Self::DeleteModel(_) => "DeleteModel",
            Self::AddFields(_) => "AddFields",
            Self::RemoveFields(_) => "RemoveFields",
            Self::AddIndex(_) => "AddIndex",
            Self::RemoveIndex(_) => "RemoveIndex",
        }
    }

    /// Returns the name of the model the operation targets.
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::CreateModel(op) => &op.name,
            Self::DeleteModel(op) => &op.name,
            Self::AddFields(op) => &op.model,
            Self::RemoveFields(op) => &op.model,
            Self::AddIndex(op) => &op.model,
            Self::RemoveIndex(op) => &op.model,
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateModel(op) => format!("Create model {}", op.name),
            Self::DeleteModel(op) => format!("Delete model {}", op.name),
            Self::AddFields(op) => format!(
                "Add fields {} to {}",
                op.fields.keys().cloned().collect::<Vec<_>>().join(", "),
                op.model
            ),
            Self::RemoveFields(op) => {
                format!("Remove fields {} from {}", op.fields.join(", "), op.model)
            }
            Self::AddIndex(op) => format!("Add index {} to {}", op.name, op.model),
            Self::RemoveIndex(op) => format!("Remove index {} from {}", op.name, op.model),
        }
    }

    /// Moves `state` forward by this operation.
    pub fn set_state(&self, state: &mut AppState) -> Result<()> {
        match self {
            Self::CreateModel(op) => {
                if state.model(&op.name).is_some() {
                    return Err(MigrateError::state(
                        state.app(),
                        format!("duplicate model: {}", op.name),
                    ));
                }
                let table = op
                    .table
                    .clone()
                    .unwrap_or_else(|| default_table_name(state.app(), &op.name));
                let model = ModelSnapshot::from_parts(
                    state.app(),
                    &op.name,
                    table,
                    op.fields.clone(),
                    keel_orm::Indexes::new(),
                )?;
                state.insert_model(model)
            }
            Self::DeleteModel(op) => state.remove_model(&op.name).map(|_| ()),
            Self::AddFields(op) => {
                let app = state.app().to_string();
                let model = state.require_model_mut(&op.model)?;
                for (name, field) in &op.fields {
                    if model.field(name).is_some() {
                        return Err(MigrateError::state(
                            app,
                            format!("{}: duplicate field: {name}", op.model),
                        ));
                    }
                    model.add_field(name.clone(), field.clone())?;
                }
                Ok(())
            }
            Self::RemoveFields(op) => {
                let app = state.app().to_string();
                let model = state.require_model_mut(&op.model)?;
                for name in &op.fields {
                    if model.field(name).is_none() {
                        return Err(MigrateError::state(
                            app,
                            format!("{}: field not found: {name}", op.model),
                        ));
                    }
                    model.remove_field(name)?;
                }
                Ok(())
            }
            Self::AddIndex(op) => {
                let app = state.app().to_string();
                let model = state.require_model_mut(&op.model)?;
                if model.indexes().contains_key(&op.name) {
                    return Err(MigrateError::state(
                        app,
                        format!("{}: duplicate index: {}", op.model, op.name),
                    ));
                }
                model.add_index(op.name.clone(), op.fields.clone())?;
                Ok(())
            }
            Self::RemoveIndex(op) => {
                let app = state.app().to_string();
                let model = state.require_model_mut(&op.model)?;
                if !model.indexes().contains_key(&op.name) {
                    return Err(MigrateError::state(
                        app,
                        format!("{}: index not found: {}", op.model, op.name),
                    ));
                }
                model.remove_index(&op.name)?;
                Ok(())
            }
        }
    }

    /// Runs the forward DDL.
    pub async fn run<E: Engine>(
        &self,
        engine: &mut E,
        state: &AppState,
        prev: &AppState,
    ) -> Result<()> {
        debug!(operation = %self.description(), "run");
        match self {
            Self::CreateModel(op) => engine.create_table(state.require_model(&op.name)?).await?,
            Self::DeleteModel(op) => engine.drop_table(prev.require_model(&op.name)?).await?,
            Self::AddFields(op) => {
                let fields = op.fields.keys().cloned().collect::<Vec<_>>();
                engine
                    .add_columns(state.require_model(&op.model)?, &fields)
                    .await?;
            }
            Self::RemoveFields(op) => {
                engine
                    .drop_columns(
                        prev.require_model(&op.model)?,
                        state.require_model(&op.model)?,
                        &op.fields,
                    )
                    .await?;
            }
            Self::AddIndex(op) => {
                engine
                    .add_index(state.require_model(&op.model)?, &op.name)
                    .await?;
            }
            Self::RemoveIndex(op) => engine.drop_index(&op.name).await?,
        }
        Ok(())
    }

    /// Undoes [`Operation::run`].
    pub async fn backwards<E: Engine>(
        &self,
        engine: &mut E,
        state: &AppState,
        prev: &AppState,
    ) -> Result<()> {
        debug!(operation = %self.description(), "backwards");
        match self {
            Self::CreateModel(op) => engine.drop_table(state.require_model(&op.name)?).await?,
            Self::DeleteModel(op) => {
                let model = prev.require_model(&op.name)?;
                engine.create_table(model).await?;
                for index in model.indexes().keys() {
                    engine.add_index(model, index).await?;
                }
            }
            Self::AddFields(op) => {
                let fields = op.fields.keys().cloned().collect::<Vec<_>>();
                engine
                    .drop_columns(
                        state.require_model(&op.model)?,
                        prev.require_model(&op.model)?,
                        &fields,
                    )
                    .await?;
            }
            Self::RemoveFields(op) => {
                engine
                    .add_columns(prev.require_model(&op.model)?, &op.fields)
                    .await?;
            }
            Self::AddIndex(op) => engine.drop_index(&op.name).await?,
            Self::RemoveIndex(op) => {
                engine
                    .add_index(prev.require_model(&op.model)?, &op.name)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_orm::{Field, RecordingEngine};

    fn user_state() -> AppState {
        let mut fields = FieldMap::new();
        fields.insert("id".to_string(), Field::auto());
        fields.insert("email".to_string(), Field::char(100));
        let mut state = AppState::new("main");
        Operation::CreateModel(CreateModel {
            name: "User".to_string(),
            table: None,
            fields,
        })
        .set_state(&mut state)
        .unwrap();
        state
    }

    #[test]
    fn test_serialized_shape() {
        let op = Operation::RemoveIndex(RemoveIndex {
            model: "User".to_string(),
            name: "user_email_idx".to_string(),
        });
        assert_eq!(
            serde_json::to_string(&op).unwrap(),
            r#"{"RemoveIndex":{"model":"User","name":"user_email_idx"}}"#
        );
    }

    #[test]
    fn test_create_existing_model() {
        let mut state = user_state();
        let op = Operation::CreateModel(CreateModel {
            name: "User".to_string(),
            table: None,
            fields: FieldMap::new(),
        });
        assert!(matches!(
            op.set_state(&mut state),
            Err(MigrateError::StateConsistency { .. })
        ));
    }

    #[test]
    fn test_create_model_without_pk() {
        let mut fields = FieldMap::new();
        fields.insert("email".to_string(), Field::char(100));
        let op = Operation::CreateModel(CreateModel {
            name: "Tag".to_string(),
            table: None,
            fields,
        });
        assert!(matches!(
            op.set_state(&mut AppState::new("main")),
            Err(MigrateError::Orm(_))
        ));
    }

    #[test]
    fn test_remove_missing_field() {
        let mut state = user_state();
        let op = Operation::RemoveFields(RemoveFields {
            model: "User".to_string(),
            fields: vec!["nope".to_string()],
        });
        assert!(matches!(
            op.set_state(&mut state),
            Err(MigrateError::StateConsistency { .. })
        ));
    }

    #[test]
    fn test_add_index_on_unknown_field() {
        let mut state = user_state();
        let op = Operation::AddIndex(AddIndex {
            model: "User".to_string(),
            name: "bad_idx".to_string(),
            fields: vec!["nope".to_string()],
        });
        assert!(matches!(
            op.set_state(&mut state),
            Err(MigrateError::Orm(keel_orm::OrmError::FieldResolution { .. }))
        ));
    }

    #[test]
    fn test_custom_table_name() {
        let mut state = AppState::new("main");
        let mut fields = FieldMap::new();
        fields.insert("id".to_string(), Field::auto());
        Operation::CreateModel(CreateModel {
            name: "User".to_string(),
            table: Some("accounts".to_string()),
            fields,
        })
        .set_state(&mut state)
        .unwrap();
        assert_eq!(state.require_model("User").unwrap().table(), "accounts");
    }

    #[tokio::test]
    async fn test_add_index_run_and_backwards() {
        let prev = user_state();
        let mut state = prev.clone();
        let op = Operation::AddIndex(AddIndex {
            model: "User".to_string(),
            name: "user_email_idx".to_string(),
            fields: vec!["email".to_string()],
        });
        op.set_state(&mut state).unwrap();

        let mut engine = RecordingEngine::default();
        op.run(&mut engine, &state, &prev).await.unwrap();
        op.backwards(&mut engine, &state, &prev).await.unwrap();
        assert_eq!(
            engine.sql(),
            vec![
                "CREATE INDEX \"user_email_idx\" ON \"main_user\" (\"email\")",
                "DROP INDEX \"user_email_idx\"",
            ]
        );
    }
}
