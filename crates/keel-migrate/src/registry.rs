//! Operation registry used to decode migration files.
//!
//! The registry is an explicit value handed to the loader: it maps the
//! operation type names found in migration files to decoders. The default
//! registry knows the six built-in operations.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::error::{MigrateError, Result};
use crate::operations::{
    AddFields, AddIndex, CreateModel, DeleteModel, Operation, RemoveFields, RemoveIndex,
};

/// Decodes the payload of one operation.
pub type DecodeFn = fn(Json) -> Result<Operation>;

/// Maps operation type names to decoders.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    decoders: BTreeMap<String, DecodeFn>,
}

fn decode<T, F>(payload: Json, wrap: F) -> Result<Operation>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Operation,
{
    Ok(wrap(serde_json::from_value(payload)?))
}

impl Default for OperationRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("CreateModel", |p| decode(p, Operation::CreateModel));
        registry.register("DeleteModel", |p| decode(p, Operation::DeleteModel));
        registry.register("AddFields", |p| decode(p, Operation::AddFields));
        registry.register("RemoveFields", |p| decode(p, Operation::RemoveFields));
        registry.register("AddIndex", |p| decode(p, Operation::AddIndex));
        registry.register("RemoveIndex", |p| decode(p, Operation::RemoveIndex));
        registry
    }
}

impl OperationRegistry {
    /// Creates a registry that knows no operations.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// Registers a decoder, replacing any previous one for `name`.
    pub fn register(&mut self, name: impl Into<String>, decode: DecodeFn) {
        self.decoders.insert(name.into(), decode);
    }

    /// Returns whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    /// Decodes one `{"Name": payload}` object.
    pub fn decode(&self, raw: Json) -> Result<Operation> {
        let map = match raw {
            Json::Object(map) => map,
            other => return Err(MigrateError::InvalidOperation(other.to_string())),
        };
        if map.len() != 1 {
            return Err(MigrateError::InvalidOperation(
                map.keys().cloned().collect::<Vec<_>>().join(", "),
            ));
        }
        let Some((name, payload)) = map.into_iter().next() else {
            return Err(MigrateError::InvalidOperation(String::new()));
        };
        let decode = self
            .decoders
            .get(&name)
            .ok_or_else(|| MigrateError::InvalidOperation(name.clone()))?;
        decode(payload)
    }

    /// Decodes a list of operations.
    pub fn decode_list(&self, raw: Json) -> Result<Vec<Operation>> {
        let items = match raw {
            Json::Array(items) => items,
            other => return Err(MigrateError::InvalidOperation(other.to_string())),
        };
        items.into_iter().map(|item| self.decode(item)).collect()
    }
}
