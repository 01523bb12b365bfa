//! Bounded character columns.

use serde::{Deserialize, Serialize};

use super::{FieldOptions, FieldType, SqlType};

/// `VARCHAR(max_length)`; SQLite stores it as TEXT and ignores the bound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharField {
    /// Maximum length in characters.
    pub max_length: usize,
    /// Shared column options.
    #[serde(flatten)]
    pub options: FieldOptions,
}

impl CharField {
    /// Creates a character field bounded to `max_length`.
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            ..Self::default()
        }
    }
}

impl FieldType for CharField {
    fn sql_type(&self) -> SqlType {
        SqlType::Varchar(self.max_length)
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions {
        &mut self.options
    }
}
