//! Timestamp columns with automatic fill.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{FieldOptions, FieldType, SqlType};
use crate::value::Value;

/// Date and time without timezone.
///
/// `auto_now_add` and `auto_now` are recorded in migration files so a
/// replayed snapshot compares equal to the declaration; the ORM layer above
/// is what stamps rows on insert and save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateTimeField {
    /// Stamp rows with the current time when they are created.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_now_add: bool,
    /// Stamp rows with the current time on every save.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_now: bool,
    /// Shared column options.
    #[serde(flatten)]
    pub options: FieldOptions,
}

impl DateTimeField {
    /// Creates a date-time field with no automatic stamping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `auto_now_add`.
    #[must_use]
    pub fn auto_now_add(self) -> Self {
        Self {
            auto_now_add: true,
            ..self
        }
    }

    /// Sets `auto_now`.
    #[must_use]
    pub fn auto_now(self) -> Self {
        Self {
            auto_now: true,
            ..self
        }
    }

    fn is_stamped(&self) -> bool {
        self.auto_now || self.auto_now_add
    }
}

impl FieldType for DateTimeField {
    fn sql_type(&self) -> SqlType {
        SqlType::DateTime
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions {
        &mut self.options
    }

    // Existing rows get the moment the column was added.
    fn fill_value(&self) -> Option<Value> {
        if self.is_stamped() {
            Some(Value::DateTime(Utc::now().naive_utc()))
        } else {
            self.options.default.clone()
        }
    }
}
