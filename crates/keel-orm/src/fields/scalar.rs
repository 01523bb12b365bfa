//! Field kinds that carry nothing beyond the shared options.

use serde::{Deserialize, Serialize};

use super::{FieldOptions, FieldType, SqlType};

macro_rules! scalar_field {
    ($(#[$doc:meta])* $name:ident => $sql_type:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            /// Shared column options.
            #[serde(flatten)]
            pub options: FieldOptions,
        }

        impl $name {
            /// Creates the field with default options.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }
        }

        impl FieldType for $name {
            fn sql_type(&self) -> SqlType {
                $sql_type
            }

            fn options(&self) -> &FieldOptions {
                &self.options
            }

            fn options_mut(&mut self) -> &mut FieldOptions {
                &mut self.options
            }
        }
    };
}

scalar_field!(
    /// 64-bit integer column.
    IntegerField => SqlType::Integer
);
scalar_field!(
    /// Boolean column; stored as 0/1 on SQLite.
    BooleanField => SqlType::Boolean
);
scalar_field!(
    /// Unbounded text column.
    TextField => SqlType::Text
);
scalar_field!(
    /// Double precision column.
    FloatField => SqlType::Double
);
scalar_field!(
    /// Calendar date column.
    DateField => SqlType::Date
);
scalar_field!(
    /// Time of day column.
    TimeField => SqlType::Time
);

/// Integer primary key filled in by the database.
///
/// Declarations without a primary key get one of these named `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoField {
    /// Shared column options; `primary_key` is always set.
    #[serde(flatten)]
    pub options: FieldOptions,
}

impl AutoField {
    /// Creates an auto primary key.
    #[must_use]
    pub fn new() -> Self {
        let options = FieldOptions {
            primary_key: true,
            ..FieldOptions::default()
        };
        Self { options }
    }
}

impl Default for AutoField {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldType for AutoField {
    fn sql_type(&self) -> SqlType {
        SqlType::Integer
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions {
        &mut self.options
    }

    fn is_auto(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_kinds_map_to_sql_types() {
        assert_eq!(IntegerField::new().sql_type(), SqlType::Integer);
        assert_eq!(BooleanField::new().sql_type(), SqlType::Boolean);
        assert_eq!(FloatField::new().sql_type(), SqlType::Double);
        assert_eq!(TimeField::new().sql_type(), SqlType::Time);
    }

    #[test]
    fn test_auto_field_defaults_to_pk() {
        let field = AutoField::default();
        assert!(field.options().primary_key);
        assert!(field.is_auto());
        assert!(!IntegerField::new().is_auto());
    }
}
