//! Field descriptors for model declarations.
//!
//! A [`Field`] describes one column: its kind, nullability, default and
//! indexing intent. Fields serialize as `{"CharField": {"max_length": 100}}`
//! so they can be stored inside migration files.

mod char;
mod scalar;
mod temporal;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value::Value;

pub use char::CharField;
pub use scalar::{
    AutoField, BooleanField, DateField, FloatField, IntegerField, TextField, TimeField,
};
pub use temporal::DateTimeField;

/// Ordered map of field name to descriptor, in declaration order.
pub type FieldMap = IndexMap<String, Field>;

/// SQL data types a field can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// Integer (64-bit on every supported backend).
    Integer,
    /// Variable-length character string.
    Varchar(usize),
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Floating point (double precision).
    Double,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Date and time.
    DateTime,
}

/// Options shared by every field kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOptions {
    /// Whether the column accepts NULL.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub null: bool,
    /// Whether this is the primary key.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
    /// Whether the column carries a UNIQUE constraint.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    /// Whether to create a database index for the column.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub index: bool,
    /// Physical column name, when it differs from the field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Default value, used in DDL and to fill existing rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Behaviour each concrete field kind provides.
pub trait FieldType {
    /// Returns the SQL type of the column.
    fn sql_type(&self) -> SqlType;

    /// Returns the field options.
    fn options(&self) -> &FieldOptions;

    /// Returns the field options for modification.
    fn options_mut(&mut self) -> &mut FieldOptions;

    /// Whether the database generates values for this column.
    fn is_auto(&self) -> bool {
        false
    }

    /// Value used to fill existing rows when the column is added.
    fn fill_value(&self) -> Option<Value> {
        self.options().default.clone()
    }
}

/// A column descriptor, tagged by kind.
///
/// Defaults are decoded by the column type: a `DateField` default written
/// as `"2024-01-01"` reads back as [`Value::Date`], not as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub enum Field {
    /// Integer column.
    IntegerField(IntegerField),
    /// Auto-incrementing integer primary key.
    AutoField(AutoField),
    /// Boolean column.
    BooleanField(BooleanField),
    /// Bounded character column.
    CharField(CharField),
    /// Unbounded text column.
    TextField(TextField),
    /// Floating point column.
    FloatField(FloatField),
    /// Date column.
    DateField(DateField),
    /// Time column.
    TimeField(TimeField),
    /// Date and time column.
    DateTimeField(DateTimeField),
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Self::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut field = Self::deserialize(deserializer)?;
        let sql_type = field.sql_type();
        let options = field.kind_mut().options_mut();
        if let Some(default) = options.default.take() {
            options.default = Some(default.coerce(sql_type));
        }
        Ok(field)
    }
}

impl Field {
    /// Creates an integer field.
    #[must_use]
    pub fn integer() -> Self {
        Self::IntegerField(IntegerField::new())
    }

    /// Creates an auto-incrementing primary key field.
    #[must_use]
    pub fn auto() -> Self {
        Self::AutoField(AutoField::new())
    }

    /// Creates a boolean field.
    #[must_use]
    pub fn boolean() -> Self {
        Self::BooleanField(BooleanField::new())
    }

    /// Creates a character field with the given max length.
    #[must_use]
    pub fn char(max_length: usize) -> Self {
        Self::CharField(CharField::new(max_length))
    }

    /// Creates a text field.
    #[must_use]
    pub fn text() -> Self {
        Self::TextField(TextField::new())
    }

    /// Creates a float field.
    #[must_use]
    pub fn float() -> Self {
        Self::FloatField(FloatField::new())
    }

    /// Creates a date field.
    #[must_use]
    pub fn date() -> Self {
        Self::DateField(DateField::new())
    }

    /// Creates a time field.
    #[must_use]
    pub fn time() -> Self {
        Self::TimeField(TimeField::new())
    }

    /// Creates a date-time field.
    #[must_use]
    pub fn datetime() -> Self {
        Self::DateTimeField(DateTimeField::new())
    }

    fn kind(&self) -> &dyn FieldType {
        match self {
            Self::IntegerField(f) => f,
            Self::AutoField(f) => f,
            Self::BooleanField(f) => f,
            Self::CharField(f) => f,
            Self::TextField(f) => f,
            Self::FloatField(f) => f,
            Self::DateField(f) => f,
            Self::TimeField(f) => f,
            Self::DateTimeField(f) => f,
        }
    }

    fn kind_mut(&mut self) -> &mut dyn FieldType {
        match self {
            Self::IntegerField(f) => f,
            Self::AutoField(f) => f,
            Self::BooleanField(f) => f,
            Self::CharField(f) => f,
            Self::TextField(f) => f,
            Self::FloatField(f) => f,
            Self::DateField(f) => f,
            Self::TimeField(f) => f,
            Self::DateTimeField(f) => f,
        }
    }

    /// Returns the serialized kind name (e.g. `"CharField"`).
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::IntegerField(_) => "IntegerField",
            Self::AutoField(_) => "AutoField",
            Self::BooleanField(_) => "BooleanField",
            Self::CharField(_) => "CharField",
            Self::TextField(_) => "TextField",
            Self::FloatField(_) => "FloatField",
            Self::DateField(_) => "DateField",
            Self::TimeField(_) => "TimeField",
            Self::DateTimeField(_) => "DateTimeField",
        }
    }

    /// Marks the column nullable.
    #[must_use]
    pub fn null(mut self) -> Self {
        self.kind_mut().options_mut().null = true;
        self
    }

    /// Marks the field as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.kind_mut().options_mut().primary_key = true;
        self
    }

    /// Adds a UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.kind_mut().options_mut().unique = true;
        self
    }

    /// Requests a database index on the column.
    #[must_use]
    pub fn index(mut self) -> Self {
        self.kind_mut().options_mut().index = true;
        self
    }

    /// Overrides the physical column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.kind_mut().options_mut().column = Some(column.into());
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.kind_mut().options_mut().default = Some(value.into());
        self
    }

    /// Returns the field options.
    #[must_use]
    pub fn options(&self) -> &FieldOptions {
        self.kind().options()
    }

    pub(crate) fn options_mut(&mut self) -> &mut FieldOptions {
        self.kind_mut().options_mut()
    }

    /// Returns the SQL type of the column.
    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        self.kind().sql_type()
    }

    /// Whether this is the primary key.
    #[must_use]
    pub fn is_pk(&self) -> bool {
        self.options().primary_key || self.is_auto()
    }

    /// Whether the column accepts NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.options().null
    }

    /// Whether the column is unique.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.options().unique
    }

    /// Whether the database generates values for this column.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.kind().is_auto()
    }

    /// Whether an index should be created for the column.
    ///
    /// Primary keys and unique columns are already indexed by the database.
    #[must_use]
    pub fn has_index(&self) -> bool {
        let options = self.options();
        options.index && !(self.is_pk() || options.unique)
    }

    /// Returns the physical column name for a field declared as `name`.
    #[must_use]
    pub fn db_column<'a>(&'a self, name: &'a str) -> &'a str {
        self.options().column.as_deref().unwrap_or(name)
    }

    /// Returns the declared default value.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.options().default.as_ref()
    }

    /// Value used to fill existing rows when the column is added.
    #[must_use]
    pub fn fill_value(&self) -> Option<Value> {
        self.kind().fill_value()
    }
}
