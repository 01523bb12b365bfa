//! Values bound to statements and the container capability used to read them.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::fields::SqlType;

/// A value that can be bound as a statement argument or used as a column default.
///
/// Serialized untagged, so defaults in migration files read as plain JSON scalars.
/// Temporal values serialize as ISO strings; [`Value::coerce`] turns them back
/// into dates and times once the column type is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Date and time without timezone.
    DateTime(NaiveDateTime),
}

impl Value {
    /// Returns the SQL representation for inline use (escaped).
    ///
    /// Only used for column defaults in DDL; row data is always bound.
    #[must_use]
    pub fn to_sql_inline(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => {
                if *b {
                    String::from("TRUE")
                } else {
                    String::from("FALSE")
                }
            }
            Self::Int(n) => format!("{n}"),
            Self::Float(f) => format!("{f}"),
            Self::Text(s) => quote_text(s),
            Self::Date(d) => quote_text(&d.format("%Y-%m-%d").to_string()),
            Self::Time(t) => quote_text(&t.format("%H:%M:%S%.f").to_string()),
            Self::DateTime(dt) => quote_text(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }

    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Reads an ISO text value as the temporal type of its column.
    ///
    /// Anything that doesn't parse, or isn't text, is returned unchanged.
    #[must_use]
    pub fn coerce(self, sql_type: SqlType) -> Self {
        let Self::Text(text) = &self else {
            return self;
        };
        let parsed = match sql_type {
            SqlType::Date => text.parse().ok().map(Self::Date),
            SqlType::Time => text.parse().ok().map(Self::Time),
            SqlType::DateTime => text
                .parse()
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .map(Self::DateTime),
            _ => None,
        };
        parsed.unwrap_or(self)
    }
}

fn quote_text(s: &str) -> String {
    // Escape single quotes by doubling them
    let escaped = s.replace('\'', "''");
    format!("'{escaped}'")
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Read access to named values of an application-chosen container.
///
/// Implement this once for each concrete container type an application
/// stores rows in; the engines only ever read through it.
pub trait Getter {
    /// Returns the value stored under `name`, if the container has one.
    fn get_field(&self, name: &str) -> Option<Value>;
}

/// The default row container: field name to value.
pub type Values = BTreeMap<String, Value>;

impl Getter for Values {
    fn get_field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Getter for HashMap<String, Value> {
    fn get_field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_text_escaping() {
        assert_eq!(Value::from("it's").to_sql_inline(), "'it''s'");
    }

    #[test]
    fn test_inline_temporal() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(Value::from(date).to_sql_inline(), "'2024-03-01'");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Int(3));
    }

    #[test]
    fn test_untagged_json() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 7, 1.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(7),
                Value::Float(1.5),
                Value::Text("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_coerce_by_column_type() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(Value::from("2024-01-01").coerce(SqlType::Date), Value::Date(date));
        assert_eq!(
            Value::from("2024-01-01 08:00:00").coerce(SqlType::DateTime),
            Value::DateTime(date.and_hms_opt(8, 0, 0).unwrap())
        );
        assert_eq!(
            Value::from("2024-01-01").coerce(SqlType::Text),
            Value::from("2024-01-01")
        );
        assert_eq!(Value::from("soon").coerce(SqlType::Date), Value::from("soon"));
        assert_eq!(Value::Int(3).coerce(SqlType::Date), Value::Int(3));
    }

    #[test]
    fn test_getter_for_values() {
        let mut values = Values::new();
        values.insert("email".to_string(), Value::from("a@b.c"));
        assert_eq!(values.get_field("email"), Some(Value::from("a@b.c")));
        assert_eq!(values.get_field("missing"), None);
    }
}
