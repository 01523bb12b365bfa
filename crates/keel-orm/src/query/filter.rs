//! Q objects and condition trees.
//!
//! A [`Q`] is a leaf predicate: one or more `"field op"` lookups bound to
//! values, joined with AND. Leaves combine into a [`Condition`] chain with
//! `and`, `and_not`, `or` and `or_not`. Chains associate left to right.

use std::fmt;
use std::str::FromStr;

use crate::error::OrmError;
use crate::value::Value;

/// Comparison operators accepted as a lookup key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal (=)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Ne => write!(f, "!="),
            Self::Gt => write!(f, ">"),
            Self::Gte => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Lte => write!(f, "<="),
        }
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            other => Err(OrmError::InvalidLookup(other.to_string())),
        }
    }
}

/// Splits a lookup key like `"age >="` into field name and operator.
///
/// A key without operator suffix compares for equality.
pub fn parse_lookup(key: &str) -> Result<(&str, Operator), OrmError> {
    let key = key.trim();
    match key.rsplit_once(char::is_whitespace) {
        Some((field, op)) => Ok((field.trim_end(), op.parse()?)),
        None => Ok((key, Operator::Eq)),
    }
}

/// A leaf predicate: lookups joined with AND.
///
/// # Example
///
/// ```ignore
/// use keel_orm::Q;
///
/// let adults = Q::new().lookup("age >=", 18).lookup("active", true);
/// let filter = Q::eq("role", "admin").or(Q::eq("role", "staff")).and_not(adults);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Q {
    lookups: Vec<(String, Value)>,
}

impl Q {
    /// Creates an empty predicate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a lookup. `key` is a field name with an optional operator suffix.
    #[must_use]
    pub fn lookup(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.lookups.push((key.into(), value.into()));
        self
    }

    fn single(field: &str, op: Operator, value: impl Into<Value>) -> Self {
        let key = if op == Operator::Eq {
            field.to_string()
        } else {
            format!("{field} {op}")
        };
        Self::new().lookup(key, value)
    }

    /// Creates an equality filter (field = value).
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Eq, value)
    }

    /// Creates an inequality filter (field != value).
    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Ne, value)
    }

    /// Creates a greater-than filter (field > value).
    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Gt, value)
    }

    /// Creates a greater-than-or-equal filter (field >= value).
    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Gte, value)
    }

    /// Creates a less-than filter (field < value).
    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Lt, value)
    }

    /// Creates a less-than-or-equal filter (field <= value).
    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Lte, value)
    }

    /// Returns the lookups in insertion order.
    #[must_use]
    pub fn lookups(&self) -> &[(String, Value)] {
        &self.lookups
    }

    /// Returns true when the predicate has no lookups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// Combines with AND.
    #[must_use]
    pub fn and(self, other: impl Into<Condition>) -> Condition {
        Condition::from(self).and(other)
    }

    /// Combines with AND NOT.
    #[must_use]
    pub fn and_not(self, other: impl Into<Condition>) -> Condition {
        Condition::from(self).and_not(other)
    }

    /// Combines with OR.
    #[must_use]
    pub fn or(self, other: impl Into<Condition>) -> Condition {
        Condition::from(self).or(other)
    }

    /// Combines with OR NOT.
    #[must_use]
    pub fn or_not(self, other: impl Into<Condition>) -> Condition {
        Condition::from(self).or_not(other)
    }
}

/// Boolean combinator of a chain link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// AND
    And,
    /// OR
    Or,
}

impl Combinator {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// A condition tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Condition {
    /// No condition; matches every row.
    #[default]
    Empty,
    /// A leaf predicate.
    Leaf(Q),
    /// A negated condition without left-hand side.
    Not(Box<Condition>),
    /// A chain link: `left combinator [NOT] right`.
    Chain {
        /// The accumulated left side.
        left: Box<Condition>,
        /// The combinator joining both sides.
        combinator: Combinator,
        /// Whether the right side is negated.
        not: bool,
        /// The right side.
        right: Box<Condition>,
    },
}

impl From<Q> for Condition {
    fn from(q: Q) -> Self {
        if q.is_empty() {
            Self::Empty
        } else {
            Self::Leaf(q)
        }
    }
}

impl Condition {
    /// Returns true for the empty condition.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    fn link(self, combinator: Combinator, not: bool, other: impl Into<Self>) -> Self {
        let other = other.into();
        match (self, other) {
            (left, Self::Empty) => left,
            (Self::Empty, right) if not => Self::Not(Box::new(right)),
            (Self::Empty, right) => right,
            (left, right) => Self::Chain {
                left: Box::new(left),
                combinator,
                not,
                right: Box::new(right),
            },
        }
    }

    /// Combines with AND.
    #[must_use]
    pub fn and(self, other: impl Into<Self>) -> Self {
        self.link(Combinator::And, false, other)
    }

    /// Combines with AND NOT.
    #[must_use]
    pub fn and_not(self, other: impl Into<Self>) -> Self {
        self.link(Combinator::And, true, other)
    }

    /// Combines with OR.
    #[must_use]
    pub fn or(self, other: impl Into<Self>) -> Self {
        self.link(Combinator::Or, false, other)
    }

    /// Combines with OR NOT.
    #[must_use]
    pub fn or_not(self, other: impl Into<Self>) -> Self {
        self.link(Combinator::Or, true, other)
    }

    /// Negates the whole condition.
    #[must_use]
    pub fn not(self) -> Self {
        match self {
            Self::Empty => Self::Empty,
            other => Self::Not(Box::new(other)),
        }
    }
}
