//! Compiles condition trees into SQL fragments.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::model::ModelSnapshot;
use crate::value::Value;

use super::filter::{parse_lookup, Condition, Q};

/// A compiled WHERE fragment and its positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledPredicate {
    /// SQL text, without the `WHERE` keyword. Empty for an empty condition.
    pub sql: String,
    /// Arguments in placeholder order.
    pub args: Vec<Value>,
}

impl CompiledPredicate {
    /// Returns true when the condition compiled to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Returns ` WHERE <sql>`, or an empty string for an empty predicate.
    #[must_use]
    pub fn where_clause(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// Compiles `condition` against `model` for `dialect`.
///
/// `start` is the 1-based index of the first placeholder, for statements
/// that already consumed arguments before the WHERE clause. Field names
/// resolve to physical columns through the model.
///
/// # Example
///
/// ```ignore
/// let cond = Q::eq("a", 1).or(Q::eq("b", 2)).and_not(Q::eq("c", 3));
/// let compiled = compile(&cond, &model, &PostgresDialect::new(), 1)?;
/// assert_eq!(compiled.sql, r#"("a" = $1 OR "b" = $2) AND NOT ("c" = $3)"#);
/// ```
pub fn compile(
    condition: &Condition,
    model: &ModelSnapshot,
    dialect: &dyn Dialect,
    start: usize,
) -> Result<CompiledPredicate> {
    let mut compiler = Compiler {
        model,
        dialect,
        next: start,
        args: Vec::new(),
    };
    let sql = compiler.condition(condition)?;
    Ok(CompiledPredicate {
        sql,
        args: compiler.args,
    })
}

struct Compiler<'a> {
    model: &'a ModelSnapshot,
    dialect: &'a dyn Dialect,
    next: usize,
    args: Vec<Value>,
}

impl Compiler<'_> {
    fn condition(&mut self, condition: &Condition) -> Result<String> {
        match condition {
            Condition::Empty => Ok(String::new()),
            Condition::Leaf(q) => self.leaf(q),
            Condition::Not(inner) => {
                let inner = self.condition(inner)?;
                Ok(format!("NOT ({inner})"))
            }
            Condition::Chain {
                left,
                combinator,
                not,
                right,
            } => {
                let mut left_sql = self.condition(left)?;
                if needs_group(left) {
                    left_sql = format!("({left_sql})");
                }
                let mut right_sql = self.condition(right)?;
                if *not || needs_group(right) {
                    right_sql = format!("({right_sql})");
                }
                let not = if *not { "NOT " } else { "" };
                Ok(format!(
                    "{left_sql} {} {not}{right_sql}",
                    combinator.as_sql()
                ))
            }
        }
    }

    fn leaf(&mut self, q: &Q) -> Result<String> {
        let mut parts = Vec::with_capacity(q.lookups().len());
        for (key, value) in q.lookups() {
            let (field, op) = parse_lookup(key)?;
            let column = self.model.column(field)?;
            parts.push(format!(
                "{} {} {}",
                self.dialect.quote_identifier(column),
                self.dialect.operator(op),
                self.dialect.placeholder(self.next)
            ));
            self.next += 1;
            self.args.push(value.clone());
        }
        Ok(parts.join(" AND "))
    }
}

/// Chains and multi-lookup leaves get their own parentheses when nested.
fn needs_group(condition: &Condition) -> bool {
    match condition {
        Condition::Chain { .. } => true,
        Condition::Leaf(q) => q.lookups().len() > 1,
        Condition::Empty | Condition::Not(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::error::OrmError;
    use crate::fields::Field;
    use crate::model::ModelDeclaration;

    fn model() -> ModelSnapshot {
        ModelDeclaration::new("Person")
            .field("a", Field::integer())
            .field("b", Field::integer())
            .field("c", Field::integer())
            .field("name", Field::char(50).column("full_name"))
            .build("test")
            .unwrap()
    }

    #[test]
    fn test_empty_condition() {
        let compiled = compile(&Condition::Empty, &model(), &SqliteDialect::new(), 1).unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.args.is_empty());
        assert_eq!(compiled.where_clause(), "");
    }

    #[test]
    fn test_or_then_and_not() {
        let cond = Q::eq("a", 1).or(Q::eq("b", 2)).and_not(Q::eq("c", 3));
        let compiled = compile(&cond, &model(), &PostgresDialect::new(), 1).unwrap();
        assert_eq!(
            compiled.sql,
            "(\"a\" = $1 OR \"b\" = $2) AND NOT (\"c\" = $3)"
        );
        assert_eq!(
            compiled.args,
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn test_or_not_nested_chain() {
        let cond = Q::eq("a", 1).or_not(Q::eq("b", 2).or(Q::eq("c", 3)));
        let compiled = compile(&cond, &model(), &SqliteDialect::new(), 1).unwrap();
        assert_eq!(compiled.sql, "\"a\" = ? OR NOT (\"b\" = ? OR \"c\" = ?)");
    }

    #[test]
    fn test_start_index_and_operators() {
        let cond = Q::new().lookup("a >=", 18).lookup("b !=", 0).and(Q::lt("c", 5));
        let compiled = compile(&cond, &model(), &PostgresDialect::new(), 3).unwrap();
        assert_eq!(
            compiled.sql,
            "(\"a\" >= $3 AND \"b\" <> $4) AND \"c\" < $5"
        );
    }

    #[test]
    fn test_column_override() {
        let compiled = compile(
            &Q::eq("name", "x").into(),
            &model(),
            &SqliteDialect::new(),
            1,
        )
        .unwrap();
        assert_eq!(compiled.sql, "\"full_name\" = ?");
    }

    #[test]
    fn test_deterministic() {
        let cond = Q::eq("a", 1).or(Q::gt("b", 2)).and_not(Q::eq("c", 3));
        let first = compile(&cond, &model(), &PostgresDialect::new(), 1).unwrap();
        let second = compile(&cond, &model(), &PostgresDialect::new(), 1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_field() {
        let result = compile(&Q::eq("zzz", 1).into(), &model(), &SqliteDialect::new(), 1);
        assert!(matches!(
            result,
            Err(OrmError::FieldResolution { field, .. }) if field == "zzz"
        ));
    }

    #[test]
    fn test_unknown_operator() {
        let cond = Q::new().lookup("a ~", 1).into();
        let result = compile(&cond, &model(), &SqliteDialect::new(), 1);
        assert!(matches!(result, Err(OrmError::InvalidLookup(_))));
    }

    #[test]
    fn test_standalone_not() {
        let cond = Condition::Empty.and_not(Q::eq("a", 1));
        let compiled = compile(&cond, &model(), &SqliteDialect::new(), 1).unwrap();
        assert_eq!(compiled.sql, "NOT (\"a\" = ?)");
    }
}
