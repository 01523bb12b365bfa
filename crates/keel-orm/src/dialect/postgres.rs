//! PostgreSQL dialect.

use crate::fields::SqlType;
use crate::query::Operator;

use super::Dialect;

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn operator(&self, op: Operator) -> &'static str {
        match op {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
        }
    }

    fn type_name(&self, sql_type: SqlType) -> String {
        match sql_type {
            SqlType::Integer => "BIGINT".to_string(),
            SqlType::Varchar(n) => format!("VARCHAR({n})"),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::DateTime => "TIMESTAMP".to_string(),
        }
    }

    fn auto_increment_column(&self) -> &'static str {
        "BIGSERIAL PRIMARY KEY"
    }

    fn supports_drop_column(&self) -> bool {
        true
    }

    fn supports_alter_nullability(&self) -> bool {
        true
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;
    use crate::model::ModelDeclaration;

    #[test]
    fn test_create_table() {
        let model = ModelDeclaration::new("User")
            .field("email", Field::char(100))
            .field("active", Field::boolean().default(false))
            .build("main")
            .unwrap();

        assert_eq!(
            PostgresDialect::new().create_table_sql(&model, false),
            "CREATE TABLE \"main_user\" (\"id\" BIGSERIAL PRIMARY KEY, \
             \"email\" VARCHAR(100) NOT NULL, \"active\" BOOLEAN NOT NULL DEFAULT FALSE)"
        );
    }

    #[test]
    fn test_placeholders() {
        let d = PostgresDialect::new();
        assert_eq!(d.placeholder(1), "$1");
        assert_eq!(d.placeholder(12), "$12");
    }

    #[test]
    fn test_not_equal_spelling() {
        assert_eq!(PostgresDialect::new().operator(Operator::Ne), "<>");
    }

    #[test]
    fn test_set_not_null() {
        assert_eq!(
            PostgresDialect::new().set_not_null_sql("users", "email"),
            "ALTER TABLE \"users\" ALTER COLUMN \"email\" SET NOT NULL"
        );
    }
}
