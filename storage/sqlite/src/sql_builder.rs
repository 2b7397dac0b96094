//! SQL builder for SQLite queries
//!
//! Renders a [`crate::query::ListQuery`] into SQL text plus positional parameters. The base table is
//! always aliased `"base"`; attribute-value probes use `"av"` / `"ao"` inside their own subqueries.

use indexmap::IndexMap;
use tabula_core::attribute::DataType;
use tabula_core::ids::{AttributeId, EntityType, OrganizationId};
use tabula_core::registry::{EntityDescriptor, ListTypeDescriptor};
use thiserror::Error;

use crate::error::SqliteError;
use crate::query::{Annotation, AttributeProbe, ComparisonOperator, Expr, OrderByItem, OrderDirection, Predicate, ProbeCondition};
use crate::schema::{OPTION_TABLE, VALUE_TABLE};
use crate::value::SqliteValue;

pub const BASE_ALIAS: &str = "base";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SqlGenerationError {
    #[error("Empty IN list for {0}")]
    EmptyList(String),
    #[error("Unknown computed column: {0}")]
    UnknownAlias(String),
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(&'static str),
    #[error("Unknown field: {0}")]
    UnknownField(String),
}

impl From<SqlGenerationError> for SqliteError {
    fn from(err: SqlGenerationError) -> Self { SqliteError::SqlGeneration(err.to_string()) }
}

/// Quote an identifier, doubling embedded quotes
pub fn quote(identifier: &str) -> String { format!(r#""{}""#, identifier.replace('"', "\"\"")) }

/// SQL builder for SQLite queries
pub struct SqlBuilder<'a> {
    sql: String,
    params: Vec<rusqlite::types::Value>,
    entity: &'a EntityDescriptor,
    annotations: Option<&'a IndexMap<String, Annotation>>,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(entity: &'a EntityDescriptor) -> Self { Self { sql: String::new(), params: Vec::new(), entity, annotations: None } }

    /// Computed columns that `Expr::Alias` may refer to
    pub fn with_annotations(mut self, annotations: &'a IndexMap<String, Annotation>) -> Self {
        self.annotations = Some(annotations);
        self
    }

    fn push_sql(&mut self, s: &str) { self.sql.push_str(s); }

    fn push_param(&mut self, value: rusqlite::types::Value) {
        self.sql.push('?');
        self.params.push(value);
    }

    fn push_text(&mut self, value: impl Into<String>) { self.push_param(rusqlite::types::Value::Text(value.into())); }

    fn base_column(&mut self, column: &str) { self.push_sql(&format!("{}.{}", quote(BASE_ALIAS), quote(column))); }

    fn base_id(&mut self) {
        let entity = self.entity;
        self.base_column(&entity.id_column);
    }

    fn base_organization(&mut self) {
        let entity = self.entity;
        self.base_column(&entity.organization_column);
    }

    pub fn build(self) -> (String, Vec<rusqlite::types::Value>) { (self.sql, self.params) }

    /// `SELECT base.id, <fields>, <annotations> FROM <table> AS base`
    pub fn select(&mut self, list: &ListTypeDescriptor, fields: &[String]) -> Result<(), SqlGenerationError> {
        let annotations = self.annotations;
        self.push_sql("SELECT ");
        self.base_id();
        self.push_sql(r#" AS "id""#);
        for name in fields {
            let field = list.field(name).ok_or_else(|| SqlGenerationError::UnknownField(name.clone()))?;
            self.push_sql(", ");
            self.expr(&Expr::for_source(&field.source))?;
            self.push_sql(&format!(" AS {}", quote(name)));
        }
        for (alias, annotation) in annotations.into_iter().flatten() {
            self.push_sql(", ");
            self.annotation(annotation);
            self.push_sql(&format!(" AS {}", quote(alias)));
        }
        self.from();
        Ok(())
    }

    /// `SELECT COUNT(*), COUNT(DISTINCT base.id) FROM <table> AS base`
    pub fn select_counts(&mut self) -> Result<(), SqlGenerationError> {
        self.push_sql("SELECT COUNT(*), COUNT(DISTINCT ");
        self.base_id();
        self.push_sql(")");
        self.from();
        Ok(())
    }

    fn from(&mut self) { self.push_sql(&format!(" FROM {} AS {}", quote(&self.entity.table), quote(BASE_ALIAS))); }

    /// The organization restriction ANDed with every predicate.
    pub fn where_clause(&mut self, organization: OrganizationId, predicates: &[Predicate]) -> Result<(), SqlGenerationError> {
        self.push_sql(" WHERE ");
        self.base_organization();
        self.push_sql(" = ");
        self.push_text(organization.to_string());
        for predicate in predicates {
            self.push_sql(" AND (");
            self.predicate(predicate)?;
            self.push_sql(")");
        }
        Ok(())
    }

    /// Requested ordering followed by `base.id ASC`.
    pub fn order_by(&mut self, items: &[OrderByItem]) -> Result<(), SqlGenerationError> {
        self.push_sql(" ORDER BY ");
        for item in items {
            self.order_by_item(item)?;
            self.push_sql(", ");
        }
        self.base_id();
        self.push_sql(" ASC");
        Ok(())
    }

    pub fn limit(&mut self, limit: u32, offset: u64) { self.push_sql(&format!(" LIMIT {} OFFSET {}", limit, offset)); }

    pub fn expr(&mut self, expr: &Expr) -> Result<(), SqlGenerationError> {
        match expr {
            Expr::Column(column) => self.base_column(column),
            Expr::Related { table, foreign_key, column } => {
                self.push_sql(&format!("(SELECT {r}.{} FROM {} AS {r} WHERE {r}.{} = ", quote(column), quote(table), quote("id"), r = quote("r")));
                self.base_column(foreign_key);
                self.push_sql(")");
            }
            Expr::Alias(alias) => {
                let annotation = self.annotations.and_then(|a| a.get(alias)).ok_or_else(|| SqlGenerationError::UnknownAlias(alias.clone()))?;
                self.annotation(annotation);
            }
            Expr::Date(inner) => {
                self.push_sql("date(");
                self.expr(inner)?;
                self.push_sql(")");
            }
            Expr::Literal(value) => self.literal(value),
            Expr::List(exprs) => {
                if exprs.is_empty() {
                    return Err(SqlGenerationError::UnsupportedExpression("empty expression list"));
                }
                self.push_sql("(");
                for (i, expr) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.push_sql(", ");
                    }
                    self.expr(expr)?;
                }
                self.push_sql(")");
            }
        }
        Ok(())
    }

    fn literal(&mut self, value: &SqliteValue) { self.push_param(value.to_sql()); }

    pub fn comparison_op(&mut self, op: &ComparisonOperator) { self.push_sql(comparison_op_to_sql(op)); }

    pub fn predicate(&mut self, predicate: &Predicate) -> Result<(), SqlGenerationError> {
        match predicate {
            Predicate::Comparison { left, operator, right } => {
                self.expr(left)?;
                self.push_sql(" ");
                self.comparison_op(operator);
                self.push_sql(" ");
                self.expr(right)?;
            }
            Predicate::And(items) => self.junction(items, " AND ", "1=1")?,
            Predicate::Or(items) => self.junction(items, " OR ", "1=0")?,
            Predicate::Not(pred) => {
                self.push_sql("NOT (");
                self.predicate(pred)?;
                self.push_sql(")");
            }
            Predicate::IsNull(expr) => {
                self.expr(expr)?;
                self.push_sql(" IS NULL");
            }
            Predicate::Exists(probe) => self.probe(probe)?,
            Predicate::True => self.push_sql("1=1"),
            Predicate::False => self.push_sql("1=0"),
        }
        Ok(())
    }

    fn junction(&mut self, items: &[Predicate], separator: &str, empty: &str) -> Result<(), SqlGenerationError> {
        if items.is_empty() {
            self.push_sql(empty);
            return Ok(());
        }
        self.push_sql("(");
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push_sql(separator);
            }
            self.predicate(item)?;
        }
        self.push_sql(")");
        Ok(())
    }

    /// `FROM attribute_value AS av [JOIN attribute_option AS ao] WHERE <attribute, entity match>`
    fn value_rows(&mut self, attribute: AttributeId, entity_type: &EntityType, with_options: bool) {
        self.push_sql(&format!(" FROM {} AS {}", quote(VALUE_TABLE), quote("av")));
        if with_options {
            self.push_sql(&format!(r#" JOIN {} AS "ao" ON "ao"."id" = "av"."value_option_id""#, quote(OPTION_TABLE)));
        }
        self.push_sql(r#" WHERE "av"."attribute_id" = "#);
        self.push_text(attribute.to_string());
        self.push_sql(r#" AND "av"."entity_type" = "#);
        self.push_text(entity_type.as_str());
        self.push_sql(r#" AND "av"."entity_id" = "#);
        self.base_id();
    }

    pub fn probe(&mut self, probe: &AttributeProbe) -> Result<(), SqlGenerationError> {
        let with_options = matches!(probe.condition, ProbeCondition::OptionIn(_));
        self.push_sql("EXISTS (SELECT 1");
        self.value_rows(probe.attribute, &probe.entity_type, with_options);
        match &probe.condition {
            ProbeCondition::Any => {}
            ProbeCondition::OptionIn(values) => {
                if values.is_empty() {
                    return Err(SqlGenerationError::EmptyList(probe.attribute.to_string()));
                }
                self.push_sql(r#" AND "ao"."value" IN ("#);
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.push_sql(", ");
                    }
                    self.push_text(value.as_str());
                }
                self.push_sql(")");
            }
            ProbeCondition::DateRange { lower, upper } => {
                if let Some(lower) = lower {
                    self.push_sql(r#" AND "av"."value_date" >= "#);
                    self.literal(&SqliteValue::from(*lower));
                }
                if let Some(upper) = upper {
                    self.push_sql(r#" AND "av"."value_date" <= "#);
                    self.literal(&SqliteValue::from(*upper));
                }
            }
        }
        self.push_sql(")");
        Ok(())
    }

    /// Scalar subquery yielding one value per base row: the earliest date, or the first option label.
    pub fn annotation(&mut self, annotation: &Annotation) {
        match annotation.data_type {
            DataType::Date => {
                self.push_sql(r#"(SELECT "av"."value_date""#);
                self.value_rows(annotation.attribute, &annotation.entity_type, false);
                self.push_sql(r#" ORDER BY "av"."value_date" LIMIT 1)"#);
            }
            DataType::Enum => {
                self.push_sql(r#"(SELECT "ao"."label""#);
                self.value_rows(annotation.attribute, &annotation.entity_type, true);
                self.push_sql(r#" ORDER BY "ao"."label" LIMIT 1)"#);
            }
        }
    }

    pub fn order_by_item(&mut self, order_by: &OrderByItem) -> Result<(), SqlGenerationError> {
        self.expr(&order_by.expr)?;
        match order_by.direction {
            OrderDirection::Asc => self.push_sql(" ASC NULLS LAST"),
            OrderDirection::Desc => self.push_sql(" DESC NULLS FIRST"),
        }
        Ok(())
    }
}

fn comparison_op_to_sql(op: &ComparisonOperator) -> &'static str {
    match op {
        ComparisonOperator::Equal => "=",
        ComparisonOperator::GreaterThanOrEqual => ">=",
        ComparisonOperator::LessThanOrEqual => "<=",
        ComparisonOperator::In => "IN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::ids::OrganizationId;

    fn entity() -> EntityDescriptor { EntityDescriptor::new("encounter", "encounter") }

    #[test]
    fn test_simple_equality() {
        let entity = entity();
        let mut sql = SqlBuilder::new(&entity);
        sql.predicate(&Predicate::compare(Expr::Column("status".into()), ComparisonOperator::Equal, Expr::literal("open"))).unwrap();
        let (sql_string, params) = sql.build();

        assert_eq!(sql_string, r#""base"."status" = ?"#);
        assert_eq!(params, vec![rusqlite::types::Value::Text("open".into())]);
    }

    #[test]
    fn test_where_clause_is_scoped_to_organization() {
        let entity = entity();
        let org = OrganizationId::new();
        let mut sql = SqlBuilder::new(&entity);
        sql.where_clause(org, &[Predicate::IsNull(Expr::Column("status".into()))]).unwrap();
        let (sql_string, params) = sql.build();

        assert_eq!(sql_string, r#" WHERE "base"."organization_id" = ? AND ("base"."status" IS NULL)"#);
        assert_eq!(params, vec![rusqlite::types::Value::Text(org.to_string())]);
    }

    #[test]
    fn test_in_operator() {
        let entity = entity();
        let mut sql = SqlBuilder::new(&entity);
        let list = Expr::List(vec![Expr::literal("a"), Expr::literal("b")]);
        sql.predicate(&Predicate::compare(Expr::Column("status".into()), ComparisonOperator::In, list)).unwrap();
        let (sql_string, params) = sql.build();

        assert_eq!(sql_string, r#""base"."status" IN (?, ?)"#);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_related_column() {
        let entity = entity();
        let mut sql = SqlBuilder::new(&entity);
        let related = Expr::Related { table: "patient".into(), foreign_key: "patient_id".into(), column: "email".into() };
        sql.expr(&related).unwrap();
        let (sql_string, _) = sql.build();

        assert_eq!(sql_string, r#"(SELECT "r"."email" FROM "patient" AS "r" WHERE "r"."id" = "base"."patient_id")"#);
    }

    #[test]
    fn test_option_probe() {
        let entity = entity();
        let attribute = AttributeId::new();
        let mut sql = SqlBuilder::new(&entity);
        let probe = AttributeProbe { attribute, entity_type: "encounter".into(), condition: ProbeCondition::OptionIn(vec!["high".into()]) };
        sql.predicate(&Predicate::Exists(probe)).unwrap();
        let (sql_string, params) = sql.build();

        assert_eq!(
            sql_string,
            r#"EXISTS (SELECT 1 FROM "attribute_value" AS "av" JOIN "attribute_option" AS "ao" ON "ao"."id" = "av"."value_option_id" WHERE "av"."attribute_id" = ? AND "av"."entity_type" = ? AND "av"."entity_id" = "base"."id" AND "ao"."value" IN (?))"#
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_empty_option_probe_is_rejected() {
        let entity = entity();
        let mut sql = SqlBuilder::new(&entity);
        let probe = AttributeProbe { attribute: AttributeId::new(), entity_type: "encounter".into(), condition: ProbeCondition::OptionIn(vec![]) };
        assert!(matches!(sql.predicate(&Predicate::Exists(probe)), Err(SqlGenerationError::EmptyList(_))));
    }

    #[test]
    fn test_order_by_null_policy_and_tie_breaker() {
        let entity = entity();
        let mut sql = SqlBuilder::new(&entity);
        let items = vec![
            OrderByItem { expr: Expr::Column("status".into()), direction: OrderDirection::Asc },
            OrderByItem { expr: Expr::Column("created_at".into()), direction: OrderDirection::Desc },
        ];
        sql.order_by(&items).unwrap();
        let (sql_string, _) = sql.build();

        assert_eq!(sql_string, r#" ORDER BY "base"."status" ASC NULLS LAST, "base"."created_at" DESC NULLS FIRST, "base"."id" ASC"#);
    }

    #[test]
    fn test_unknown_alias() {
        let entity = entity();
        let mut sql = SqlBuilder::new(&entity);
        assert_eq!(sql.expr(&Expr::Alias("attr_x".into())), Err(SqlGenerationError::UnknownAlias("attr_x".into())));
    }
}
