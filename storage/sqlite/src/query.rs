//! The list query: a base entity query scoped to one organization, plus computed attribute
//! columns, filter predicates and an ordering. Compiled into SQL by [`crate::sql_builder`].

use std::sync::Arc;

use chrono::NaiveDate;
use indexmap::IndexMap;
use tabula_core::annotation::annotation_name;
use tabula_core::attribute::DataType;
use tabula_core::ids::{AttributeId, EntityId, EntityType, OrganizationId};
use tabula_core::registry::{FieldSource, ListTypeDescriptor};
use tabula_core::{CatalogSnapshot, ColumnId};

use crate::sql_builder::{SqlBuilder, SqlGenerationError};
use crate::value::SqliteValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column of the base row
    Column(String),
    /// Column of the row referenced by a foreign key of the base row
    Related { table: String, foreign_key: String, column: String },
    /// A computed column of the query, referenced by alias
    Alias(String),
    /// Calendar-date part of an expression
    Date(Box<Expr>),
    Literal(SqliteValue),
    List(Vec<Expr>),
}

impl Expr {
    pub fn for_source(source: &FieldSource) -> Self {
        match source {
            FieldSource::Column(column) => Expr::Column(column.clone()),
            FieldSource::Related { table, foreign_key, column } => {
                Expr::Related { table: table.clone(), foreign_key: foreign_key.clone(), column: column.clone() }
            }
        }
    }

    pub fn literal(value: impl Into<SqliteValue>) -> Self { Expr::Literal(value.into()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    GreaterThanOrEqual,
    LessThanOrEqual,
    In,
}

/// What an attribute-value existence probe looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeCondition {
    /// Any value row at all
    Any,
    /// A row whose option value is one of these
    OptionIn(Vec<String>),
    /// A row whose date lies within the inclusive bounds
    DateRange { lower: Option<NaiveDate>, upper: Option<NaiveDate> },
}

/// "At least one attribute_value row exists for (attribute, this entity) matching `condition`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeProbe {
    pub attribute: AttributeId,
    pub entity_type: EntityType,
    pub condition: ProbeCondition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison { left: Expr, operator: ComparisonOperator, right: Expr },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    IsNull(Expr),
    Exists(AttributeProbe),
    True,
    False,
}

impl Predicate {
    pub fn compare(left: Expr, operator: ComparisonOperator, right: Expr) -> Self { Predicate::Comparison { left, operator, right } }

    /// `self OR other`, flattening nested ORs.
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut items) => {
                items.push(other);
                Predicate::Or(items)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// One ordering term. NULL sorts as the largest value: last when ascending, first when descending.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub direction: OrderDirection,
}

/// A computed column holding one attribute's value for each base row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub attribute: AttributeId,
    pub entity_type: EntityType,
    pub data_type: DataType,
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    list: Arc<ListTypeDescriptor>,
    organization: OrganizationId,
    catalog: Arc<CatalogSnapshot>,
    fields: Vec<String>,
    annotations: IndexMap<String, Annotation>,
    predicates: Vec<Predicate>,
    order_by: Vec<OrderByItem>,
}

impl ListQuery {
    /// Unfiltered query over the list's base table, restricted to `organization`. `catalog` must
    /// be the attribute view of the same organization and entity type.
    pub fn new(list: Arc<ListTypeDescriptor>, organization: OrganizationId, catalog: Arc<CatalogSnapshot>) -> Self {
        Self { list, organization, catalog, fields: Vec::new(), annotations: IndexMap::new(), predicates: Vec::new(), order_by: Vec::new() }
    }

    pub fn list(&self) -> &ListTypeDescriptor { &self.list }

    pub fn organization(&self) -> OrganizationId { self.organization }

    pub fn catalog(&self) -> &CatalogSnapshot { &self.catalog }

    /// Adds standard fields to the result columns. Unregistered names are ignored.
    pub fn select_fields<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            if self.list.field(name).is_some() && !self.fields.iter().any(|f| f == name) {
                self.fields.push(name.to_owned());
            }
        }
    }

    pub fn fields(&self) -> &[String] { &self.fields }

    pub fn has_annotation(&self, alias: &str) -> bool { self.annotations.contains_key(alias) }

    pub fn annotations(&self) -> impl Iterator<Item = (&str, &Annotation)> { self.annotations.iter().map(|(k, v)| (k.as_str(), v)) }

    pub(crate) fn add_annotation(&mut self, annotation: Annotation) {
        self.annotations.entry(annotation_name(annotation.attribute)).or_insert(annotation);
    }

    pub fn filter(&mut self, predicate: Predicate) { self.predicates.push(predicate); }

    pub fn predicates(&self) -> &[Predicate] { &self.predicates }

    pub fn order_by(&mut self, item: OrderByItem) { self.order_by.push(item); }

    pub fn ordering(&self) -> &[OrderByItem] { &self.order_by }

    /// Page of rows: `id`, the selected fields, then the annotations.
    pub fn select_sql(&self, limit: u32, offset: u64) -> Result<(String, Vec<rusqlite::types::Value>), SqlGenerationError> {
        let mut sql = SqlBuilder::new(&self.list.entity).with_annotations(&self.annotations);
        sql.select(&self.list, &self.fields)?;
        sql.where_clause(self.organization, &self.predicates)?;
        sql.order_by(&self.order_by)?;
        sql.limit(limit, offset);
        Ok(sql.build())
    }

    /// `COUNT(*)` and `COUNT(DISTINCT id)` over the filtered rows.
    pub fn count_sql(&self) -> Result<(String, Vec<rusqlite::types::Value>), SqlGenerationError> {
        let mut sql = SqlBuilder::new(&self.list.entity).with_annotations(&self.annotations);
        sql.select_counts()?;
        sql.where_clause(self.organization, &self.predicates)?;
        Ok(sql.build())
    }
}

/// One result row, keyed by field name or annotation alias.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRow {
    pub id: EntityId,
    pub values: IndexMap<String, SqliteValue>,
}

impl ListRow {
    pub fn get(&self, column: &ColumnId) -> Option<&SqliteValue> {
        match column {
            ColumnId::Field(name) => self.values.get(name),
            ColumnId::Attribute(id) => self.values.get(&annotation_name(*id)),
        }
    }
}
