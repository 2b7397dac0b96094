//! Filter document and sort specifier to query predicates and ordering.
//!
//! Standard fields are 1:1 columns of the base row (or of a row it references), so they compile to
//! direct comparisons. Custom attributes may hold several rows per entity and therefore compile to
//! `EXISTS` probes, which can never multiply base rows.

use chrono::NaiveDate;
use tabula_core::attribute::{AttributeDefinition, DataType};
use tabula_core::filter::{parse_date, DateFilter, FilterDocument, FilterSpec};
use tabula_core::ids::AttributeId;
use tabula_core::registry::{parse_bool, FieldDescriptor, FieldType};
use tabula_core::{ColumnId, SortSpec};
use tracing::{debug, warn};

use crate::annotation::ensure_annotated;
use crate::query::{AttributeProbe, ComparisonOperator, Expr, ListQuery, OrderByItem, OrderDirection, Predicate, ProbeCondition};
use crate::value::SqliteValue;

/// AND every usable entry of `doc` onto `query`. Entries that cannot be compiled are skipped with a
/// warning; callers are expected to have cleaned the document first. An empty value list is no
/// filter at all, its include-null flag included.
pub fn compile_filters(query: &mut ListQuery, doc: &FilterDocument) {
    for (name, spec) in &doc.model_fields {
        if spec.is_empty_selection() {
            debug!("Ignoring empty value list on {}", name);
            continue;
        }
        let Some(field) = query.list().field(name) else {
            warn!("Skipping filter on unknown field {}", name);
            continue;
        };
        match field_predicate(field, spec) {
            Some(predicate) => query.filter(predicate),
            None => warn!("Skipping unusable filter on {}: {:?}", name, spec),
        }
    }

    for (key, spec) in &doc.custom_attributes {
        if spec.is_empty_selection() {
            debug!("Ignoring empty value list on attribute {}", key);
            continue;
        }
        let Ok(attribute) = key.parse::<AttributeId>() else {
            warn!("Skipping filter with invalid attribute id {}", key);
            continue;
        };
        let Some(definition) = query.catalog().attribute(attribute) else {
            warn!("Skipping filter on attribute {} outside this organization", attribute);
            continue;
        };
        match attribute_predicate(definition, spec) {
            Some(predicate) => query.filter(predicate),
            None => warn!("Skipping unusable filter on attribute {}: {:?}", definition.name, spec),
        }
    }
    debug!("Compiled {} filter entries into {} predicates", doc.len(), query.predicates().len());
}

/// Order `query` by `sort`, annotating it first when the column is a custom attribute. Returns false,
/// leaving the query untouched, when the column is unknown.
pub fn compile_sort(query: &mut ListQuery, sort: &SortSpec) -> bool {
    let direction = if sort.descending { OrderDirection::Desc } else { OrderDirection::Asc };
    let expr = match &sort.column {
        ColumnId::Field(name) => match query.list().field(name) {
            Some(field) => Expr::for_source(&field.source),
            None => {
                warn!("Cannot sort by unknown field {}", name);
                return false;
            }
        },
        ColumnId::Attribute(attribute) => match ensure_annotated(query, [*attribute]).pop() {
            Some(alias) => Expr::Alias(alias),
            None => {
                warn!("Cannot sort by attribute {}", attribute);
                return false;
            }
        },
    };
    query.order_by(OrderByItem { expr, direction });
    true
}

fn or_null(predicate: Predicate, include_null: bool, null: impl FnOnce() -> Predicate) -> Predicate {
    if include_null {
        predicate.or(null())
    } else {
        predicate
    }
}

fn field_predicate(field: &FieldDescriptor, spec: &FilterSpec) -> Option<Predicate> {
    let column = Expr::for_source(&field.source);
    let predicate = match spec {
        FilterSpec::Date(filter) => {
            if field.field_type != FieldType::Date {
                return None;
            }
            date_range(Expr::Date(Box::new(column.clone())), filter)?
        }
        FilterSpec::Exact { exact } => {
            let value = field_value(field, exact)?;
            Predicate::compare(comparable(field, &column), ComparisonOperator::Equal, Expr::Literal(value))
        }
        FilterSpec::Values { values, .. } => {
            let values: Vec<SqliteValue> = values.iter().filter_map(|v| field_value(field, v)).collect();
            membership(comparable(field, &column), values)
        }
    };
    Some(or_null(predicate, spec.include_null(), || Predicate::IsNull(column)))
}

/// Date fields compare on their calendar day whatever the stored precision.
fn comparable(field: &FieldDescriptor, column: &Expr) -> Expr {
    match field.field_type {
        FieldType::Date => Expr::Date(Box::new(column.clone())),
        _ => column.clone(),
    }
}

fn field_value(field: &FieldDescriptor, raw: &str) -> Option<SqliteValue> {
    match field.field_type {
        FieldType::Text | FieldType::Enum => Some(SqliteValue::from(raw)),
        FieldType::Boolean => parse_bool(raw).map(SqliteValue::from),
        FieldType::Date => parse_date(raw).map(SqliteValue::from),
    }
}

/// `expr = v`, `expr IN (..)`, or no match when none of the values could be read.
fn membership(expr: Expr, mut values: Vec<SqliteValue>) -> Predicate {
    match values.len() {
        0 => Predicate::False,
        1 => Predicate::compare(expr, ComparisonOperator::Equal, Expr::Literal(values.remove(0))),
        _ => Predicate::compare(expr, ComparisonOperator::In, Expr::List(values.into_iter().map(Expr::Literal).collect())),
    }
}

fn checked_bounds(filter: &DateFilter) -> Option<(Option<NaiveDate>, Option<NaiveDate>)> {
    let (lower, upper) = filter.bounds();
    if lower.is_none() && upper.is_none() {
        return None;
    }
    if let (Some(start), Some(end)) = (lower, upper) {
        if start > end {
            warn!("Date range {} to {} is inverted and matches no value", start, end);
        }
    }
    Some((lower, upper))
}

fn date_range(expr: Expr, filter: &DateFilter) -> Option<Predicate> {
    let (lower, upper) = checked_bounds(filter)?;
    let mut terms = Vec::new();
    if let Some(lower) = lower {
        terms.push(Predicate::compare(expr.clone(), ComparisonOperator::GreaterThanOrEqual, Expr::literal(lower)));
    }
    if let Some(upper) = upper {
        terms.push(Predicate::compare(expr, ComparisonOperator::LessThanOrEqual, Expr::literal(upper)));
    }
    Some(if terms.len() == 1 { terms.remove(0) } else { Predicate::And(terms) })
}

fn attribute_predicate(definition: &AttributeDefinition, spec: &FilterSpec) -> Option<Predicate> {
    let condition = match (definition.data_type, spec) {
        (DataType::Enum, FilterSpec::Values { values, .. }) => {
            ProbeCondition::OptionIn(values.iter().filter(|v| !v.is_empty()).cloned().collect())
        }
        (DataType::Enum, FilterSpec::Exact { exact }) => ProbeCondition::OptionIn(vec![exact.clone()]),
        (DataType::Date, FilterSpec::Date(filter)) => {
            let (lower, upper) = checked_bounds(filter)?;
            ProbeCondition::DateRange { lower, upper }
        }
        (DataType::Date, FilterSpec::Exact { exact }) => {
            let day = parse_date(exact)?;
            ProbeCondition::DateRange { lower: Some(day), upper: Some(day) }
        }
        _ => return None,
    };
    let probe = |condition| Predicate::Exists(AttributeProbe { attribute: definition.id, entity_type: definition.entity_type.clone(), condition });
    Some(or_null(probe(condition), spec.include_null(), || Predicate::Not(Box::new(probe(ProbeCondition::Any)))))
}
