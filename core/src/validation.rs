//! Checks untrusted filter documents against the catalog and the list-type registry.
//!
//! Strict mode (`validate`) collects every problem, keyed by the document key it concerns, so a
//! caller can report them all at once. Clean mode (`validate_and_clean`) drops the failing
//! entries instead, which lets a stale saved preference degrade to "filter not applied".

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::warn;

use crate::attribute::DataType;
use crate::catalog::{Catalog, CatalogSnapshot};
use crate::error::RetrievalError;
use crate::filter::{parse_date, DateBound, DateFilter, DateOperator, FilterDocument, FilterSpec};
use crate::ids::{AttributeId, OrganizationId};
use crate::registry::{parse_bool, FieldType, ListTypeDescriptor};
use crate::sort::{ColumnId, SortSpec};

/// One reason a filter entry was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterIssue {
    #[error("not a valid attribute id")]
    InvalidAttributeId,

    /// Not found in the organization and entity type of the list
    #[error("unknown attribute")]
    UnknownAttribute,

    #[error("unknown option {0:?}")]
    UnknownOption(String),

    /// The filter's shape does not fit the attribute or field type
    #[error("unsupported filter for this column")]
    UnsupportedShape,

    #[error("{bound} {value:?} is not a date")]
    UnparsableDate { bound: DateBound, value: String },

    #[error("missing {bound} date")]
    MissingDate { bound: DateBound },

    #[error("start {start} is after end {end}")]
    InvertedRange { start: String, end: String },

    #[error("unknown field")]
    UnknownField,

    #[error("invalid choice {0:?}")]
    InvalidChoice(String),
}

/// Per-key validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: BTreeMap<String, Vec<FilterIssue>>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool { self.errors.is_empty() }

    pub fn get(&self, key: &str) -> Option<&[FilterIssue]> { self.errors.get(key).map(Vec::as_slice) }

    fn record(&mut self, key: &str, issues: Vec<FilterIssue>) {
        if !issues.is_empty() {
            self.errors.entry(key.to_owned()).or_default().extend(issues);
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, issues) in &self.errors {
            for issue in issues {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "{key}: {issue}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Strict validation against a preloaded catalog view.
pub fn validate_with(doc: &FilterDocument, list: &ListTypeDescriptor, catalog: &CatalogSnapshot) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    for (name, spec) in &doc.model_fields {
        errors.record(name, field_issues(name, spec, list));
    }
    for (key, spec) in &doc.custom_attributes {
        errors.record(key, attribute_issues(key, spec, catalog));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Copy of `doc` without the entries that fail validation. Attribute keys come out in hyphenated
/// form whatever UUID spelling they were stored with.
pub fn clean_with(doc: &FilterDocument, list: &ListTypeDescriptor, catalog: &CatalogSnapshot) -> FilterDocument {
    let mut cleaned = doc.clone();
    cleaned.model_fields.retain(|name, spec| {
        let issues = field_issues(name, spec, list);
        if !issues.is_empty() {
            warn!("Dropping filter on field {} of {}: {:?}", name, list.list_type, issues);
        }
        issues.is_empty()
    });
    cleaned.custom_attributes = doc
        .custom_attributes
        .iter()
        .filter_map(|(key, spec)| {
            let issues = attribute_issues(key, spec, catalog);
            if !issues.is_empty() {
                warn!("Dropping filter on attribute {} of {}: {:?}", key, list.list_type, issues);
                return None;
            }
            let id: AttributeId = key.parse().ok()?;
            Some((id.to_string(), spec.clone()))
        })
        .collect();
    cleaned
}

/// Strict validation. Fails only with the per-key issue map; storage faults are returned as the
/// outer error.
pub async fn validate<C: Catalog + ?Sized>(
    catalog: &C,
    doc: &FilterDocument,
    organization: OrganizationId,
    list: &ListTypeDescriptor,
) -> Result<Result<(), ValidationErrors>, RetrievalError> {
    let snapshot = CatalogSnapshot::load(catalog, organization, list.entity_type()).await?;
    Ok(validate_with(doc, list, &snapshot))
}

pub async fn validate_and_clean<C: Catalog + ?Sized>(
    catalog: &C,
    doc: &FilterDocument,
    organization: OrganizationId,
    list: &ListTypeDescriptor,
) -> Result<FilterDocument, RetrievalError> {
    let snapshot = CatalogSnapshot::load(catalog, organization, list.entity_type()).await?;
    Ok(clean_with(doc, list, &snapshot))
}

/// A sort is valid when it names a standard field of the list or an attribute in scope.
pub fn validate_sort(sort: &SortSpec, list: &ListTypeDescriptor, catalog: &CatalogSnapshot) -> bool {
    match &sort.column {
        ColumnId::Field(name) => list.field(name).is_some(),
        ColumnId::Attribute(id) => catalog.attribute(*id).is_some(),
    }
}

fn attribute_issues(key: &str, spec: &FilterSpec, catalog: &CatalogSnapshot) -> Vec<FilterIssue> {
    let Ok(id) = key.parse::<AttributeId>() else {
        return vec![FilterIssue::InvalidAttributeId];
    };
    let Some(attribute) = catalog.attribute(id) else {
        return vec![FilterIssue::UnknownAttribute];
    };
    match (attribute.data_type, spec) {
        (DataType::Enum, FilterSpec::Values { values, .. }) => {
            values.iter().filter(|v| catalog.option_by_value(id, v).is_none()).map(|v| FilterIssue::UnknownOption(v.clone())).collect()
        }
        (DataType::Enum, FilterSpec::Exact { exact }) => match catalog.option_by_value(id, exact) {
            Some(_) => Vec::new(),
            None => vec![FilterIssue::UnknownOption(exact.clone())],
        },
        (DataType::Date, FilterSpec::Date(date)) => date_issues(date),
        _ => vec![FilterIssue::UnsupportedShape],
    }
}

fn field_issues(name: &str, spec: &FilterSpec, list: &ListTypeDescriptor) -> Vec<FilterIssue> {
    let Some(field) = list.field(name) else {
        return vec![FilterIssue::UnknownField];
    };
    let values: Vec<&String> = match spec {
        FilterSpec::Exact { exact } => vec![exact],
        FilterSpec::Values { values, .. } => values.iter().collect(),
        FilterSpec::Date(date) => {
            return match field.field_type {
                FieldType::Date => date_issues(date),
                _ => vec![FilterIssue::UnsupportedShape],
            };
        }
    };
    match field.field_type {
        FieldType::Text => Vec::new(),
        FieldType::Enum => values.into_iter().filter(|v| field.choice_label(v).is_none()).map(|v| FilterIssue::InvalidChoice(v.clone())).collect(),
        FieldType::Boolean => values.into_iter().filter(|v| parse_bool(v).is_none()).map(|v| FilterIssue::InvalidChoice(v.clone())).collect(),
        FieldType::Date => match spec {
            FilterSpec::Exact { exact } if parse_date(exact).is_none() => {
                vec![FilterIssue::UnparsableDate { bound: DateBound::Value, value: exact.clone() }]
            }
            FilterSpec::Exact { .. } => Vec::new(),
            _ => vec![FilterIssue::UnsupportedShape],
        },
    }
}

fn date_issues(date: &DateFilter) -> Vec<FilterIssue> {
    let mut issues = Vec::new();
    let mut check = |bound: DateBound, value: Option<&String>, required: bool| match value {
        Some(v) if parse_date(v).is_none() => issues.push(FilterIssue::UnparsableDate { bound, value: v.clone() }),
        None if required => issues.push(FilterIssue::MissingDate { bound }),
        _ => {}
    };
    match date.operator {
        DateOperator::Exact | DateOperator::Gte | DateOperator::Lte => check(DateBound::Value, date.value.as_ref(), true),
        DateOperator::Range => {
            let empty = date.start.is_none() && date.end.is_none();
            check(DateBound::Start, date.start.as_ref(), empty);
            check(DateBound::End, date.end.as_ref(), empty);
        }
    }
    if issues.is_empty() && date.operator == DateOperator::Range {
        if let (Some(start), Some(end)) = (date.start.as_deref().and_then(parse_date), date.end.as_deref().and_then(parse_date)) {
            if start > end {
                issues.push(FilterIssue::InvertedRange { start: start.to_string(), end: end.to_string() });
            }
        }
    }
    issues
}
