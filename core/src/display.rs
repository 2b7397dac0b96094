//! Human-readable summaries of active filters.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogSnapshot;
use crate::filter::{DateOperator, FilterDocument, FilterSpec};
use crate::ids::AttributeId;
use crate::registry::ListTypeDescriptor;
use crate::sort::ColumnId;

/// One active filter as shown above a list, with enough to remove it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterChip {
    pub column: ColumnId,
    pub label: String,
    pub values: Vec<String>,
    pub include_null: bool,
}

pub fn describe_filters(doc: &FilterDocument, list: &ListTypeDescriptor, catalog: &CatalogSnapshot) -> Vec<FilterChip> {
    let mut chips = Vec::new();
    for (name, spec) in &doc.model_fields {
        let Some(field) = list.field(name) else { continue };
        let values = describe_values(spec, |v| field.choice_label(v).map(str::to_owned));
        chips.push(FilterChip { column: ColumnId::Field(name.clone()), label: field.label.clone(), values, include_null: spec.include_null() });
    }
    for (key, spec) in &doc.custom_attributes {
        let Some(attribute) = key.parse::<AttributeId>().ok().and_then(|id| catalog.attribute(id)) else { continue };
        let values = describe_values(spec, |v| catalog.option_by_value(attribute.id, v).map(|o| o.label.clone()));
        chips.push(FilterChip { column: ColumnId::Attribute(attribute.id), label: attribute.name.clone(), values, include_null: spec.include_null() });
    }
    chips
}

fn describe_values(spec: &FilterSpec, label: impl Fn(&str) -> Option<String>) -> Vec<String> {
    match spec {
        FilterSpec::Exact { exact } => vec![label(exact).unwrap_or_else(|| exact.clone())],
        FilterSpec::Values { values, .. } => values.iter().map(|v| label(v).unwrap_or_else(|| v.clone())).collect(),
        FilterSpec::Date(date) => {
            let value = date.value.as_deref().unwrap_or("");
            let text = match date.operator {
                DateOperator::Exact => value.to_owned(),
                DateOperator::Gte => format!("from {value}"),
                DateOperator::Lte => format!("until {value}"),
                DateOperator::Range => match (date.start.as_deref(), date.end.as_deref()) {
                    (Some(start), Some(end)) => format!("{start} – {end}"),
                    (Some(start), None) => format!("from {start}"),
                    (None, Some(end)) => format!("until {end}"),
                    (None, None) => String::new(),
                },
            };
            vec![text]
        }
    }
}
