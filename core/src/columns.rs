//! Column metadata for list views and the column settings dialog.

use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeDefinition, DataType};
use crate::registry::{FieldType, ListTypeDescriptor};
use crate::sort::ColumnId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub value: ColumnId,
    pub label: String,
    pub data_type: FieldType,
    pub is_custom: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrangedColumn {
    #[serde(flatten)]
    pub column: ColumnInfo,
    pub checked: bool,
}

/// Standard fields in registry order, then the given attributes ordered by name.
pub fn available_columns(list: &ListTypeDescriptor, attributes: &[AttributeDefinition]) -> Vec<ColumnInfo> {
    let mut columns: Vec<ColumnInfo> = list
        .fields
        .iter()
        .map(|field| ColumnInfo { value: ColumnId::Field(field.name.clone()), label: field.label.clone(), data_type: field.field_type, is_custom: false })
        .collect();

    let mut custom: Vec<&AttributeDefinition> = attributes.iter().filter(|a| &a.entity_type == list.entity_type()).collect();
    custom.sort_by(|a, b| a.name.cmp(&b.name));
    columns.extend(custom.into_iter().map(|attribute| ColumnInfo {
        value: ColumnId::Attribute(attribute.id),
        label: attribute.name.clone(),
        data_type: match attribute.data_type {
            DataType::Enum => FieldType::Enum,
            DataType::Date => FieldType::Date,
        },
        is_custom: true,
    }));
    columns
}

/// Visible columns first in their saved order, then the remaining available ones.
/// Saved columns that are no longer available are skipped.
pub fn arrange_columns(available: &[ColumnInfo], visible: &[ColumnId]) -> Vec<ArrangedColumn> {
    let mut arranged: Vec<ArrangedColumn> = visible_columns(available, visible).into_iter().map(|column| ArrangedColumn { column, checked: true }).collect();
    arranged.extend(available.iter().filter(|c| !visible.contains(&c.value)).map(|c| ArrangedColumn { column: c.clone(), checked: false }));
    arranged
}

/// Metadata of the visible columns, in saved order.
pub fn visible_columns(available: &[ColumnInfo], visible: &[ColumnId]) -> Vec<ColumnInfo> {
    let mut out: Vec<ColumnInfo> = Vec::with_capacity(visible.len());
    for id in visible {
        if out.iter().any(|c| &c.value == id) {
            continue;
        }
        match available.iter().find(|c| &c.value == id) {
            Some(column) => out.push(column.clone()),
            None => tracing::debug!("Skipping unavailable column {}", id),
        }
    }
    out
}
