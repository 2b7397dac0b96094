//! Naming of computed attribute columns.
//!
//! Every attribute id maps to exactly one alias: a fixed prefix followed by the hyphen-free UUID.
//! Registered field names may not start with the prefix, so an alias can never shadow a field.

use uuid::Uuid;

use crate::ids::AttributeId;

pub const ANNOTATION_PREFIX: &str = "attr_";

/// The attribute id with `-` replaced by `_`. Used for annotation aliases and URL keys.
pub fn underscored(id: AttributeId) -> String { id.to_string().replace('-', "_") }

/// Inverse of [`underscored`].
pub fn parse_underscored(value: &str) -> Option<AttributeId> {
    if value.len() != 36 {
        return None;
    }
    Uuid::parse_str(&value.replace('_', "-")).ok().map(AttributeId::from_uuid)
}

pub fn annotation_name(id: AttributeId) -> String { format!("{ANNOTATION_PREFIX}{}", underscored(id)) }

pub fn attribute_for_annotation(name: &str) -> Option<AttributeId> { name.strip_prefix(ANNOTATION_PREFIX).and_then(parse_underscored) }
