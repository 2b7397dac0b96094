use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::AttributeId;

/// A list column: either a fixed field of the base entity or a custom attribute.
///
/// The string form is the field name, or the hyphenated attribute id. Parsing tries the UUID form
/// first, so a field can never be mistaken for an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnId {
    Field(String),
    Attribute(AttributeId),
}

impl ColumnId {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match value.parse::<AttributeId>() {
            Ok(id) => Some(ColumnId::Attribute(id)),
            Err(_) => Some(ColumnId::Field(value.to_owned())),
        }
    }

    pub fn field(name: impl Into<String>) -> Self { ColumnId::Field(name.into()) }

    pub fn as_attribute(&self) -> Option<AttributeId> {
        match self {
            ColumnId::Attribute(id) => Some(*id),
            ColumnId::Field(_) => None,
        }
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            ColumnId::Field(name) => Some(name),
            ColumnId::Attribute(_) => None,
        }
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnId::Field(name) => f.write_str(name),
            ColumnId::Attribute(id) => id.fmt(f),
        }
    }
}

impl TryFrom<String> for ColumnId {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> { ColumnId::parse(&value).ok_or_else(|| "empty column identifier".to_owned()) }
}

impl From<ColumnId> for String {
    fn from(column: ColumnId) -> Self { column.to_string() }
}

impl From<AttributeId> for ColumnId {
    fn from(id: AttributeId) -> Self { ColumnId::Attribute(id) }
}

/// Sort specifier: a column, descending when written with a leading `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SortSpec {
    pub column: ColumnId,
    pub descending: bool,
}

impl SortSpec {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (descending, column) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        Some(SortSpec { column: ColumnId::parse(column)?, descending })
    }

    pub fn asc(column: impl Into<ColumnId>) -> Self { SortSpec { column: column.into(), descending: false } }

    pub fn desc(column: impl Into<ColumnId>) -> Self { SortSpec { column: column.into(), descending: true } }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            f.write_str("-")?;
        }
        self.column.fmt(f)
    }
}

impl TryFrom<String> for SortSpec {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> { SortSpec::parse(&value).ok_or_else(|| format!("invalid sort specifier: {value:?}")) }
}

impl From<SortSpec> for String {
    fn from(sort: SortSpec) -> Self { sort.to_string() }
}

impl From<&str> for ColumnId {
    fn from(value: &str) -> Self { ColumnId::parse(value).unwrap_or_else(|| ColumnId::Field(value.to_owned())) }
}
