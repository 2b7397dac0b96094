use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AttributeId, EntityRef, EntityType, OptionId, OrganizationId, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Enum,
    Date,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Enum => "enum",
            DataType::Date => "date",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for DataType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enum" => Ok(DataType::Enum),
            "date" => Ok(DataType::Date),
            other => Err(format!("unknown data type {other:?}")),
        }
    }
}

/// A tenant-defined field attachable to entities of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub id: AttributeId,
    pub organization_id: OrganizationId,
    pub entity_type: EntityType,
    pub name: String,
    pub data_type: DataType,
    pub is_multi: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One enumerated choice of an ENUM attribute. `value` is the stable machine key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeOption {
    pub id: OptionId,
    pub attribute_id: AttributeId,
    pub label: String,
    pub value: String,
    pub color_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypedValue {
    Date(NaiveDate),
    Option(OptionId),
}

impl TypedValue {
    pub fn data_type(&self) -> DataType {
        match self {
            TypedValue::Date(_) => DataType::Date,
            TypedValue::Option(_) => DataType::Enum,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub id: ValueId,
    pub attribute_id: AttributeId,
    pub entity: EntityRef,
    pub value: TypedValue,
}

/// A value as written by callers: dates directly, options by their value key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeInput {
    Date(NaiveDate),
    Option(String),
}

impl AttributeInput {
    pub fn option(value: impl Into<String>) -> Self { AttributeInput::Option(value.into()) }

    pub fn data_type(&self) -> DataType {
        match self {
            AttributeInput::Date(_) => DataType::Date,
            AttributeInput::Option(_) => DataType::Enum,
        }
    }
}

/// Administrator input for a new attribute definition.
#[derive(Debug, Clone)]
pub struct NewAttribute {
    pub entity_type: EntityType,
    pub name: String,
    pub data_type: DataType,
    pub is_multi: bool,
}

impl NewAttribute {
    pub fn new(entity_type: impl Into<EntityType>, name: impl Into<String>, data_type: DataType) -> Self {
        Self { entity_type: entity_type.into(), name: name.into(), data_type, is_multi: false }
    }

    pub fn multi(mut self) -> Self {
        self.is_multi = true;
        self
    }
}

/// Administrator input for a new enum option.
#[derive(Debug, Clone)]
pub struct NewOption {
    pub label: String,
    pub value: String,
    pub color_code: Option<String>,
}

impl NewOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self { Self { label: label.into(), value: value.into(), color_code: None } }

    pub fn color(mut self, color_code: impl Into<String>) -> Self {
        self.color_code = Some(color_code.into());
        self
    }
}
