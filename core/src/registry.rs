//! Data-driven description of list views: which entity a list shows, which fixed fields it has
//! and how each field is stored. The validator, the compiler and the column metadata all read
//! from here, so a field that is not registered can never reach a query.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::annotation::ANNOTATION_PREFIX;
use crate::codec::RESERVED_SUFFIXES;
use crate::error::RegistryError;
use crate::filter::{FilterDocument, FilterSpec};
use crate::ids::{EntityType, ListType};
use crate::sort::{ColumnId, SortSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Date,
    Boolean,
    Enum,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::Enum => "enum",
        }
    }
}

/// Where a field's value lives relative to the base row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSource {
    /// A column of the base table.
    Column(String),
    /// A column of a table the base row references through `foreign_key`; the related table is
    /// keyed by `id`.
    Related { table: String, foreign_key: String, column: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self { Self { value: value.into(), label: label.into() } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub source: FieldSource,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl FieldDescriptor {
    /// A field stored in the base table column of the same name.
    pub fn new(name: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self { source: FieldSource::Column(name.clone()), name, label: label.into(), field_type, choices: Vec::new() }
    }

    pub fn related(mut self, table: impl Into<String>, foreign_key: impl Into<String>, column: impl Into<String>) -> Self {
        self.source = FieldSource::Related { table: table.into(), foreign_key: foreign_key.into(), column: column.into() };
        self
    }

    pub fn with_choices<I>(mut self, choices: I) -> Self
    where I: IntoIterator<Item = (&'static str, &'static str)> {
        self.choices = choices.into_iter().map(|(value, label)| Choice::new(value, label)).collect();
        self
    }

    pub fn choice_label(&self, value: &str) -> Option<&str> {
        match self.field_type {
            FieldType::Boolean => {
                let flag = parse_bool(value)?;
                self.choices.iter().find(|c| parse_bool(&c.value) == Some(flag)).map(|c| c.label.as_str())
            }
            _ => self.choices.iter().find(|c| c.value == value).map(|c| c.label.as_str()),
        }
    }
}

/// How an entity type is stored: its base table and the columns every query needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub entity_type: EntityType,
    pub table: String,
    pub id_column: String,
    pub organization_column: String,
}

impl EntityDescriptor {
    pub fn new(entity_type: impl Into<EntityType>, table: impl Into<String>) -> Self {
        Self { entity_type: entity_type.into(), table: table.into(), id_column: "id".to_owned(), organization_column: "organization_id".to_owned() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTypeDescriptor {
    pub list_type: ListType,
    pub label: String,
    pub entity: EntityDescriptor,
    pub fields: Vec<FieldDescriptor>,
    /// Falls back to the configured default sort when absent.
    #[serde(default)]
    pub default_sort: Option<SortSpec>,
    /// Filters of the system default preference.
    #[serde(default)]
    pub default_filters: FilterDocument,
}

impl ListTypeDescriptor {
    pub fn new(list_type: impl Into<ListType>, label: impl Into<String>, entity: EntityDescriptor) -> Self {
        Self {
            list_type: list_type.into(),
            label: label.into(),
            entity,
            fields: Vec::new(),
            default_sort: None,
            default_filters: FilterDocument::default(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_default_sort(mut self, sort: SortSpec) -> Self {
        self.default_sort = Some(sort);
        self
    }

    pub fn with_default_filters(mut self, filters: FilterDocument) -> Self {
        self.default_filters = filters;
        self
    }

    pub fn entity_type(&self) -> &EntityType { &self.entity.entity_type }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> { self.fields.iter().find(|f| f.name == name) }

    /// All standard columns, in registry order.
    pub fn standard_columns(&self) -> Vec<ColumnId> { self.fields.iter().map(|f| ColumnId::Field(f.name.clone())).collect() }

    fn check(&self) -> Result<(), RegistryError> {
        for name in [self.list_type.as_str(), self.entity.entity_type.as_str()] {
            if !sane_name(name) {
                return Err(RegistryError::InvalidIdentifier(name.to_owned()));
            }
        }
        for name in [&self.entity.table, &self.entity.id_column, &self.entity.organization_column] {
            if !sane_name(name) {
                return Err(RegistryError::InvalidIdentifier(name.clone()));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !sane_name(&field.name) {
                return Err(RegistryError::InvalidIdentifier(field.name.clone()));
            }
            if is_reserved_field_name(&field.name) {
                return Err(RegistryError::ReservedName(field.name.clone()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(RegistryError::DuplicateField(field.name.clone()));
            }
            let columns: Vec<&String> = match &field.source {
                FieldSource::Column(column) => vec![column],
                FieldSource::Related { table, foreign_key, column } => vec![table, foreign_key, column],
            };
            if let Some(bad) = columns.into_iter().find(|c| !sane_name(c)) {
                return Err(RegistryError::InvalidIdentifier(bad.clone()));
            }
        }

        if let Some(sort) = &self.default_sort {
            match &sort.column {
                ColumnId::Field(name) if self.field(name).is_some() => {}
                column => return Err(RegistryError::InvalidDefaultSort(column.to_string())),
            }
        }
        Ok(())
    }
}

/// Field names that would collide with annotation aliases or be misread by the URL codec.
fn is_reserved_field_name(name: &str) -> bool {
    name.starts_with(ANNOTATION_PREFIX) || name == "mode" || RESERVED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Identifiers that are safe to splice into SQL after quoting: ASCII alphanumerics and `_`, not
/// starting with a digit.
pub fn sane_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Parses the boolean spellings accepted for boolean fields.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListTypeRegistry {
    lists: IndexMap<ListType, ListTypeDescriptor>,
}

impl ListTypeRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register(&mut self, list: ListTypeDescriptor) -> Result<(), RegistryError> {
        list.check()?;
        if self.lists.contains_key(&list.list_type) {
            return Err(RegistryError::DuplicateListType(list.list_type.clone()));
        }
        if let Some(entity) = self.entity(list.entity_type()) {
            if *entity != list.entity {
                return Err(RegistryError::ConflictingEntity(list.entity.entity_type.clone()));
            }
        }
        tracing::debug!("Registered list type {} over {}", list.list_type, list.entity.table);
        self.lists.insert(list.list_type.clone(), list);
        Ok(())
    }

    pub fn get(&self, list_type: &ListType) -> Option<&ListTypeDescriptor> { self.lists.get(list_type) }

    pub fn entity(&self, entity_type: &EntityType) -> Option<&EntityDescriptor> {
        self.lists.values().map(|l| &l.entity).find(|e| &e.entity_type == entity_type)
    }

    pub fn list_types(&self) -> impl Iterator<Item = &ListTypeDescriptor> { self.lists.values() }

    /// The encounter and patient lists.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for list in [encounter_list(), patient_list()] {
            // builtin descriptors are well formed
            if let Err(e) = registry.register(list) {
                tracing::error!("Builtin list type rejected: {}", e);
            }
        }
        registry
    }
}

pub const ENCOUNTER_STATUS_CHOICES: [(&str, &str); 9] = [
    ("planned", "Planned"),
    ("in-progress", "In Progress"),
    ("on-hold", "On Hold"),
    ("discharged", "Discharged"),
    ("completed", "Completed"),
    ("cancelled", "Cancelled"),
    ("discontinued", "Discontinued"),
    ("entered-in-error", "Entered in Error"),
    ("unknown", "Unknown"),
];

fn encounter_list() -> ListTypeDescriptor {
    ListTypeDescriptor::new("encounter_list", "Encounters", EntityDescriptor::new("encounter", "encounter"))
        .with_field(FieldDescriptor::new("patient__first_name", "Patient Name", FieldType::Text).related("patient", "patient_id", "first_name"))
        .with_field(FieldDescriptor::new("patient__email", "Email", FieldType::Text).related("patient", "patient_id", "email"))
        .with_field(FieldDescriptor::new("patient__date_of_birth", "Date of Birth", FieldType::Date).related("patient", "patient_id", "date_of_birth"))
        .with_field(FieldDescriptor::new("is_active", "Active", FieldType::Boolean).with_choices([("true", "Active"), ("false", "Archived")]))
        .with_field(FieldDescriptor::new("status", "Status", FieldType::Enum).with_choices(ENCOUNTER_STATUS_CHOICES))
        .with_field(FieldDescriptor::new("created_at", "Created", FieldType::Date))
        .with_field(FieldDescriptor::new("updated_at", "Last Updated", FieldType::Date))
        .with_default_filters(FilterDocument::new().with_field("is_active", FilterSpec::exact("true")))
}

fn patient_list() -> ListTypeDescriptor {
    ListTypeDescriptor::new("patient_list", "Patients", EntityDescriptor::new("patient", "patient"))
        .with_field(FieldDescriptor::new("first_name", "Name", FieldType::Text))
        .with_field(FieldDescriptor::new("email", "Email", FieldType::Text))
        .with_field(FieldDescriptor::new("date_of_birth", "Date of Birth", FieldType::Date))
        .with_field(FieldDescriptor::new("created_at", "Created", FieldType::Date))
        .with_field(FieldDescriptor::new("updated_at", "Last Updated", FieldType::Date))
}
