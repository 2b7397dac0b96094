use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self { Self(Uuid::new_v4()) }

            pub fn from_uuid(uuid: Uuid) -> Self { Self(uuid) }

            pub fn as_uuid(&self) -> &Uuid { &self.0 }
        }

        impl Default for $name {
            fn default() -> Self { Self::new() }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.hyphenated().fmt(f) }
        }

        impl FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self { Self(uuid) }
        }
    };
}

uuid_id!(
    /// Tenant identifier. Every catalog lookup and list query is scoped by one.
    OrganizationId
);
uuid_id!(UserId);
uuid_id!(
    /// Identifier of a custom attribute definition. Rendered as a hyphenated UUID wherever it is
    /// used as a column identifier or filter-document key.
    AttributeId
);
uuid_id!(OptionId);
uuid_id!(ValueId);
uuid_id!(PreferenceId);
uuid_id!(
    /// Identifier of a base entity row (an encounter, a patient, ...).
    EntityId
);

/// Name of an entity type as registered in the [`crate::registry::ListTypeRegistry`],
/// e.g. `encounter` or `patient`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self { Self(s.to_owned()) }
}

/// Explicit polymorphic reference to a base entity. Lookups always filter on both parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<EntityType>, entity_id: EntityId) -> Self { Self { entity_type: entity_type.into(), entity_id } }
}

/// Name of a list view, e.g. `encounter_list`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListType(String);

impl ListType {
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ListType {
    fn from(s: &str) -> Self { Self(s.to_owned()) }
}
