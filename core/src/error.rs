use thiserror::Error;

use crate::attribute::DataType;
use crate::ids::{AttributeId, EntityId, EntityType, ListType};
use crate::validation::ValidationErrors;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for read paths. Absence is never an error here: lookups return `Option`.
///
/// Returned from: `Catalog` lookups, `PreferenceStore::resolve`
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The backing store failed
    #[error("storage error: {0}")]
    StorageError(BoxError),

    /// A persisted row could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("unknown list type {0}")]
    UnknownListType(ListType),
}

impl RetrievalError {
    pub fn storage(err: impl Into<BoxError>) -> Self { RetrievalError::StorageError(err.into()) }
}

/// Error type for write paths.
///
/// Returned from: the attribute value store, `PreferenceStore::save`, `reset`, `save_filters`
#[derive(Debug, Error)]
pub enum MutationError {
    /// The attribute does not exist in the caller's organization and entity type
    #[error("attribute {0} not found")]
    UnknownAttribute(AttributeId),

    /// The value's type does not match the attribute's data type
    #[error("attribute {attribute} holds {expected} values")]
    DataTypeMismatch { attribute: AttributeId, expected: DataType },

    /// The option key is not defined for the attribute
    #[error("unknown option {value:?} for attribute {attribute}")]
    UnknownOption { attribute: AttributeId, value: String },

    /// A second value was written to a single-valued attribute
    #[error("attribute {0} is single-valued")]
    SingleValueViolation(AttributeId),

    /// The target entity does not exist in the attribute's organization
    #[error("{entity_type} {entity_id} not found in organization")]
    EntityNotInOrganization { entity_type: EntityType, entity_id: EntityId },

    /// The entity type has no registered base table
    #[error("entity type {0} is not registered")]
    UnknownEntityType(EntityType),

    /// An option with the same value already exists on the attribute
    #[error("duplicate option value {0:?}")]
    DuplicateOption(String),

    /// The persisted preference row no longer exists
    #[error("preference not found")]
    PreferenceNotFound,

    /// The backing store failed
    #[error("storage error: {0}")]
    StorageError(BoxError),
}

impl MutationError {
    pub fn storage(err: impl Into<BoxError>) -> Self { MutationError::StorageError(err.into()) }
}

/// Error type for list-level operations.
///
/// Returned from: the list service (`list`, `save_current_filters`, `save_preferences`, `reset_preferences`)
#[derive(Debug, Error)]
pub enum ListError {
    #[error("unknown list type {0}")]
    UnknownListType(ListType),

    /// Strict validation failed; carries every problem found
    #[error("invalid filters: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("column {0} is not available")]
    InvalidColumn(String),

    #[error("cannot sort by {0}")]
    InvalidSort(String),

    #[error("items per page must be between 1 and {max}, got {given}")]
    InvalidPageSize { given: u32, max: u32 },

    /// A compiled query returned a different number of rows than there are distinct entities
    #[error("result cardinality violated: {0}")]
    Cardinality(String),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Mutation(#[from] MutationError),
}

/// Rejected list-type registrations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    /// Field names may not shadow annotation names or URL key suffixes
    #[error("field name {0:?} is reserved")]
    ReservedName(String),

    #[error("duplicate field {0:?}")]
    DuplicateField(String),

    #[error("list type {0} already registered")]
    DuplicateListType(ListType),

    #[error("entity type {0} is already registered with a different table")]
    ConflictingEntity(EntityType),

    #[error("default sort {0:?} does not name a field of the list")]
    InvalidDefaultSort(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
