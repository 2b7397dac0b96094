use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::attribute::{AttributeDefinition, AttributeOption, DataType};
use crate::error::RetrievalError;
use crate::ids::{AttributeId, EntityType, OrganizationId};

/// Read model over attribute definitions and their options.
///
/// Every lookup is scoped by organization AND entity type: an attribute of another tenant or bound
/// to another entity type is invisible even when its id is known.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_attributes(&self, organization: OrganizationId, entity_type: &EntityType) -> Result<Vec<AttributeDefinition>, RetrievalError>;

    async fn get_attribute(
        &self,
        organization: OrganizationId,
        entity_type: &EntityType,
        id: AttributeId,
    ) -> Result<Option<AttributeDefinition>, RetrievalError>;

    /// Options of an ENUM attribute, ordered by label. Empty for DATE attributes.
    async fn list_options(&self, attribute: &AttributeDefinition) -> Result<Vec<AttributeOption>, RetrievalError>;
}

/// All attributes (and their options) visible in one (organization, entity type) scope, loaded
/// once per request so validation, compilation and display agree on the same view.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    attributes: IndexMap<AttributeId, AttributeDefinition>,
    options: HashMap<AttributeId, Vec<AttributeOption>>,
}

impl CatalogSnapshot {
    pub async fn load<C: Catalog + ?Sized>(catalog: &C, organization: OrganizationId, entity_type: &EntityType) -> Result<Self, RetrievalError> {
        let mut snapshot = Self::default();
        for attribute in catalog.list_attributes(organization, entity_type).await? {
            if attribute.data_type == DataType::Enum {
                let options = catalog.list_options(&attribute).await?;
                snapshot.options.insert(attribute.id, options);
            }
            snapshot.attributes.insert(attribute.id, attribute);
        }
        tracing::debug!("Loaded {} attributes for {} in {}", snapshot.attributes.len(), entity_type, organization);
        Ok(snapshot)
    }

    pub fn from_parts(attributes: Vec<AttributeDefinition>, options: Vec<AttributeOption>) -> Self {
        let mut snapshot = Self { attributes: attributes.into_iter().map(|a| (a.id, a)).collect(), options: HashMap::new() };
        for option in options {
            snapshot.options.entry(option.attribute_id).or_default().push(option);
        }
        snapshot
    }

    pub fn attribute(&self, id: AttributeId) -> Option<&AttributeDefinition> { self.attributes.get(&id) }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDefinition> { self.attributes.values() }

    pub fn options(&self, id: AttributeId) -> &[AttributeOption] { self.options.get(&id).map(Vec::as_slice).unwrap_or(&[]) }

    pub fn option_by_value(&self, id: AttributeId, value: &str) -> Option<&AttributeOption> { self.options(id).iter().find(|o| o.value == value) }

    pub fn is_empty(&self) -> bool { self.attributes.is_empty() }
}

/// In-memory catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    attributes: RwLock<IndexMap<AttributeId, AttributeDefinition>>,
    options: RwLock<Vec<AttributeOption>>,
}

impl MemoryCatalog {
    pub fn new() -> Self { Self::default() }

    pub fn insert_attribute(&self, attribute: AttributeDefinition) {
        self.attributes.write().unwrap_or_else(|e| e.into_inner()).insert(attribute.id, attribute);
    }

    pub fn insert_option(&self, option: AttributeOption) { self.options.write().unwrap_or_else(|e| e.into_inner()).push(option); }

    /// Removes the attribute together with its options.
    pub fn remove_attribute(&self, id: AttributeId) -> bool {
        self.options.write().unwrap_or_else(|e| e.into_inner()).retain(|o| o.attribute_id != id);
        self.attributes.write().unwrap_or_else(|e| e.into_inner()).shift_remove(&id).is_some()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_attributes(&self, organization: OrganizationId, entity_type: &EntityType) -> Result<Vec<AttributeDefinition>, RetrievalError> {
        let attributes = self.attributes.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<AttributeDefinition> =
            attributes.values().filter(|a| a.organization_id == organization && &a.entity_type == entity_type).cloned().collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn get_attribute(
        &self,
        organization: OrganizationId,
        entity_type: &EntityType,
        id: AttributeId,
    ) -> Result<Option<AttributeDefinition>, RetrievalError> {
        let attributes = self.attributes.read().unwrap_or_else(|e| e.into_inner());
        Ok(attributes.get(&id).filter(|a| a.organization_id == organization && &a.entity_type == entity_type).cloned())
    }

    async fn list_options(&self, attribute: &AttributeDefinition) -> Result<Vec<AttributeOption>, RetrievalError> {
        if attribute.data_type != DataType::Enum {
            return Ok(Vec::new());
        }
        let options = self.options.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<AttributeOption> = options.iter().filter(|o| o.attribute_id == attribute.id).cloned().collect();
        found.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(found)
    }
}
