use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ListConfig;
use crate::error::{MutationError, RetrievalError};
use crate::filter::FilterDocument;
use crate::ids::{ListType, OrganizationId, PreferenceId, UserId};
use crate::registry::ListTypeDescriptor;
use crate::sort::{ColumnId, SortSpec};

/// Owner of a preference: one user, or the whole organization as its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    User(UserId),
    Organization,
}

impl Scope {
    pub fn for_user(user: Option<UserId>) -> Self {
        match user {
            Some(user) => Scope::User(user),
            None => Scope::Organization,
        }
    }

    pub fn user(&self) -> Option<UserId> {
        match self {
            Scope::User(user) => Some(*user),
            Scope::Organization => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User(_) => "user",
            Scope::Organization => "organization",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPreference {
    pub organization_id: OrganizationId,
    pub list_type: ListType,
    pub scope: Scope,
    pub visible_columns: Vec<ColumnId>,
    pub default_sort: Option<SortSpec>,
    pub items_per_page: u32,
    pub saved_filters: FilterDocument,
}

impl ListPreference {
    /// The unsaved default for a list: every standard column, the list's (or the configured) sort,
    /// the configured page size and the list's default filters.
    pub fn system_default(organization_id: OrganizationId, scope: Scope, list: &ListTypeDescriptor, config: &ListConfig) -> Self {
        Self {
            organization_id,
            list_type: list.list_type.clone(),
            scope,
            visible_columns: list.standard_columns(),
            default_sort: Some(list.default_sort.clone().unwrap_or_else(|| config.default_sort.clone())),
            items_per_page: config.default_items_per_page,
            saved_filters: list.default_filters.clone(),
        }
    }

    /// Fills an empty column list, a missing sort or a zero page size from the system default.
    /// Nothing is written back.
    pub fn fill_defaults(mut self, list: &ListTypeDescriptor, config: &ListConfig) -> Self {
        if self.visible_columns.is_empty() {
            self.visible_columns = list.standard_columns();
        }
        if self.default_sort.is_none() {
            self.default_sort = Some(list.default_sort.clone().unwrap_or_else(|| config.default_sort.clone()));
        }
        if self.items_per_page == 0 {
            self.items_per_page = config.default_items_per_page;
        }
        self
    }
}

/// A persisted preference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPreference {
    pub id: PreferenceId,
    pub preference: ListPreference,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of the user → organization → system default fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPreference {
    User(StoredPreference),
    Organization(StoredPreference),
    /// Synthesized, never stored. Callers that need a row must `save` it first.
    SystemDefault(ListPreference),
}

impl ResolvedPreference {
    pub fn preference(&self) -> &ListPreference {
        match self {
            ResolvedPreference::User(stored) | ResolvedPreference::Organization(stored) => &stored.preference,
            ResolvedPreference::SystemDefault(preference) => preference,
        }
    }

    pub fn stored(&self) -> Option<&StoredPreference> {
        match self {
            ResolvedPreference::User(stored) | ResolvedPreference::Organization(stored) => Some(stored),
            ResolvedPreference::SystemDefault(_) => None,
        }
    }

    pub fn is_persisted(&self) -> bool { self.stored().is_some() }

    pub fn into_preference(self) -> ListPreference {
        match self {
            ResolvedPreference::User(stored) | ResolvedPreference::Organization(stored) => stored.preference,
            ResolvedPreference::SystemDefault(preference) => preference,
        }
    }
}

/// The mutable part of a preference, as written by `save`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    pub visible_columns: Vec<ColumnId>,
    pub default_sort: Option<SortSpec>,
    pub items_per_page: u32,
    #[serde(default)]
    pub saved_filters: FilterDocument,
}

impl From<&ListPreference> for PreferenceUpdate {
    fn from(preference: &ListPreference) -> Self {
        Self {
            visible_columns: preference.visible_columns.clone(),
            default_sort: preference.default_sort.clone(),
            items_per_page: preference.items_per_page,
            saved_filters: preference.saved_filters.clone(),
        }
    }
}

/// Persisted list preferences with three-level resolution.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Never writes. Absence at every level resolves to the system default; only storage faults
    /// are errors.
    async fn resolve(&self, user: Option<UserId>, organization: OrganizationId, list_type: &ListType) -> Result<ResolvedPreference, RetrievalError>;

    /// Insert-or-update of the row for `user` (or the organization default when `None`).
    async fn save(
        &self,
        organization: OrganizationId,
        list_type: &ListType,
        user: Option<UserId>,
        update: PreferenceUpdate,
    ) -> Result<StoredPreference, MutationError>;

    /// Deletes the matching row. Returns whether one existed.
    async fn reset(&self, organization: OrganizationId, list_type: &ListType, user: Option<UserId>) -> Result<bool, MutationError>;

    /// Replaces only the saved filters of an existing row.
    async fn save_filters(&self, preference: &StoredPreference, filters: FilterDocument) -> Result<StoredPreference, MutationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSpec;
    use crate::registry::ListTypeRegistry;

    #[test]
    fn test_system_default() {
        let registry = ListTypeRegistry::builtin();
        let list = registry.get(&"encounter_list".into()).unwrap();
        let org = OrganizationId::new();
        let preference = ListPreference::system_default(org, Scope::Organization, list, &ListConfig::default());

        assert_eq!(preference.items_per_page, 25);
        assert_eq!(preference.visible_columns.first(), Some(&ColumnId::field("patient__first_name")));
        assert_eq!(preference.visible_columns.len(), 7);
        assert_eq!(preference.default_sort, Some(SortSpec::desc("updated_at")));
        assert_eq!(preference.saved_filters.model_fields.get("is_active"), Some(&FilterSpec::exact("true")));
    }

    #[test]
    fn test_fill_defaults_keeps_saved_values() {
        let registry = ListTypeRegistry::builtin();
        let list = registry.get(&"patient_list".into()).unwrap();
        let user = UserId::new();
        let preference = ListPreference {
            organization_id: OrganizationId::new(),
            list_type: list.list_type.clone(),
            scope: Scope::User(user),
            visible_columns: vec![],
            default_sort: None,
            items_per_page: 50,
            saved_filters: FilterDocument::default(),
        }
        .fill_defaults(list, &ListConfig::default());

        assert_eq!(preference.visible_columns, list.standard_columns());
        assert_eq!(preference.default_sort, Some(SortSpec::desc("updated_at")));
        assert_eq!(preference.items_per_page, 50);
        assert_eq!(preference.scope.user(), Some(user));
    }
}
