//! One list request end to end: preference resolution, filter source selection, cleaning,
//! compilation and pagination. Also the write paths of the list settings.

use serde::Serialize;
use tabula_core::codec::{self, FilterMode, QueryParams, PAGE_KEY, SORT_KEY};
use tabula_core::columns::{arrange_columns, available_columns, visible_columns, ArrangedColumn, ColumnInfo};
use tabula_core::display::{describe_filters, FilterChip};
use tabula_core::error::ListError;
use tabula_core::ids::{ListType, OrganizationId, UserId};
use tabula_core::pagination::{Page, PageRequest};
use tabula_core::validation::{clean_with, validate_sort, validate_with};
use tabula_core::{CatalogSnapshot, ColumnId, FilterDocument, PreferenceStore, PreferenceUpdate, ResolvedPreference, SortSpec, StoredPreference};
use tracing::{debug, info};

use crate::annotation::ensure_annotated;
use crate::compiler::{compile_filters, compile_sort};
use crate::engine::SqliteStorage;
use crate::query::ListRow;

#[derive(Debug, Clone)]
pub struct ListRequest {
    pub organization: OrganizationId,
    pub user: Option<UserId>,
    pub list_type: ListType,
    pub params: QueryParams,
}

impl ListRequest {
    pub fn new(organization: OrganizationId, user: Option<UserId>, list_type: impl Into<ListType>, params: QueryParams) -> Self {
        Self { organization, user, list_type: list_type.into(), params }
    }
}

/// Where the filters of a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterSource {
    Url,
    Saved,
}

#[derive(Debug, Clone)]
pub struct ListView {
    pub preference: ResolvedPreference,
    /// Filters actually applied, after cleaning
    pub filters: FilterDocument,
    pub filter_source: FilterSource,
    pub has_unsaved_filters: bool,
    /// Query string that shows the saved filters in the URL, when the request had none
    pub canonical_params: Option<QueryParams>,
    pub sort: SortSpec,
    pub columns: Vec<ColumnInfo>,
    /// Every available column for the settings dialog, visible ones first
    pub column_settings: Vec<ArrangedColumn>,
    pub filter_chips: Vec<FilterChip>,
    pub page: Page<ListRow>,
}

impl SqliteStorage {
    pub async fn list(&self, request: &ListRequest) -> Result<ListView, ListError> {
        let list = self.list_type(&request.list_type)?;
        let resolved = self.resolve(request.user, request.organization, &request.list_type).await?;
        let preference = resolved.preference();
        let mut query = self.query(request.organization, &request.list_type).await?;

        let params = &request.params;
        let (raw, filter_source) = if params.has_filters() || FilterMode::from_params(params) == FilterMode::Custom {
            (codec::decode(params), FilterSource::Url)
        } else {
            (preference.saved_filters.clone(), FilterSource::Saved)
        };
        let filters = clean_with(&raw, list, query.catalog());

        let sort = [params.get(SORT_KEY).and_then(SortSpec::parse), preference.default_sort.clone()]
            .into_iter()
            .flatten()
            .find(|sort| validate_sort(sort, list, query.catalog()))
            .unwrap_or_else(|| list.default_sort.clone().unwrap_or_else(|| self.config().list.default_sort.clone()));

        let per_page = preference.items_per_page.clamp(1, self.config().list.max_items_per_page);
        let page = PageRequest::from_param(params.get(PAGE_KEY), per_page);

        let attributes: Vec<_> = query.catalog().attributes().cloned().collect();
        let available = available_columns(list, &attributes);
        let columns = visible_columns(&available, &preference.visible_columns);
        let column_settings = arrange_columns(&available, &preference.visible_columns);

        query.select_fields(columns.iter().filter_map(|c| c.value.as_field()));
        ensure_annotated(&mut query, columns.iter().filter_map(|c| c.value.as_attribute()));
        compile_filters(&mut query, &filters);
        compile_sort(&mut query, &sort);

        let page = self.fetch_page(&query, page).await?;
        debug!("Listed {} of {} {} rows ({:?} filters, sort {})", page.items.len(), page.total, list.list_type, filter_source, sort);

        Ok(ListView {
            filter_chips: describe_filters(&filters, list, query.catalog()),
            has_unsaved_filters: codec::has_unsaved_filters(params, &preference.saved_filters),
            canonical_params: codec::canonical_params_with_saved_filters(params, &preference.saved_filters),
            preference: resolved,
            filters,
            filter_source,
            sort,
            columns,
            column_settings,
            page,
        })
    }

    /// Store the filters of `params` on the user's preference, creating it from the resolved one
    /// when the user has none yet. Invalid filters are rejected, not cleaned.
    pub async fn save_current_filters(
        &self,
        user: UserId,
        organization: OrganizationId,
        list_type: &ListType,
        params: &QueryParams,
    ) -> Result<StoredPreference, ListError> {
        let list = self.list_type(list_type)?;
        let catalog = CatalogSnapshot::load(self, organization, list.entity_type()).await?;
        let filters = codec::decode_as_written(params);
        validate_with(&filters, list, &catalog)?;

        let stored = match self.resolve(Some(user), organization, list_type).await? {
            ResolvedPreference::User(stored) => stored,
            inherited => {
                debug!("Materializing a preference of user {} for {} before saving filters", user, list_type);
                self.save(organization, list_type, Some(user), PreferenceUpdate::from(inherited.preference())).await?
            }
        };
        let stored = self.save_filters(&stored, filters).await?;
        info!("User {} saved {} filters for {}", user, stored.preference.saved_filters.len(), list_type);
        Ok(stored)
    }

    /// Validate and store columns, sort and page size. Saved filters are cleaned rather than rejected.
    pub async fn save_preferences(
        &self,
        user: Option<UserId>,
        organization: OrganizationId,
        list_type: &ListType,
        update: PreferenceUpdate,
    ) -> Result<StoredPreference, ListError> {
        let list = self.list_type(list_type)?;
        let catalog = CatalogSnapshot::load(self, organization, list.entity_type()).await?;

        let attributes: Vec<_> = catalog.attributes().cloned().collect();
        let available = available_columns(list, &attributes);
        if let Some(column) = update.visible_columns.iter().find(|c| !available.iter().any(|a| &a.value == *c)) {
            return Err(ListError::InvalidColumn(column.to_string()));
        }
        if let Some(sort) = &update.default_sort {
            if !validate_sort(sort, list, &catalog) {
                return Err(ListError::InvalidSort(sort.to_string()));
            }
        }
        let max = self.config().list.max_items_per_page;
        if !(1..=max).contains(&update.items_per_page) {
            return Err(ListError::InvalidPageSize { given: update.items_per_page, max });
        }

        let mut visible: Vec<ColumnId> = Vec::with_capacity(update.visible_columns.len());
        for column in update.visible_columns {
            if !visible.contains(&column) {
                visible.push(column);
            }
        }
        let update = PreferenceUpdate { visible_columns: visible, saved_filters: clean_with(&update.saved_filters, list, &catalog), ..update };
        Ok(self.save(organization, list_type, user, update).await?)
    }

    /// Drop the stored preference so the next level of the fallback applies
    pub async fn reset_preferences(&self, user: Option<UserId>, organization: OrganizationId, list_type: &ListType) -> Result<bool, ListError> {
        self.list_type(list_type)?;
        Ok(self.reset(organization, list_type, user).await?)
    }
}
