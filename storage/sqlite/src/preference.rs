//! Persisted list preferences.
//!
//! One row per (user, organization, list type) and one organization default per (organization, list
//! type), each guarded by a partial unique index. Writes are single-statement upserts against that
//! index, so concurrent saves of the same key converge on one row.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tabula_core::error::{MutationError, RetrievalError};
use tabula_core::filter::FilterDocument;
use tabula_core::ids::{ListType, OrganizationId, PreferenceId, UserId};
use tabula_core::preference::{ListPreference, PreferenceStore, PreferenceUpdate, ResolvedPreference, Scope, StoredPreference};
use tabula_core::{ColumnId, SortSpec};
use tracing::{debug, info, warn};

use crate::engine::SqliteStorage;
use crate::error::SqliteError;
use crate::value::{parse_column, timestamp};

const PREFERENCE_COLUMNS: &str = r#""id", "organization_id", "list_type", "scope", "user_id", "visible_columns", "default_sort", "items_per_page", "saved_filters", "created_at", "updated_at""#;

fn preference_from_row(row: &Row<'_>) -> rusqlite::Result<StoredPreference> {
    let scope = match row.get::<_, String>(3)?.as_str() {
        "user" => Scope::User(parse_column(row, 4)?),
        _ => Scope::Organization,
    };
    let visible_columns: String = row.get(5)?;
    let visible_columns = serde_json::from_str::<Vec<ColumnId>>(&visible_columns).unwrap_or_else(|e| {
        warn!("Ignoring unreadable column list {:?}: {}", visible_columns, e);
        Vec::new()
    });
    let default_sort = row.get::<_, Option<String>>(6)?.and_then(|sort| {
        let parsed = SortSpec::parse(&sort);
        if parsed.is_none() {
            warn!("Ignoring unreadable sort {:?}", sort);
        }
        parsed
    });
    let items_per_page: i64 = row.get(7)?;
    let saved_filters: String = row.get(8)?;

    Ok(StoredPreference {
        id: parse_column(row, 0)?,
        preference: ListPreference {
            organization_id: parse_column(row, 1)?,
            list_type: ListType::new(row.get::<_, String>(2)?),
            scope,
            visible_columns,
            default_sort,
            items_per_page: u32::try_from(items_per_page).unwrap_or(0),
            saved_filters: FilterDocument::from_json_lenient(&saved_filters),
        },
        created_at: parse_column(row, 9)?,
        updated_at: parse_column(row, 10)?,
    })
}

fn find_preference(conn: &Connection, organization: OrganizationId, list_type: &ListType, scope: Scope) -> Result<Option<StoredPreference>, SqliteError> {
    let sql = format!(
        r#"SELECT {PREFERENCE_COLUMNS} FROM "list_preference" WHERE "organization_id" = ? AND "list_type" = ? AND "scope" = ? AND "user_id" IS ?"#
    );
    let user = scope.user().map(|u| u.to_string());
    Ok(conn.query_row(&sql, params![organization.to_string(), list_type.as_str(), scope.as_str(), user], preference_from_row).optional()?)
}

/// `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` against the partial unique index of the scope
fn upsert_preference(conn: &Connection, preference: &ListPreference) -> Result<StoredPreference, SqliteError> {
    let conflict_target = match preference.scope {
        Scope::User(_) => r#"("user_id", "organization_id", "list_type") WHERE "scope" = 'user'"#,
        Scope::Organization => r#"("organization_id", "list_type") WHERE "scope" = 'organization'"#,
    };
    let sql = format!(
        r#"INSERT INTO "list_preference"({PREFERENCE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT{conflict_target} DO UPDATE SET
               "visible_columns" = excluded."visible_columns",
               "default_sort" = excluded."default_sort",
               "items_per_page" = excluded."items_per_page",
               "saved_filters" = excluded."saved_filters",
               "updated_at" = excluded."updated_at"
           RETURNING {PREFERENCE_COLUMNS}"#
    );
    let now = timestamp(Utc::now());
    let row = conn.query_row(
        &sql,
        params![
            PreferenceId::new().to_string(),
            preference.organization_id.to_string(),
            preference.list_type.as_str(),
            preference.scope.as_str(),
            preference.scope.user().map(|u| u.to_string()),
            serde_json::to_string(&preference.visible_columns)?,
            preference.default_sort.as_ref().map(|s| s.to_string()),
            preference.items_per_page,
            serde_json::to_string(&preference.saved_filters)?,
            now,
            now
        ],
        preference_from_row,
    )?;
    Ok(row)
}

#[async_trait]
impl PreferenceStore for SqliteStorage {
    async fn resolve(&self, user: Option<UserId>, organization: OrganizationId, list_type: &ListType) -> Result<ResolvedPreference, RetrievalError> {
        let list = self.registry().get(list_type).ok_or_else(|| RetrievalError::UnknownListType(list_type.clone()))?;
        let config = &self.config().list;

        let conn = self.connection().await?;
        let key = list_type.clone();
        let (user_row, organization_row) = conn
            .with_connection(move |c| {
                let user_row = match user {
                    Some(user) => find_preference(c, organization, &key, Scope::User(user))?,
                    None => None,
                };
                let organization_row = match user_row {
                    Some(_) => None,
                    None => find_preference(c, organization, &key, Scope::Organization)?,
                };
                Ok((user_row, organization_row))
            })
            .await?;

        let fill = |mut stored: StoredPreference| {
            stored.preference = stored.preference.fill_defaults(list, config);
            stored
        };
        Ok(match (user_row, organization_row) {
            (Some(stored), _) => {
                debug!("Using preference {} of user for {}", stored.id, list_type);
                ResolvedPreference::User(fill(stored))
            }
            (None, Some(stored)) => {
                debug!("Using organization default {} for {}", stored.id, list_type);
                ResolvedPreference::Organization(fill(stored))
            }
            (None, None) => {
                debug!("No stored preference for {}; using the system default", list_type);
                ResolvedPreference::SystemDefault(ListPreference::system_default(organization, Scope::for_user(user), list, config))
            }
        })
    }

    async fn save(
        &self,
        organization: OrganizationId,
        list_type: &ListType,
        user: Option<UserId>,
        update: PreferenceUpdate,
    ) -> Result<StoredPreference, MutationError> {
        let preference = ListPreference {
            organization_id: organization,
            list_type: list_type.clone(),
            scope: Scope::for_user(user),
            visible_columns: update.visible_columns,
            default_sort: update.default_sort,
            items_per_page: update.items_per_page,
            saved_filters: update.saved_filters,
        };

        let attempts = self.config().save_retries.max(1);
        let mut attempt = 1;
        let stored = loop {
            let conn = self.connection().await?;
            let row = preference.clone();
            match conn.with_connection(move |c| upsert_preference(c, &row)).await {
                Ok(stored) => break stored,
                Err(e) if e.is_busy() && attempt < attempts => {
                    warn!("Preference save for {} hit a locked database (attempt {}/{}): {}", list_type, attempt, attempts, e);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };
        info!("Saved {} preference {} for {}", stored.preference.scope.as_str(), stored.id, list_type);
        Ok(stored)
    }

    async fn reset(&self, organization: OrganizationId, list_type: &ListType, user: Option<UserId>) -> Result<bool, MutationError> {
        let scope = Scope::for_user(user);
        let conn = self.connection().await?;
        let key = list_type.clone();
        let deleted = conn
            .with_connection(move |c| {
                let deleted = c.execute(
                    r#"DELETE FROM "list_preference" WHERE "organization_id" = ? AND "list_type" = ? AND "scope" = ? AND "user_id" IS ?"#,
                    params![organization.to_string(), key.as_str(), scope.as_str(), scope.user().map(|u| u.to_string())],
                )?;
                Ok(deleted > 0)
            })
            .await?;
        info!("Reset {} preference for {}: {}", scope.as_str(), list_type, if deleted { "deleted" } else { "nothing stored" });
        Ok(deleted)
    }

    async fn save_filters(&self, preference: &StoredPreference, filters: FilterDocument) -> Result<StoredPreference, MutationError> {
        let id = preference.id;
        let filters = serde_json::to_string(&filters).map_err(SqliteError::from)?;
        let conn = self.connection().await?;
        let stored = conn
            .with_connection(move |c| {
                let sql = format!(r#"UPDATE "list_preference" SET "saved_filters" = ?, "updated_at" = ? WHERE "id" = ? RETURNING {PREFERENCE_COLUMNS}"#);
                Ok(c.query_row(&sql, params![filters, timestamp(Utc::now()), id.to_string()], preference_from_row).optional()?)
            })
            .await?
            .ok_or(MutationError::PreferenceNotFound)?;
        info!("Saved {} filters on preference {}", stored.preference.saved_filters.len(), stored.id);
        Ok(stored)
    }
}
