//! SQLite list engine

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use rusqlite::params_from_iter;
use tabula_core::error::ListError;
use tabula_core::ids::{EntityId, ListType, OrganizationId};
use tabula_core::pagination::{Page, PageRequest};
use tabula_core::registry::ListTypeDescriptor;
use tabula_core::{CatalogSnapshot, ListTypeRegistry};
use tracing::{debug, error};

use crate::config::SqliteConfig;
use crate::connection::{Location, SqliteConnectionManager};
use crate::error::SqliteError;
use crate::query::{ListQuery, ListRow};
use crate::schema;
use crate::value::SqliteValue;

/// SQLite-backed attribute catalog, value store, preference store and list query executor.
///
/// Base entity tables (`encounter`, `patient`, ...) are owned by their collaborators; this engine
/// only reads them and owns the attribute and preference tables it migrates on open.
pub struct SqliteStorage {
    pool: bb8::Pool<SqliteConnectionManager>,
    registry: Arc<ListTypeRegistry>,
    config: SqliteConfig,
}

impl SqliteStorage {
    /// Wrap an existing pool, creating the engine's tables when missing
    pub async fn new(pool: bb8::Pool<SqliteConnectionManager>, registry: ListTypeRegistry, config: SqliteConfig) -> Result<Self, SqliteError> {
        config.check()?;
        let conn = pool.get().await?;
        conn.with_connection(schema::migrate).await?;
        drop(conn);
        Ok(Self { pool, registry: Arc::new(registry), config })
    }

    /// Open the database named by `config.path`, or an in-memory one when it has none
    pub async fn open(config: SqliteConfig, registry: ListTypeRegistry) -> anyhow::Result<Self> {
        config.check()?;
        let pool = match &config.path {
            Some(path) => {
                let manager = SqliteConnectionManager::new(Location::File(path.clone()), config.busy_timeout());
                bb8::Pool::builder().max_size(config.pool_size).build(manager).await?
            }
            // Each in-memory connection is its own database: one connection, never recycled
            None => bb8::Pool::builder().max_size(1).idle_timeout(None).max_lifetime(None).build(SqliteConnectionManager::memory()).await?,
        };
        Ok(Self::new(pool, registry, config).await?)
    }

    /// Open an in-memory SQLite database (for testing)
    pub async fn open_in_memory(registry: ListTypeRegistry) -> anyhow::Result<Self> { Self::open(SqliteConfig::default(), registry).await }

    /// Get a reference to the connection pool (for testing/diagnostics)
    pub fn pool(&self) -> &bb8::Pool<SqliteConnectionManager> { &self.pool }

    pub fn registry(&self) -> &ListTypeRegistry { &self.registry }

    pub fn config(&self) -> &SqliteConfig { &self.config }

    pub(crate) async fn connection(&self) -> Result<bb8::PooledConnection<'_, SqliteConnectionManager>, SqliteError> { Ok(self.pool.get().await?) }

    pub fn list_type(&self, list_type: &ListType) -> Result<&ListTypeDescriptor, ListError> {
        self.registry.get(list_type).ok_or_else(|| ListError::UnknownListType(list_type.clone()))
    }

    /// Unfiltered, unordered query over `list_type` for one organization, with that organization's
    /// attribute catalog loaded
    pub async fn query(&self, organization: OrganizationId, list_type: &ListType) -> Result<ListQuery, ListError> {
        let list = self.list_type(list_type)?;
        let catalog = CatalogSnapshot::load(self, organization, list.entity_type()).await?;
        Ok(ListQuery::new(Arc::new(list.clone()), organization, Arc::new(catalog)))
    }

    /// Count the query's rows and fetch one page of them. A request past the last page is moved
    /// onto the last page.
    pub async fn fetch_page(&self, query: &ListQuery, request: PageRequest) -> Result<Page<ListRow>, SqliteError> {
        let conn = self.connection().await?;

        let (count_sql, count_params) = query.count_sql()?;
        debug!("fetch_page count SQL: {} with {} params", count_sql, count_params.len());
        let (total, distinct): (i64, i64) = conn
            .with_connection(move |c| Ok(c.query_row(&count_sql, params_from_iter(count_params.iter()), |row| Ok((row.get(0)?, row.get(1)?)))?))
            .await?;
        if total != distinct {
            error!("List query for {} returned {} rows for {} distinct entities", query.list().list_type, total, distinct);
            return Err(SqliteError::Cardinality(format!("{} rows for {} distinct entities", total, distinct)));
        }

        let total = u64::try_from(total).unwrap_or_default();
        let request = request.clamp(total);
        let (sql, params) = query.select_sql(request.per_page, request.offset())?;
        debug!("fetch_page SQL: {} with {} params", sql, params.len());

        let rows = conn
            .with_connection(move |c| {
                let mut stmt = c.prepare(&sql)?;
                let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
                let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                    let mut values = Vec::with_capacity(names.len());
                    for i in 0..names.len() {
                        values.push(row.get::<_, rusqlite::types::Value>(i)?);
                    }
                    Ok(values)
                })?;

                let mut results = Vec::new();
                for row in rows {
                    let mut values = row?.into_iter();
                    let id = match values.next() {
                        Some(rusqlite::types::Value::Text(id)) => id.parse::<EntityId>().map_err(|e| SqliteError::Corrupt(format!("entity id {id}: {e}")))?,
                        other => return Err(SqliteError::Corrupt(format!("entity id {:?}", other))),
                    };
                    let values: IndexMap<String, SqliteValue> = names.iter().skip(1).cloned().zip(values.map(SqliteValue::from)).collect();
                    results.push(ListRow { id, values });
                }
                Ok(results)
            })
            .await?;

        let mut seen = HashSet::with_capacity(rows.len());
        if let Some(row) = rows.iter().find(|row| !seen.insert(row.id)) {
            error!("List query for {} returned entity {} twice", query.list().list_type, row.id);
            return Err(SqliteError::Cardinality(format!("entity {} returned twice", row.id)));
        }

        Ok(Page { items: rows, page: request.page, per_page: request.per_page, total })
    }
}
