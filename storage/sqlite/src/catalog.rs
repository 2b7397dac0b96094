//! Attribute definitions and options: the catalog read model and its administrative writes.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tabula_core::attribute::{AttributeDefinition, AttributeOption, DataType, NewAttribute, NewOption};
use tabula_core::error::{MutationError, RetrievalError};
use tabula_core::ids::{AttributeId, EntityType, OptionId, OrganizationId};
use tabula_core::Catalog;
use tracing::{debug, info};

use crate::engine::SqliteStorage;
use crate::error::SqliteError;
use crate::value::{parse_column, timestamp};

const ATTRIBUTE_COLUMNS: &str = r#""id", "organization_id", "entity_type", "name", "data_type", "is_multi", "created_at", "updated_at""#;
const OPTION_COLUMNS: &str = r#""id", "attribute_id", "label", "value", "color_code""#;

pub(crate) fn attribute_from_row(row: &Row<'_>) -> rusqlite::Result<AttributeDefinition> {
    Ok(AttributeDefinition {
        id: parse_column(row, 0)?,
        organization_id: parse_column(row, 1)?,
        entity_type: EntityType::new(row.get::<_, String>(2)?),
        name: row.get(3)?,
        data_type: parse_column(row, 4)?,
        is_multi: row.get(5)?,
        created_at: parse_column(row, 6)?,
        updated_at: parse_column(row, 7)?,
    })
}

pub(crate) fn option_from_row(row: &Row<'_>) -> rusqlite::Result<AttributeOption> {
    Ok(AttributeOption { id: parse_column(row, 0)?, attribute_id: parse_column(row, 1)?, label: row.get(2)?, value: row.get(3)?, color_code: row.get(4)? })
}

/// Scoped attribute lookup usable inside a transaction
pub(crate) fn find_attribute(
    conn: &rusqlite::Connection,
    organization: OrganizationId,
    entity_type: &EntityType,
    id: AttributeId,
) -> Result<Option<AttributeDefinition>, SqliteError> {
    let sql = format!(r#"SELECT {ATTRIBUTE_COLUMNS} FROM "attribute_definition" WHERE "id" = ? AND "organization_id" = ? AND "entity_type" = ?"#);
    Ok(conn.query_row(&sql, params![id.to_string(), organization.to_string(), entity_type.as_str()], attribute_from_row).optional()?)
}

#[async_trait]
impl Catalog for SqliteStorage {
    async fn list_attributes(&self, organization: OrganizationId, entity_type: &EntityType) -> Result<Vec<AttributeDefinition>, RetrievalError> {
        let conn = self.connection().await?;
        let entity_type = entity_type.clone();
        let attributes = conn
            .with_connection(move |c| {
                let sql = format!(
                    r#"SELECT {ATTRIBUTE_COLUMNS} FROM "attribute_definition" WHERE "organization_id" = ? AND "entity_type" = ? ORDER BY "name", "id""#
                );
                let mut stmt = c.prepare(&sql)?;
                let rows = stmt.query_map(params![organization.to_string(), entity_type.as_str()], attribute_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(attributes)
    }

    async fn get_attribute(
        &self,
        organization: OrganizationId,
        entity_type: &EntityType,
        id: AttributeId,
    ) -> Result<Option<AttributeDefinition>, RetrievalError> {
        let conn = self.connection().await?;
        let entity_type = entity_type.clone();
        Ok(conn.with_connection(move |c| find_attribute(c, organization, &entity_type, id)).await?)
    }

    async fn list_options(&self, attribute: &AttributeDefinition) -> Result<Vec<AttributeOption>, RetrievalError> {
        if attribute.data_type != DataType::Enum {
            return Ok(Vec::new());
        }
        let conn = self.connection().await?;
        let attribute_id = attribute.id;
        let options = conn
            .with_connection(move |c| {
                let sql = format!(r#"SELECT {OPTION_COLUMNS} FROM "attribute_option" WHERE "attribute_id" = ? ORDER BY "label", "value""#);
                let mut stmt = c.prepare(&sql)?;
                let rows = stmt.query_map([attribute_id.to_string()], option_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(options)
    }
}

impl SqliteStorage {
    /// Define a new attribute for one of the registered entity types
    pub async fn create_attribute(&self, organization: OrganizationId, attribute: NewAttribute) -> Result<AttributeDefinition, MutationError> {
        if self.registry().entity(&attribute.entity_type).is_none() {
            return Err(MutationError::UnknownEntityType(attribute.entity_type));
        }
        let now = Utc::now();
        let definition = AttributeDefinition {
            id: AttributeId::new(),
            organization_id: organization,
            entity_type: attribute.entity_type,
            name: attribute.name,
            data_type: attribute.data_type,
            is_multi: attribute.is_multi,
            created_at: now,
            updated_at: now,
        };

        let conn = self.connection().await?;
        let row = definition.clone();
        conn.with_connection(move |c| {
            let sql = format!(r#"INSERT INTO "attribute_definition"({ATTRIBUTE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#);
            c.execute(
                &sql,
                params![
                    row.id.to_string(),
                    row.organization_id.to_string(),
                    row.entity_type.as_str(),
                    row.name,
                    row.data_type.as_str(),
                    row.is_multi,
                    timestamp(row.created_at),
                    timestamp(row.updated_at)
                ],
            )?;
            Ok(())
        })
        .await?;
        info!("Created {} attribute {:?} ({}) for {}", definition.data_type, definition.name, definition.id, definition.entity_type);
        Ok(definition)
    }

    /// Add an option to an ENUM attribute of `organization`
    pub async fn add_option(&self, organization: OrganizationId, attribute: AttributeId, option: NewOption) -> Result<AttributeOption, MutationError> {
        let conn = self.connection().await?;
        let created = conn
            .with_connection_mut(move |c| {
                let tx = c.transaction()?;
                let definition = owned_attribute(&tx, organization, attribute)?.ok_or(MutationError::UnknownAttribute(attribute))?;
                if definition.data_type != DataType::Enum {
                    return Err(MutationError::DataTypeMismatch { attribute, expected: definition.data_type }.into());
                }
                let exists: bool = tx.query_row(
                    r#"SELECT EXISTS (SELECT 1 FROM "attribute_option" WHERE "attribute_id" = ? AND "value" = ?)"#,
                    params![attribute.to_string(), option.value],
                    |row| row.get(0),
                )?;
                if exists {
                    return Err(MutationError::DuplicateOption(option.value).into());
                }
                let created = AttributeOption { id: OptionId::new(), attribute_id: attribute, label: option.label, value: option.value, color_code: option.color_code };
                let sql = format!(r#"INSERT INTO "attribute_option"({OPTION_COLUMNS}) VALUES (?, ?, ?, ?, ?)"#);
                tx.execute(&sql, params![created.id.to_string(), attribute.to_string(), created.label, created.value, created.color_code])?;
                tx.execute(r#"UPDATE "attribute_definition" SET "updated_at" = ? WHERE "id" = ?"#, params![timestamp(Utc::now()), attribute.to_string()])?;
                tx.commit()?;
                Ok(created)
            })
            .await?;
        debug!("Added option {:?} to attribute {}", created.value, attribute);
        Ok(created)
    }

    /// Delete an attribute with its options and values. Returns false when it did not exist.
    pub async fn delete_attribute(&self, organization: OrganizationId, attribute: AttributeId) -> Result<bool, MutationError> {
        let conn = self.connection().await?;
        let deleted = conn
            .with_connection(move |c| {
                Ok(c.execute(
                    r#"DELETE FROM "attribute_definition" WHERE "id" = ? AND "organization_id" = ?"#,
                    params![attribute.to_string(), organization.to_string()],
                )? > 0)
            })
            .await?;
        if deleted {
            info!("Deleted attribute {}", attribute);
        }
        Ok(deleted)
    }
}

/// Attribute lookup by organization only, for writes addressed by attribute id
fn owned_attribute(conn: &rusqlite::Connection, organization: OrganizationId, id: AttributeId) -> Result<Option<AttributeDefinition>, SqliteError> {
    let sql = format!(r#"SELECT {ATTRIBUTE_COLUMNS} FROM "attribute_definition" WHERE "id" = ? AND "organization_id" = ?"#);
    Ok(conn.query_row(&sql, params![id.to_string(), organization.to_string()], attribute_from_row).optional()?)
}
