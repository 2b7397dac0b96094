//! Attribute value store. Every write runs in an IMMEDIATE transaction that re-checks the attribute's
//! scope, the target entity's organization, the value's type and the single-value rule.

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tabula_core::attribute::{AttributeDefinition, AttributeInput, AttributeValue, DataType, TypedValue};
use tabula_core::error::{MutationError, RetrievalError};
use tabula_core::ids::{AttributeId, EntityRef, OptionId, OrganizationId, ValueId};
use tabula_core::registry::EntityDescriptor;
use tracing::debug;

use crate::catalog::find_attribute;
use crate::engine::SqliteStorage;
use crate::error::SqliteError;
use crate::sql_builder::quote;
use crate::value::{parse_column, SqliteValue};

const VALUE_COLUMNS: &str = r#""av"."id", "av"."attribute_id", "av"."entity_type", "av"."entity_id", "av"."value_date", "av"."value_option_id""#;

fn value_from_row(row: &Row<'_>) -> rusqlite::Result<AttributeValue> {
    let value = match row.get::<_, Option<String>>(4)? {
        Some(_) => TypedValue::Date(parse_column(row, 4)?),
        None => TypedValue::Option(parse_column(row, 5)?),
    };
    Ok(AttributeValue {
        id: parse_column(row, 0)?,
        attribute_id: parse_column(row, 1)?,
        entity: EntityRef::new(row.get::<_, String>(2)?.as_str(), parse_column(row, 3)?),
        value,
    })
}

/// A write target whose attribute and entity have been checked against the organization
struct Target {
    attribute: AttributeDefinition,
    entity: EntityRef,
}

impl Target {
    fn load(conn: &Connection, base: &EntityDescriptor, organization: OrganizationId, entity: &EntityRef, attribute: AttributeId) -> Result<Self, SqliteError> {
        let definition = find_attribute(conn, organization, &entity.entity_type, attribute)?.ok_or(MutationError::UnknownAttribute(attribute))?;

        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = ? AND {} = ?)",
            quote(&base.table),
            quote(&base.id_column),
            quote(&base.organization_column)
        );
        let exists: bool = conn.query_row(&sql, params![entity.entity_id.to_string(), organization.to_string()], |row| row.get(0))?;
        if !exists {
            return Err(MutationError::EntityNotInOrganization { entity_type: entity.entity_type.clone(), entity_id: entity.entity_id }.into());
        }
        Ok(Self { attribute: definition, entity: entity.clone() })
    }

    fn resolve(&self, conn: &Connection, input: &AttributeInput) -> Result<TypedValue, SqliteError> {
        let attribute = self.attribute.id;
        match (self.attribute.data_type, input) {
            (DataType::Date, AttributeInput::Date(date)) => Ok(TypedValue::Date(*date)),
            (DataType::Enum, AttributeInput::Option(value)) => {
                let option: Option<OptionId> = conn
                    .query_row(
                        r#"SELECT "id" FROM "attribute_option" WHERE "attribute_id" = ? AND "value" = ?"#,
                        params![attribute.to_string(), value],
                        |row| parse_column(row, 0),
                    )
                    .optional()?;
                let option = option.ok_or_else(|| MutationError::UnknownOption { attribute, value: value.clone() })?;
                Ok(TypedValue::Option(option))
            }
            (expected, _) => Err(MutationError::DataTypeMismatch { attribute, expected }.into()),
        }
    }

    fn existing(&self, conn: &Connection) -> Result<Vec<AttributeValue>, SqliteError> {
        let sql = format!(
            r#"SELECT {VALUE_COLUMNS} FROM "attribute_value" AS "av" WHERE "av"."attribute_id" = ? AND "av"."entity_type" = ? AND "av"."entity_id" = ? ORDER BY "av"."rowid""#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![self.attribute.id.to_string(), self.entity.entity_type.as_str(), self.entity.entity_id.to_string()],
            value_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn insert(&self, conn: &Connection, value: TypedValue) -> Result<AttributeValue, SqliteError> {
        let row = AttributeValue { id: ValueId::new(), attribute_id: self.attribute.id, entity: self.entity.clone(), value };
        let (date, option) = match value {
            TypedValue::Date(date) => (SqliteValue::from(date), SqliteValue::Null),
            TypedValue::Option(option) => (SqliteValue::Null, SqliteValue::from(option.to_string())),
        };
        conn.execute(
            r#"INSERT INTO "attribute_value"("id", "attribute_id", "entity_type", "entity_id", "value_date", "value_option_id") VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                row.id.to_string(),
                row.attribute_id.to_string(),
                row.entity.entity_type.as_str(),
                row.entity.entity_id.to_string(),
                date.to_sql(),
                option.to_sql()
            ],
        )?;
        Ok(row)
    }

    fn clear(&self, conn: &Connection) -> Result<usize, SqliteError> {
        Ok(conn.execute(
            r#"DELETE FROM "attribute_value" WHERE "attribute_id" = ? AND "entity_type" = ? AND "entity_id" = ?"#,
            params![self.attribute.id.to_string(), self.entity.entity_type.as_str(), self.entity.entity_id.to_string()],
        )?)
    }
}

impl SqliteStorage {
    fn base_entity(&self, entity: &EntityRef) -> Result<EntityDescriptor, MutationError> {
        self.registry().entity(&entity.entity_type).cloned().ok_or_else(|| MutationError::UnknownEntityType(entity.entity_type.clone()))
    }

    async fn write_values<F, T>(&self, organization: OrganizationId, entity: &EntityRef, attribute: AttributeId, f: F) -> Result<T, MutationError>
    where
        F: FnOnce(&Connection, &Target) -> Result<T, SqliteError> + Send + 'static,
        T: Send + 'static,
    {
        let base = self.base_entity(entity)?;
        let entity = entity.clone();
        let conn = self.connection().await?;
        Ok(conn
            .with_connection_mut(move |c| {
                let tx = c.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let target = Target::load(&tx, &base, organization, &entity, attribute)?;
                let result = f(&tx, &target)?;
                tx.commit()?;
                Ok(result)
            })
            .await?)
    }

    /// Add one value. Adding a value the entity already holds returns the existing row.
    pub async fn add_value(&self, organization: OrganizationId, entity: &EntityRef, attribute: AttributeId, input: AttributeInput) -> Result<AttributeValue, MutationError> {
        let value = self
            .write_values(organization, entity, attribute, move |conn, target| {
                let value = target.resolve(conn, &input)?;
                let existing = target.existing(conn)?;
                if let Some(same) = existing.iter().find(|v| v.value == value) {
                    return Ok(same.clone());
                }
                if !target.attribute.is_multi && !existing.is_empty() {
                    return Err(MutationError::SingleValueViolation(attribute).into());
                }
                target.insert(conn, value)
            })
            .await?;
        debug!("Attribute {} of {} {} holds {:?}", attribute, entity.entity_type, entity.entity_id, value.value);
        Ok(value)
    }

    /// Replace every value of `attribute` on `entity`. Duplicate inputs are stored once; an empty
    /// list clears the attribute.
    pub async fn replace_values(
        &self,
        organization: OrganizationId,
        entity: &EntityRef,
        attribute: AttributeId,
        inputs: Vec<AttributeInput>,
    ) -> Result<Vec<AttributeValue>, MutationError> {
        let values = self
            .write_values(organization, entity, attribute, move |conn, target| {
                let mut resolved: Vec<TypedValue> = Vec::with_capacity(inputs.len());
                for input in &inputs {
                    let value = target.resolve(conn, input)?;
                    if !resolved.contains(&value) {
                        resolved.push(value);
                    }
                }
                if !target.attribute.is_multi && resolved.len() > 1 {
                    return Err(MutationError::SingleValueViolation(attribute).into());
                }
                target.clear(conn)?;
                resolved.into_iter().map(|value| target.insert(conn, value)).collect::<Result<Vec<_>, _>>()
            })
            .await?;
        debug!("Attribute {} of {} {} replaced with {} values", attribute, entity.entity_type, entity.entity_id, values.len());
        Ok(values)
    }

    /// Remove every value of `attribute` on `entity`, returning how many were removed
    pub async fn clear_values(&self, organization: OrganizationId, entity: &EntityRef, attribute: AttributeId) -> Result<usize, MutationError> {
        self.write_values(organization, entity, attribute, |conn, target| target.clear(conn)).await
    }

    /// All attribute values of an entity visible to `organization`, ordered by attribute name
    pub async fn values_for(&self, organization: OrganizationId, entity: &EntityRef) -> Result<Vec<AttributeValue>, RetrievalError> {
        let conn = self.connection().await?;
        let entity = entity.clone();
        let values = conn
            .with_connection(move |c| {
                let sql = format!(
                    r#"SELECT {VALUE_COLUMNS} FROM "attribute_value" AS "av"
                       JOIN "attribute_definition" AS "ad" ON "ad"."id" = "av"."attribute_id"
                       WHERE "ad"."organization_id" = ? AND "ad"."entity_type" = "av"."entity_type" AND "av"."entity_type" = ? AND "av"."entity_id" = ?
                       ORDER BY "ad"."name", "av"."rowid""#
                );
                let mut stmt = c.prepare(&sql)?;
                let rows = stmt.query_map(params![organization.to_string(), entity.entity_type.as_str(), entity.entity_id.to_string()], value_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(values)
    }
}
