//! Tables owned by the list engine. Base entity tables belong to their collaborators.

use rusqlite::Connection;
use tracing::debug;

use crate::error::SqliteError;

pub const ATTRIBUTE_TABLE: &str = "attribute_definition";
pub const OPTION_TABLE: &str = "attribute_option";
pub const VALUE_TABLE: &str = "attribute_value";
pub const PREFERENCE_TABLE: &str = "list_preference";

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "attribute_definition"(
        "id" TEXT PRIMARY KEY,
        "organization_id" TEXT NOT NULL,
        "entity_type" TEXT NOT NULL,
        "name" TEXT NOT NULL,
        "data_type" TEXT NOT NULL CHECK ("data_type" IN ('enum', 'date')),
        "is_multi" INTEGER NOT NULL DEFAULT 0,
        "created_at" TEXT NOT NULL,
        "updated_at" TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS "attribute_definition_scope_idx" ON "attribute_definition"("organization_id", "entity_type")"#,
    r#"CREATE TABLE IF NOT EXISTS "attribute_option"(
        "id" TEXT PRIMARY KEY,
        "attribute_id" TEXT NOT NULL REFERENCES "attribute_definition"("id") ON DELETE CASCADE,
        "label" TEXT NOT NULL,
        "value" TEXT NOT NULL,
        "color_code" TEXT,
        UNIQUE ("attribute_id", "value")
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "attribute_value"(
        "id" TEXT PRIMARY KEY,
        "attribute_id" TEXT NOT NULL REFERENCES "attribute_definition"("id") ON DELETE CASCADE,
        "entity_type" TEXT NOT NULL,
        "entity_id" TEXT NOT NULL,
        "value_date" TEXT,
        "value_option_id" TEXT REFERENCES "attribute_option"("id") ON DELETE CASCADE,
        CHECK (("value_date" IS NULL) <> ("value_option_id" IS NULL))
    )"#,
    r#"CREATE INDEX IF NOT EXISTS "attribute_value_entity_idx" ON "attribute_value"("attribute_id", "entity_type", "entity_id")"#,
    r#"CREATE INDEX IF NOT EXISTS "attribute_value_option_idx" ON "attribute_value"("value_option_id")"#,
    r#"CREATE TABLE IF NOT EXISTS "list_preference"(
        "id" TEXT PRIMARY KEY,
        "organization_id" TEXT NOT NULL,
        "list_type" TEXT NOT NULL,
        "scope" TEXT NOT NULL CHECK ("scope" IN ('user', 'organization')),
        "user_id" TEXT,
        "visible_columns" TEXT NOT NULL DEFAULT '[]',
        "default_sort" TEXT,
        "items_per_page" INTEGER NOT NULL,
        "saved_filters" TEXT NOT NULL DEFAULT '{}',
        "created_at" TEXT NOT NULL,
        "updated_at" TEXT NOT NULL,
        CHECK (("scope" = 'user') = ("user_id" IS NOT NULL))
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS "list_preference_user_key" ON "list_preference"("user_id", "organization_id", "list_type") WHERE "scope" = 'user'"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS "list_preference_organization_key" ON "list_preference"("organization_id", "list_type") WHERE "scope" = 'organization'"#,
];

/// Creates the engine's tables and indexes when missing.
pub fn migrate(conn: &Connection) -> Result<(), SqliteError> {
    for statement in STATEMENTS {
        debug!("Applying schema: {}", statement);
        conn.execute(statement, []).map_err(|e| SqliteError::DDL(format!("{e}: {statement}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?, ?, ?, ?)",
                [ATTRIBUTE_TABLE, OPTION_TABLE, VALUE_TABLE, PREFERENCE_TABLE],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_scope_and_value_checks() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let org_row_with_user = conn.execute(
            r#"INSERT INTO "list_preference"("id", "organization_id", "list_type", "scope", "user_id", "items_per_page", "created_at", "updated_at")
               VALUES ('p1', 'o1', 'encounter_list', 'organization', 'u1', 25, '', '')"#,
            [],
        );
        assert!(org_row_with_user.is_err());

        conn.execute(
            r#"INSERT INTO "attribute_definition" VALUES ('a1', 'o1', 'encounter', 'Priority', 'enum', 0, '', '')"#,
            [],
        )
        .unwrap();
        let date_only = conn.execute(
            r#"INSERT INTO "attribute_value" VALUES ('v1', 'a1', 'encounter', 'e1', '2024-01-01', NULL)"#,
            [],
        );
        assert!(date_only.is_ok());
        let neither = conn.execute(r#"INSERT INTO "attribute_value" VALUES ('v2', 'a1', 'encounter', 'e1', NULL, NULL)"#, []);
        assert!(neither.is_err());
    }
}
