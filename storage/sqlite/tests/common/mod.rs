use std::str::FromStr;

use anyhow::Result;
use tabula_core::attribute::{AttributeDefinition, DataType, NewAttribute, NewOption};
use tabula_core::ids::{EntityId, EntityRef, OrganizationId};
use tabula_core::ListTypeRegistry;
use tabula_storage_sqlite::{SqliteConfig, SqliteStorage};
use tracing::Level;

#[allow(unused)]
pub use tabula_core::attribute::AttributeInput;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    // if LOG_LEVEL env var is set, use it
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        tracing_subscriber::fmt().with_max_level(Level::from_str(&level).unwrap()).with_test_writer().init();
    } else {
        tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init();
    }
}

/// Base tables the list engine reads but does not own
const BASE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS "patient"(
        "id" TEXT PRIMARY KEY,
        "organization_id" TEXT NOT NULL,
        "first_name" TEXT,
        "email" TEXT,
        "date_of_birth" TEXT,
        "created_at" TEXT NOT NULL,
        "updated_at" TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS "encounter"(
        "id" TEXT PRIMARY KEY,
        "organization_id" TEXT NOT NULL,
        "patient_id" TEXT REFERENCES "patient"("id"),
        "is_active" INTEGER NOT NULL DEFAULT 1,
        "status" TEXT,
        "created_at" TEXT NOT NULL,
        "updated_at" TEXT NOT NULL
    );
"#;

async fn with_base_tables(storage: SqliteStorage) -> Result<SqliteStorage> {
    let conn = storage.pool().get().await?;
    conn.with_connection(|c| Ok(c.execute_batch(BASE_TABLES)?)).await?;
    drop(conn);
    Ok(storage)
}

#[allow(unused)]
pub async fn storage() -> Result<SqliteStorage> { with_base_tables(SqliteStorage::open_in_memory(ListTypeRegistry::builtin()).await?).await }

#[allow(unused)]
pub async fn storage_with_config(config: SqliteConfig) -> Result<SqliteStorage> {
    with_base_tables(SqliteStorage::open(config, ListTypeRegistry::builtin()).await?).await
}

#[allow(unused)]
pub struct Encounter {
    pub status: Option<&'static str>,
    pub is_active: bool,
    pub patient: Option<EntityId>,
    pub updated_at: &'static str,
}

impl Default for Encounter {
    fn default() -> Self { Self { status: None, is_active: true, patient: None, updated_at: "2024-01-01T00:00:00" } }
}

#[allow(unused)]
pub async fn insert_encounter(storage: &SqliteStorage, organization: OrganizationId, encounter: Encounter) -> Result<EntityRef> {
    let id = EntityId::new();
    let conn = storage.pool().get().await?;
    let patient = encounter.patient.map(|p| p.to_string());
    conn.with_connection(move |c| {
        c.execute(
            r#"INSERT INTO "encounter"("id", "organization_id", "patient_id", "is_active", "status", "created_at", "updated_at") VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            rusqlite::params![id.to_string(), organization.to_string(), patient, encounter.is_active, encounter.status, encounter.updated_at, encounter.updated_at],
        )?;
        Ok(())
    })
    .await?;
    Ok(EntityRef::new("encounter", id))
}

#[allow(unused)]
pub async fn encounter(storage: &SqliteStorage, organization: OrganizationId) -> Result<EntityRef> {
    insert_encounter(storage, organization, Encounter::default()).await
}

#[allow(unused)]
pub async fn insert_patient(storage: &SqliteStorage, organization: OrganizationId, first_name: &str, date_of_birth: Option<&str>) -> Result<EntityRef> {
    let id = EntityId::new();
    let conn = storage.pool().get().await?;
    let first_name = first_name.to_owned();
    let email = format!("{}@example.com", first_name.to_lowercase());
    let date_of_birth = date_of_birth.map(str::to_owned);
    conn.with_connection(move |c| {
        c.execute(
            r#"INSERT INTO "patient"("id", "organization_id", "first_name", "email", "date_of_birth", "created_at", "updated_at") VALUES (?, ?, ?, ?, ?, '2024-01-01', '2024-01-01')"#,
            rusqlite::params![id.to_string(), organization.to_string(), first_name, email, date_of_birth],
        )?;
        Ok(())
    })
    .await?;
    Ok(EntityRef::new("patient", id))
}

/// Single-valued "Priority" enum on encounters with options `low` and `high`
#[allow(unused)]
pub async fn priority(storage: &SqliteStorage, organization: OrganizationId) -> Result<AttributeDefinition> {
    let attribute = storage.create_attribute(organization, NewAttribute::new("encounter", "Priority", DataType::Enum)).await?;
    storage.add_option(organization, attribute.id, NewOption::new("Low", "low")).await?;
    storage.add_option(organization, attribute.id, NewOption::new("High", "high").color("#d9534f")).await?;
    Ok(attribute)
}

/// Multi-valued "Tags" enum on encounters with options `red`, `green` and `blue`
#[allow(unused)]
pub async fn tags(storage: &SqliteStorage, organization: OrganizationId) -> Result<AttributeDefinition> {
    let attribute = storage.create_attribute(organization, NewAttribute::new("encounter", "Tags", DataType::Enum).multi()).await?;
    for (label, value) in [("Red", "red"), ("Green", "green"), ("Blue", "blue")] {
        storage.add_option(organization, attribute.id, NewOption::new(label, value)).await?;
    }
    Ok(attribute)
}

/// Single-valued "Follow-up Date" on encounters
#[allow(unused)]
pub async fn follow_up(storage: &SqliteStorage, organization: OrganizationId) -> Result<AttributeDefinition> {
    Ok(storage.create_attribute(organization, NewAttribute::new("encounter", "Follow-up Date", DataType::Date)).await?)
}

#[allow(unused)]
pub fn date(value: &str) -> chrono::NaiveDate { chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap() }
