//! Basic SQLite list engine example

use tabula_core::codec::QueryParams;
use tabula_core::ids::{OrganizationId, UserId};
use tabula_core::ListTypeRegistry;
use tabula_storage_sqlite::{ListRequest, SqliteConfig, SqliteStorage};

#[allow(dead_code)]
async fn example() -> anyhow::Result<()> {
    let storage = SqliteStorage::open(SqliteConfig::file("lists.db"), ListTypeRegistry::builtin()).await?;

    let request = ListRequest::new(OrganizationId::new(), Some(UserId::new()), "encounter_list", QueryParams::parse("filter_status=planned,completed&sort=-created_at"));
    let view = storage.list(&request).await?;
    println!("{} of {} encounters, {} filters", view.page.items.len(), view.page.total, view.filter_chips.len());
    Ok(())
}

fn main() {}
