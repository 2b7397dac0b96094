//! Filter and sort compilation against a real database.
//!
//! Verifies:
//! - enum attribute filters return each matching entity exactly once, however many values match
//! - `includeNull` adds entities without a value, and only those
//! - an empty value list filters nothing
//! - date attribute ranges are inclusive and exclusive of everything outside
//! - standard field filters (boolean, enum, related date) and their combination with attributes
//! - attribute sorts keep NULLs last ascending and first descending, with a stable tie-breaker
//! - no query ever sees another organization's entities or attribute values

mod common;

use std::collections::BTreeSet;

use anyhow::Result;
use common::*;
use tabula_core::ids::{EntityId, ListType, OrganizationId};
use tabula_core::pagination::PageRequest;
use tabula_core::{DateFilter, FilterDocument, FilterSpec, SortSpec};
use tabula_storage_sqlite::compiler::{compile_filters, compile_sort};
use tabula_storage_sqlite::SqliteStorage;

async fn matching(storage: &SqliteStorage, organization: OrganizationId, doc: &FilterDocument) -> Result<Vec<EntityId>> {
    let mut query = storage.query(organization, &ListType::from("encounter_list")).await?;
    compile_filters(&mut query, doc);
    let page = storage.fetch_page(&query, PageRequest::new(1, 100)).await?;
    assert_eq!(page.total as usize, page.items.len());
    Ok(page.items.into_iter().map(|row| row.id).collect())
}

async fn sorted(storage: &SqliteStorage, organization: OrganizationId, sort: &SortSpec) -> Result<Vec<EntityId>> {
    let mut query = storage.query(organization, &ListType::from("encounter_list")).await?;
    assert!(compile_sort(&mut query, sort));
    let page = storage.fetch_page(&query, PageRequest::new(1, 100)).await?;
    Ok(page.items.into_iter().map(|row| row.id).collect())
}

fn set(ids: impl IntoIterator<Item = EntityId>) -> BTreeSet<EntityId> { ids.into_iter().collect() }

#[tokio::test]
async fn test_multi_valued_attribute_matches_once() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let tags = tags(&storage, org).await?;

    let both = encounter(&storage, org).await?;
    let green = encounter(&storage, org).await?;
    let untagged = encounter(&storage, org).await?;
    storage.replace_values(org, &both, tags.id, vec![AttributeInput::option("red"), AttributeInput::option("blue")]).await?;
    storage.add_value(org, &green, tags.id, AttributeInput::option("green")).await?;

    // both values of the first encounter match, it is still returned once
    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(tags.id, FilterSpec::values(["red", "blue"]))).await?;
    assert_eq!(ids, vec![both.entity_id]);

    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(tags.id, FilterSpec::values(["blue", "green"]))).await?;
    assert_eq!(set(ids), set([both.entity_id, green.entity_id]));

    // an option nobody holds excludes everyone
    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(tags.id, FilterSpec::values(["purple"]))).await?;
    assert!(ids.is_empty());

    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(tags.id, FilterSpec::values(["purple"]).with_include_null(true))).await?;
    assert_eq!(ids, vec![untagged.entity_id]);

    Ok(())
}

#[tokio::test]
async fn test_empty_value_list_filters_nothing() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let tags = tags(&storage, org).await?;
    let tagged = encounter(&storage, org).await?;
    let planned = insert_encounter(&storage, org, Encounter { status: Some("planned"), ..Default::default() }).await?;
    storage.add_value(org, &tagged, tags.id, AttributeInput::option("red")).await?;

    let all = set([tagged.entity_id, planned.entity_id]);
    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(tags.id, FilterSpec::values(Vec::<String>::new()))).await?;
    assert_eq!(set(ids), all);

    let doc = FilterDocument::new().with_field("status", FilterSpec::values(Vec::<String>::new())).with_attribute(tags.id, FilterSpec::values([""]).with_include_null(true));
    let ids = matching(&storage, org, &doc).await?;
    assert_eq!(set(ids), all);

    Ok(())
}

#[tokio::test]
async fn test_enum_include_null() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let priority = priority(&storage, org).await?;

    let e1 = encounter(&storage, org).await?;
    let e2 = encounter(&storage, org).await?;
    let e3 = encounter(&storage, org).await?;
    storage.add_value(org, &e1, priority.id, AttributeInput::option("high")).await?;
    storage.add_value(org, &e2, priority.id, AttributeInput::option("low")).await?;

    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(priority.id, FilterSpec::values(["high"]))).await?;
    assert_eq!(ids, vec![e1.entity_id]);

    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(priority.id, FilterSpec::values(["high"]).with_include_null(true))).await?;
    assert_eq!(set(ids), set([e1.entity_id, e3.entity_id]));

    // exact on an enum attribute behaves like a single value
    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(priority.id, FilterSpec::exact("low"))).await?;
    assert_eq!(ids, vec![e2.entity_id]);

    Ok(())
}

#[tokio::test]
async fn test_date_attribute_range() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let follow_up = follow_up(&storage, org).await?;

    let mut encounters = Vec::new();
    for day in ["2024-01-15", "2024-06-15", "2024-12-15"] {
        let e = encounter(&storage, org).await?;
        storage.add_value(org, &e, follow_up.id, AttributeInput::Date(date(day))).await?;
        encounters.push(e.entity_id);
    }
    let undated = encounter(&storage, org).await?;

    let range = DateFilter::between("2024-05-01", "2024-10-31");
    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(follow_up.id, range.clone().into())).await?;
    assert_eq!(ids, vec![encounters[1]]);

    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(follow_up.id, range.or_null().into())).await?;
    assert_eq!(set(ids), set([encounters[1], undated.entity_id]));

    // bounds are inclusive
    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(follow_up.id, DateFilter::between("2024-01-15", "2024-06-15").into())).await?;
    assert_eq!(set(ids), set([encounters[0], encounters[1]]));

    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(follow_up.id, DateFilter::gte("2024-06-16").into())).await?;
    assert_eq!(ids, vec![encounters[2]]);

    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(follow_up.id, DateFilter::on("2024-12-15").into())).await?;
    assert_eq!(ids, vec![encounters[2]]);

    // an inverted range is applied as written and matches nothing
    let ids = matching(&storage, org, &FilterDocument::new().with_attribute(follow_up.id, DateFilter::between("2024-10-31", "2024-05-01").into())).await?;
    assert!(ids.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_standard_field_filters() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();

    let alice = insert_patient(&storage, org, "Alice", Some("1980-03-01")).await?;
    let bob = insert_patient(&storage, org, "Bob", Some("1995-07-20")).await?;

    let planned = insert_encounter(&storage, org, Encounter { status: Some("planned"), patient: Some(alice.entity_id), ..Default::default() }).await?;
    let completed = insert_encounter(&storage, org, Encounter { status: Some("completed"), patient: Some(bob.entity_id), ..Default::default() }).await?;
    let archived = insert_encounter(&storage, org, Encounter { status: Some("planned"), is_active: false, ..Default::default() }).await?;
    let no_status = encounter(&storage, org).await?;

    let ids = matching(&storage, org, &FilterDocument::new().with_field("is_active", FilterSpec::exact("true"))).await?;
    assert_eq!(set(ids), set([planned.entity_id, completed.entity_id, no_status.entity_id]));

    let ids = matching(&storage, org, &FilterDocument::new().with_field("is_active", FilterSpec::values(["false"]))).await?;
    assert_eq!(ids, vec![archived.entity_id]);

    let ids = matching(&storage, org, &FilterDocument::new().with_field("status", FilterSpec::values(["planned", "completed"]))).await?;
    assert_eq!(set(ids), set([planned.entity_id, completed.entity_id, archived.entity_id]));

    let ids = matching(&storage, org, &FilterDocument::new().with_field("status", FilterSpec::values(["completed"]).with_include_null(true))).await?;
    assert_eq!(set(ids), set([completed.entity_id, no_status.entity_id]));

    // related date field through the patient
    let ids = matching(&storage, org, &FilterDocument::new().with_field("patient__date_of_birth", DateFilter::lte("1990-01-01").into())).await?;
    assert_eq!(ids, vec![planned.entity_id]);

    // every entry narrows the result
    let doc = FilterDocument::new().with_field("status", FilterSpec::values(["planned"])).with_field("is_active", FilterSpec::exact("true"));
    assert_eq!(matching(&storage, org, &doc).await?, vec![planned.entity_id]);

    Ok(())
}

#[tokio::test]
async fn test_fields_and_attributes_combine() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let priority = priority(&storage, org).await?;

    let active_high = encounter(&storage, org).await?;
    let archived_high = insert_encounter(&storage, org, Encounter { is_active: false, ..Default::default() }).await?;
    encounter(&storage, org).await?;
    storage.add_value(org, &active_high, priority.id, AttributeInput::option("high")).await?;
    storage.add_value(org, &archived_high, priority.id, AttributeInput::option("high")).await?;

    let doc = FilterDocument::new().with_field("is_active", FilterSpec::exact("true")).with_attribute(priority.id, FilterSpec::values(["high"]));
    assert_eq!(matching(&storage, org, &doc).await?, vec![active_high.entity_id]);

    Ok(())
}

#[tokio::test]
async fn test_sort_by_attribute_null_placement() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let follow_up = follow_up(&storage, org).await?;

    let late = encounter(&storage, org).await?;
    let none = encounter(&storage, org).await?;
    let early = encounter(&storage, org).await?;
    storage.add_value(org, &late, follow_up.id, AttributeInput::Date(date("2024-09-01"))).await?;
    storage.add_value(org, &early, follow_up.id, AttributeInput::Date(date("2024-02-01"))).await?;

    assert_eq!(sorted(&storage, org, &SortSpec::asc(follow_up.id)).await?, vec![early.entity_id, late.entity_id, none.entity_id]);
    assert_eq!(sorted(&storage, org, &SortSpec::desc(follow_up.id)).await?, vec![none.entity_id, late.entity_id, early.entity_id]);

    Ok(())
}

#[tokio::test]
async fn test_sort_by_multi_valued_attribute_keeps_cardinality() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let tags = tags(&storage, org).await?;

    let a = encounter(&storage, org).await?;
    let b = encounter(&storage, org).await?;
    storage.replace_values(org, &a, tags.id, vec![AttributeInput::option("red"), AttributeInput::option("green")]).await?;
    storage.add_value(org, &b, tags.id, AttributeInput::option("blue")).await?;

    // the smallest label represents a multi-valued attribute: Blue < Green
    assert_eq!(sorted(&storage, org, &SortSpec::asc(tags.id)).await?, vec![b.entity_id, a.entity_id]);

    let mut query = storage.query(org, &ListType::from("encounter_list")).await?;
    compile_filters(&mut query, &FilterDocument::new().with_attribute(tags.id, FilterSpec::values(["red", "green", "blue"])));
    compile_sort(&mut query, &SortSpec::desc(tags.id));
    let page = storage.fetch_page(&query, PageRequest::new(1, 100)).await?;
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_ties_break_on_id() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(encounter(&storage, org).await?.entity_id);
    }
    ids.sort_by_key(|id| id.to_string());

    // identical updated_at everywhere
    assert_eq!(sorted(&storage, org, &SortSpec::desc("updated_at")).await?, ids);

    Ok(())
}

#[tokio::test]
async fn test_pagination() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    for _ in 0..7 {
        encounter(&storage, org).await?;
    }

    let query = storage.query(org, &ListType::from("encounter_list")).await?;
    let first = storage.fetch_page(&query, PageRequest::new(1, 3)).await?;
    let last = storage.fetch_page(&query, PageRequest::new(3, 3)).await?;
    assert_eq!(first.total, 7);
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.num_pages(), 3);
    assert!(first.has_next());
    assert_eq!(last.items.len(), 1);
    assert!(!last.has_next());

    // past the end clamps to the last page
    let beyond = storage.fetch_page(&query, PageRequest::new(9, 3)).await?;
    assert_eq!(beyond.page, 3);
    assert_eq!(beyond.items, last.items);

    Ok(())
}

#[tokio::test]
async fn test_organizations_are_isolated() -> Result<()> {
    let storage = storage().await?;
    let org_a = OrganizationId::new();
    let org_b = OrganizationId::new();
    let priority_a = priority(&storage, org_a).await?;

    let mine = encounter(&storage, org_a).await?;
    let theirs = encounter(&storage, org_b).await?;
    storage.add_value(org_a, &mine, priority_a.id, AttributeInput::option("high")).await?;

    assert_eq!(matching(&storage, org_b, &FilterDocument::new()).await?, vec![theirs.entity_id]);

    // another organization's attribute is not in the catalog and is skipped, not applied
    let doc = FilterDocument::new().with_attribute(priority_a.id, FilterSpec::values(["high"]));
    assert_eq!(matching(&storage, org_b, &doc).await?, vec![theirs.entity_id]);
    assert_eq!(matching(&storage, org_a, &doc).await?, vec![mine.entity_id]);

    Ok(())
}
