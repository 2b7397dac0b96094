//! Attribute catalog and value store.
//!
//! Verifies:
//! - attribute definitions and options are scoped to their organization
//! - single-valued attributes never hold more than one value
//! - values must match the attribute's data type and defined options
//! - values can only be written to entities of the attribute's organization
//! - deleting an attribute removes its options and values

mod common;

use anyhow::Result;
use common::*;
use tabula_core::attribute::{DataType, NewAttribute, NewOption, TypedValue};
use tabula_core::error::MutationError;
use tabula_core::ids::{AttributeId, EntityId, EntityRef, OrganizationId};
use tabula_core::Catalog;

#[tokio::test]
async fn test_catalog_is_scoped() -> Result<()> {
    let storage = storage().await?;
    let org_a = OrganizationId::new();
    let org_b = OrganizationId::new();
    let priority = priority(&storage, org_a).await?;
    follow_up(&storage, org_a).await?;

    let names: Vec<String> = storage.list_attributes(org_a, &"encounter".into()).await?.into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec!["Follow-up Date".to_owned(), "Priority".to_owned()]);
    assert!(storage.list_attributes(org_b, &"encounter".into()).await?.is_empty());
    assert!(storage.list_attributes(org_a, &"patient".into()).await?.is_empty());

    assert!(storage.get_attribute(org_a, &"encounter".into(), priority.id).await?.is_some());
    assert!(storage.get_attribute(org_b, &"encounter".into(), priority.id).await?.is_none());

    let options = storage.list_options(&priority).await?;
    let values: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(values, vec!["high", "low"]);
    assert_eq!(options[0].color_code.as_deref(), Some("#d9534f"));

    Ok(())
}

#[tokio::test]
async fn test_option_rules() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let priority = priority(&storage, org).await?;
    let follow_up = follow_up(&storage, org).await?;
    assert!(storage.list_options(&follow_up).await?.is_empty());

    assert!(matches!(storage.add_option(org, priority.id, NewOption::new("Highest", "high")).await, Err(MutationError::DuplicateOption(v)) if v == "high"));
    assert!(matches!(
        storage.add_option(org, follow_up.id, NewOption::new("Soon", "soon")).await,
        Err(MutationError::DataTypeMismatch { expected: DataType::Date, .. })
    ));
    assert!(matches!(storage.add_option(OrganizationId::new(), priority.id, NewOption::new("Mid", "mid")).await, Err(MutationError::UnknownAttribute(_))));
    assert!(matches!(
        storage.create_attribute(org, NewAttribute::new("invoice", "Due", DataType::Date)).await,
        Err(MutationError::UnknownEntityType(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_single_value_rule() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let priority = priority(&storage, org).await?;
    let e = encounter(&storage, org).await?;

    let first = storage.add_value(org, &e, priority.id, AttributeInput::option("high")).await?;
    // the same value again is a no-op
    let again = storage.add_value(org, &e, priority.id, AttributeInput::option("high")).await?;
    assert_eq!(first.id, again.id);

    assert!(matches!(storage.add_value(org, &e, priority.id, AttributeInput::option("low")).await, Err(MutationError::SingleValueViolation(_))));
    assert!(matches!(
        storage.replace_values(org, &e, priority.id, vec![AttributeInput::option("low"), AttributeInput::option("high")]).await,
        Err(MutationError::SingleValueViolation(_))
    ));

    // a rejected replace leaves the stored value alone
    let values = storage.values_for(org, &e).await?;
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].id, first.id);

    let replaced = storage.replace_values(org, &e, priority.id, vec![AttributeInput::option("low")]).await?;
    assert_eq!(replaced.len(), 1);
    assert_eq!(storage.values_for(org, &e).await?, replaced);

    assert_eq!(storage.clear_values(org, &e, priority.id).await?, 1);
    assert!(storage.values_for(org, &e).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_multi_value_replace() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let tags = tags(&storage, org).await?;
    let e = encounter(&storage, org).await?;

    let values = storage
        .replace_values(org, &e, tags.id, vec![AttributeInput::option("red"), AttributeInput::option("blue"), AttributeInput::option("red")])
        .await?;
    assert_eq!(values.len(), 2);

    storage.add_value(org, &e, tags.id, AttributeInput::option("green")).await?;
    assert_eq!(storage.values_for(org, &e).await?.len(), 3);

    assert!(storage.replace_values(org, &e, tags.id, Vec::new()).await?.is_empty());
    assert!(storage.values_for(org, &e).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_value_type_checks() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let priority = priority(&storage, org).await?;
    let follow_up = follow_up(&storage, org).await?;
    let e = encounter(&storage, org).await?;

    assert!(matches!(
        storage.add_value(org, &e, priority.id, AttributeInput::Date(date("2024-01-01"))).await,
        Err(MutationError::DataTypeMismatch { expected: DataType::Enum, .. })
    ));
    assert!(matches!(
        storage.add_value(org, &e, follow_up.id, AttributeInput::option("high")).await,
        Err(MutationError::DataTypeMismatch { expected: DataType::Date, .. })
    ));
    assert!(matches!(
        storage.add_value(org, &e, priority.id, AttributeInput::option("urgent")).await,
        Err(MutationError::UnknownOption { value, .. }) if value == "urgent"
    ));
    assert!(matches!(storage.add_value(org, &e, AttributeId::new(), AttributeInput::option("high")).await, Err(MutationError::UnknownAttribute(_))));

    let stored = storage.add_value(org, &e, follow_up.id, AttributeInput::Date(date("2024-03-09"))).await?;
    assert_eq!(stored.value, TypedValue::Date(date("2024-03-09")));

    Ok(())
}

#[tokio::test]
async fn test_values_stay_in_organization() -> Result<()> {
    let storage = storage().await?;
    let org_a = OrganizationId::new();
    let org_b = OrganizationId::new();
    let priority_a = priority(&storage, org_a).await?;
    let theirs = encounter(&storage, org_b).await?;

    // org A's attribute on org B's encounter
    assert!(matches!(
        storage.add_value(org_a, &theirs, priority_a.id, AttributeInput::option("high")).await,
        Err(MutationError::EntityNotInOrganization { .. })
    ));
    // org B cannot see org A's attribute at all
    assert!(matches!(storage.add_value(org_b, &theirs, priority_a.id, AttributeInput::option("high")).await, Err(MutationError::UnknownAttribute(_))));

    let missing = EntityRef::new("encounter", EntityId::new());
    assert!(matches!(
        storage.add_value(org_a, &missing, priority_a.id, AttributeInput::option("high")).await,
        Err(MutationError::EntityNotInOrganization { .. })
    ));

    // an attribute of another entity type is unknown for this entity
    let patient = insert_patient(&storage, org_a, "Carol", None).await?;
    assert!(matches!(storage.add_value(org_a, &patient, priority_a.id, AttributeInput::option("high")).await, Err(MutationError::UnknownAttribute(_))));

    Ok(())
}

#[tokio::test]
async fn test_delete_attribute_cascades() -> Result<()> {
    let storage = storage().await?;
    let org = OrganizationId::new();
    let priority = priority(&storage, org).await?;
    let follow_up = follow_up(&storage, org).await?;
    let e = encounter(&storage, org).await?;
    storage.add_value(org, &e, priority.id, AttributeInput::option("high")).await?;
    storage.add_value(org, &e, follow_up.id, AttributeInput::Date(date("2024-05-05"))).await?;

    assert!(!storage.delete_attribute(OrganizationId::new(), priority.id).await?);
    assert!(storage.delete_attribute(org, priority.id).await?);
    assert!(!storage.delete_attribute(org, priority.id).await?);

    let values = storage.values_for(org, &e).await?;
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].attribute_id, follow_up.id);
    assert!(storage.list_options(&priority).await?.is_empty());

    Ok(())
}
