//! Attaching attribute values to a list query as computed columns.

use tabula_core::annotation::annotation_name;
use tabula_core::ids::AttributeId;
use tracing::{debug, warn};

use crate::query::{Annotation, ListQuery};

/// Attach one computed column per attribute unless the query already carries it. Returns the
/// column aliases in request order; attributes outside the query's organization and entity type are
/// skipped.
pub fn ensure_annotated(query: &mut ListQuery, attributes: impl IntoIterator<Item = AttributeId>) -> Vec<String> {
    let mut aliases = Vec::new();
    for attribute in attributes {
        let alias = annotation_name(attribute);
        if query.has_annotation(&alias) {
            aliases.push(alias);
            continue;
        }
        let Some(definition) = query.catalog().attribute(attribute) else {
            warn!("Not annotating {}: no such attribute for {} in this organization", attribute, query.list().entity_type());
            continue;
        };
        let annotation = Annotation { attribute, entity_type: definition.entity_type.clone(), data_type: definition.data_type };
        debug!("Annotating {} as {}", definition.name, alias);
        query.add_annotation(annotation);
        aliases.push(alias);
    }
    aliases
}
