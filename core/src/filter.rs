//! The filter document: the structured, storage-independent description of what a list is
//! filtered by. It is the unit of validation, compilation, persistence and URL encoding.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ids::AttributeId;

/// Two maps of filters, ANDed together when compiled.
///
/// `custom_attributes` is keyed by the hyphenated attribute id. Keys are kept as strings so that a
/// document loaded from storage can still carry (and report) a malformed id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDocument {
    #[serde(default)]
    pub model_fields: BTreeMap<String, FilterSpec>,
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, FilterSpec>,
}

impl FilterDocument {
    pub fn new() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool { self.model_fields.is_empty() && self.custom_attributes.is_empty() }

    pub fn len(&self) -> usize { self.model_fields.len() + self.custom_attributes.len() }

    pub fn with_field(mut self, field: impl Into<String>, spec: FilterSpec) -> Self {
        self.model_fields.insert(field.into(), spec);
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeId, spec: FilterSpec) -> Self {
        self.custom_attributes.insert(attribute.to_string(), spec);
        self
    }

    /// Lenient load of a stored document. Entries are read one at a time and an entry that does not
    /// deserialize is dropped on its own; text that is not a JSON object at all reads as "no filters".
    pub fn from_json_lenient(value: &str) -> Self {
        let raw: serde_json::Value = match serde_json::from_str(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Discarding unreadable filter document: {}", e);
                return Self::default();
            }
        };
        let custom_attributes = lenient_section(&raw, "custom_attributes")
            .into_iter()
            .map(|(key, spec)| match key.parse::<AttributeId>() {
                Ok(id) => (id.to_string(), spec),
                Err(_) => (key, spec),
            })
            .collect();
        Self { model_fields: lenient_section(&raw, "model_fields"), custom_attributes }
    }
}

fn lenient_section(raw: &serde_json::Value, section: &str) -> BTreeMap<String, FilterSpec> {
    let Some(entries) = raw.get(section).filter(|v| !v.is_null()) else {
        return BTreeMap::new();
    };
    let Some(entries) = entries.as_object() else {
        tracing::warn!("Discarding {} of a stored filter document: not an object", section);
        return BTreeMap::new();
    };
    entries
        .iter()
        .filter_map(|(key, entry)| match FilterSpec::deserialize(entry) {
            Ok(spec) => Some((key.clone(), spec)),
            Err(e) => {
                tracing::warn!("Discarding unreadable filter {}.{}: {}", section, key, e);
                None
            }
        })
        .collect()
}

/// One filter entry.
///
/// Serialized untagged: `{"exact": v}`, `{"values": [..], "includeNull": b}` or
/// `{"operator": "range", "start": .., "end": .., "includeNull": b}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    Date(DateFilter),
    Values {
        values: Vec<String>,
        #[serde(default, rename = "includeNull", alias = "include_null", skip_serializing_if = "is_false")]
        include_null: bool,
    },
    Exact {
        exact: String,
    },
}

fn is_false(value: &bool) -> bool { !*value }

impl FilterSpec {
    pub fn exact(value: impl Into<String>) -> Self { FilterSpec::Exact { exact: value.into() } }

    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterSpec::Values { values: values.into_iter().map(Into::into).collect(), include_null: false }
    }

    /// A value list with no non-empty entry. Such an entry selects nothing and filters nothing.
    pub fn is_empty_selection(&self) -> bool { matches!(self, FilterSpec::Values { values, .. } if values.iter().all(String::is_empty)) }

    pub fn include_null(&self) -> bool {
        match self {
            FilterSpec::Date(date) => date.include_null,
            FilterSpec::Values { include_null, .. } => *include_null,
            FilterSpec::Exact { .. } => false,
        }
    }

    /// Sets the include-null flag. `Exact` cannot carry it and is returned unchanged.
    pub fn with_include_null(mut self, flag: bool) -> Self {
        match &mut self {
            FilterSpec::Date(date) => date.include_null = flag,
            FilterSpec::Values { include_null, .. } => *include_null = flag,
            FilterSpec::Exact { .. } => {}
        }
        self
    }
}

impl From<DateFilter> for FilterSpec {
    fn from(date: DateFilter) -> Self { FilterSpec::Date(date) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateOperator {
    Exact,
    Gte,
    Lte,
    Range,
}

impl fmt::Display for DateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DateOperator::Exact => "exact",
            DateOperator::Gte => "gte",
            DateOperator::Lte => "lte",
            DateOperator::Range => "range",
        })
    }
}

/// Date comparison. `exact`/`gte`/`lte` read `value`; `range` reads `start` and/or `end`.
///
/// A stored entry without `operator` is an exact-date filter, as long as it carries at least one of
/// `value`, `start` or `end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredDateFilter")]
pub struct DateFilter {
    pub operator: DateOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, rename = "includeNull", alias = "include_null", skip_serializing_if = "is_false")]
    pub include_null: bool,
}

#[derive(Deserialize)]
struct StoredDateFilter {
    #[serde(default)]
    operator: Option<DateOperator>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default, rename = "includeNull", alias = "include_null")]
    include_null: bool,
}

impl TryFrom<StoredDateFilter> for DateFilter {
    type Error = &'static str;

    fn try_from(stored: StoredDateFilter) -> Result<Self, Self::Error> {
        let StoredDateFilter { operator, value, start, end, include_null } = stored;
        if operator.is_none() && value.is_none() && start.is_none() && end.is_none() {
            return Err("not a date filter");
        }
        Ok(DateFilter { operator: operator.unwrap_or(DateOperator::Exact), value, start, end, include_null })
    }
}

impl DateFilter {
    fn with_operator(operator: DateOperator) -> Self { DateFilter { operator, value: None, start: None, end: None, include_null: false } }

    pub fn on(value: impl Into<String>) -> Self { DateFilter { value: Some(value.into()), ..Self::with_operator(DateOperator::Exact) } }

    pub fn gte(value: impl Into<String>) -> Self { DateFilter { value: Some(value.into()), ..Self::with_operator(DateOperator::Gte) } }

    pub fn lte(value: impl Into<String>) -> Self { DateFilter { value: Some(value.into()), ..Self::with_operator(DateOperator::Lte) } }

    pub fn range(start: Option<&str>, end: Option<&str>) -> Self {
        DateFilter { start: start.map(str::to_owned), end: end.map(str::to_owned), ..Self::with_operator(DateOperator::Range) }
    }

    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        DateFilter { start: Some(start.into()), end: Some(end.into()), ..Self::with_operator(DateOperator::Range) }
    }

    pub fn or_null(mut self) -> Self {
        self.include_null = true;
        self
    }

    /// Parsed bounds as `(lower, upper)` inclusive; `None` on a side means unbounded.
    /// Unparsable values are treated as absent.
    pub fn bounds(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let value = self.value.as_deref().and_then(parse_date);
        match self.operator {
            DateOperator::Exact => (value, value),
            DateOperator::Gte => (value, None),
            DateOperator::Lte => (None, value),
            DateOperator::Range => (self.start.as_deref().and_then(parse_date), self.end.as_deref().and_then(parse_date)),
        }
    }
}

/// Which part of a date filter a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateBound {
    Value,
    Start,
    End,
}

impl fmt::Display for DateBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DateBound::Value => "value",
            DateBound::Start => "start",
            DateBound::End => "end",
        })
    }
}

/// Parses an ISO-8601 calendar date (`YYYY-MM-DD`).
pub fn parse_date(value: &str) -> Option<NaiveDate> { NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok() }
