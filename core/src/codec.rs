//! Mapping between a [`FilterDocument`] and flat URL query parameters.
//!
//! Key layout:
//!
//! | document entry | keys |
//! |---|---|
//! | model field `exact` | `filter_<field>=<value>` |
//! | model field `values` | `filter_<field>=<a,b>` (one value is written `a,`) |
//! | attribute `values` | `filter_attr_<id_with_underscores>=<a,b>` |
//! | date `range` | `..._start=<date>` and/or `..._end=<date>` |
//! | date `exact` / `gte` / `lte` | `..._on=` / `..._gte=` / `..._lte=` |
//! | `includeNull` | `..._null=true` |
//!
//! `filter_mode=custom` marks the URL as the owner of filtering: saved filters are not re-applied.
//! Decoding never fails; a key carrying a bad attribute id or date is skipped on its own.
//! [`decode_as_written`] keeps the bad date instead, for callers that report it.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use tracing::warn;
use url::form_urlencoded;

use crate::annotation::{parse_underscored, underscored};
use crate::filter::{parse_date, DateFilter, DateOperator, FilterDocument, FilterSpec};
use crate::ids::AttributeId;
use crate::sort::ColumnId;

pub const FILTER_PREFIX: &str = "filter_";
pub const ATTRIBUTE_PREFIX: &str = "filter_attr_";
pub const FILTER_MODE_KEY: &str = "filter_mode";
pub const SORT_KEY: &str = "sort";
pub const PAGE_KEY: &str = "page";

const START: &str = "_start";
const END: &str = "_end";
const ON: &str = "_on";
const GTE: &str = "_gte";
const LTE: &str = "_lte";
const NULL: &str = "_null";

/// Key suffixes with a meaning of their own. Registered field names may not end with these.
pub const RESERVED_SUFFIXES: [&str; 6] = [START, END, ON, GTE, LTE, NULL];

/// Ordered multimap of raw request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: IndexMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self { Self::default() }

    /// Parses an `application/x-www-form-urlencoded` query string (without the leading `?`).
    pub fn parse(query: &str) -> Self { form_urlencoded::parse(query.trim_start_matches('?').as_bytes()).into_owned().collect() }

    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.params {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }

    pub fn get(&self, key: &str) -> Option<&str> { self.params.get(key).and_then(|v| v.first()).map(String::as_str) }

    pub fn get_all(&self, key: &str) -> &[String] { self.params.get(key).map(Vec::as_slice).unwrap_or(&[]) }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) { self.params.entry(key.into()).or_default().push(value.into()); }

    /// Replaces every value of `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) { self.params.insert(key.into(), vec![value.into()]); }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> { self.params.shift_remove(key) }

    pub fn contains_key(&self, key: &str) -> bool { self.params.contains_key(key) }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) { self.params.retain(|k, _| keep(k.as_str())); }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> { self.params.iter().map(|(k, v)| (k.as_str(), v.as_slice())) }

    pub fn is_empty(&self) -> bool { self.params.is_empty() }

    /// Whether any filter key (other than the mode flag) carries a non-empty value.
    pub fn has_filters(&self) -> bool { self.iter().any(|(k, v)| is_filter_key(k) && v.iter().any(|v| !v.is_empty())) }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.append(k, v);
        }
        params
    }
}

fn is_filter_key(key: &str) -> bool { key.starts_with(FILTER_PREFIX) && key != FILTER_MODE_KEY }

/// Who decides which filters apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// URL filters when present, the saved filters otherwise.
    Default,
    /// Only the URL's filters, even when there are none.
    Custom,
}

impl FilterMode {
    pub fn from_params(params: &QueryParams) -> Self {
        match params.get(FILTER_MODE_KEY) {
            Some("custom") => FilterMode::Custom,
            _ => FilterMode::Default,
        }
    }
}

/// Prefix shared by every key of one column.
pub fn key_prefix(column: &ColumnId) -> String {
    match column {
        ColumnId::Field(name) => format!("{FILTER_PREFIX}{name}"),
        ColumnId::Attribute(id) => format!("{ATTRIBUTE_PREFIX}{}", underscored(*id)),
    }
}

/// Every key a filter on `column` may occupy.
pub fn filter_keys_for_column(column: &ColumnId) -> Vec<String> {
    let prefix = key_prefix(column);
    std::iter::once(prefix.clone()).chain(RESERVED_SUFFIXES.iter().map(|suffix| format!("{prefix}{suffix}"))).collect()
}

pub fn encode(doc: &FilterDocument) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, spec) in &doc.model_fields {
        encode_entry(&mut out, &key_prefix(&ColumnId::Field(name.clone())), spec, true);
    }
    for (key, spec) in &doc.custom_attributes {
        match key.parse::<AttributeId>() {
            Ok(id) => encode_entry(&mut out, &key_prefix(&ColumnId::Attribute(id)), spec, false),
            Err(_) => warn!("Not encoding filter with invalid attribute id {:?}", key),
        }
    }
    out
}

fn encode_entry(out: &mut BTreeMap<String, String>, prefix: &str, spec: &FilterSpec, model_field: bool) {
    match spec {
        FilterSpec::Exact { exact } => {
            out.insert(prefix.to_owned(), exact.clone());
        }
        FilterSpec::Values { values, include_null } => {
            let mut joined = values.join(",");
            if values.is_empty() || (model_field && values.len() == 1) {
                joined.push(',');
            }
            out.insert(prefix.to_owned(), joined);
            if *include_null {
                out.insert(format!("{prefix}{NULL}"), "true".to_owned());
            }
        }
        FilterSpec::Date(date) => {
            let mut put = |suffix: &str, value: &Option<String>| {
                if let Some(value) = value {
                    out.insert(format!("{prefix}{suffix}"), value.clone());
                }
            };
            match date.operator {
                DateOperator::Range => {
                    put(START, &date.start);
                    put(END, &date.end);
                }
                DateOperator::Exact => put(ON, &date.value),
                DateOperator::Gte => put(GTE, &date.value),
                DateOperator::Lte => put(LTE, &date.value),
            }
            if date.include_null {
                out.insert(format!("{prefix}{NULL}"), "true".to_owned());
            }
        }
    }
}

#[derive(Default)]
struct Parts {
    plain: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    on: Option<String>,
    gte: Option<String>,
    lte: Option<String>,
    include_null: bool,
}

impl Parts {
    fn has_date(&self) -> bool { self.start.is_some() || self.end.is_some() || self.on.is_some() || self.gte.is_some() || self.lte.is_some() }

    fn into_spec(self, model_field: bool) -> Option<FilterSpec> {
        if self.has_date() {
            let date = if self.start.is_some() || self.end.is_some() {
                DateFilter { start: self.start, end: self.end, ..DateFilter::range(None, None) }
            } else if let Some(value) = self.on {
                DateFilter::on(value)
            } else if let Some(value) = self.gte {
                DateFilter::gte(value)
            } else {
                DateFilter::lte(self.lte?)
            };
            return Some(FilterSpec::Date(DateFilter { include_null: self.include_null, ..date }));
        }
        if self.plain.is_empty() {
            return self.include_null.then(|| FilterSpec::Values { values: Vec::new(), include_null: true });
        }
        let raw = self.plain.join(",");
        if model_field && !raw.contains(',') {
            return Some(FilterSpec::exact(raw));
        }
        let values = raw.split(',').map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned).collect();
        Some(FilterSpec::Values { values, include_null: self.include_null })
    }
}

/// Splits `rest` (a key without its prefix) into the column part and its suffix, if any.
fn split_suffix(rest: &str) -> (&str, Option<&'static str>) {
    for suffix in RESERVED_SUFFIXES {
        if let Some(base) = rest.strip_suffix(suffix) {
            return (base, Some(suffix));
        }
    }
    (rest, None)
}

pub fn decode(params: &QueryParams) -> FilterDocument { decode_with(params, false) }

/// Like [`decode`], but date values are kept verbatim whether or not they parse, so strict
/// validation can report them.
pub fn decode_as_written(params: &QueryParams) -> FilterDocument { decode_with(params, true) }

fn decode_with(params: &QueryParams, keep_bad_dates: bool) -> FilterDocument {
    let mut fields: BTreeMap<String, Parts> = BTreeMap::new();
    let mut attributes: BTreeMap<AttributeId, Parts> = BTreeMap::new();

    for (key, values) in params.iter() {
        if !is_filter_key(key) {
            continue;
        }
        let values: Vec<&String> = values.iter().filter(|v| !v.trim().is_empty()).collect();
        if values.is_empty() {
            continue;
        }

        let parts = if let Some(rest) = key.strip_prefix(ATTRIBUTE_PREFIX) {
            let (base, _) = split_suffix(rest);
            let Some(id) = parse_underscored(base) else {
                warn!("Ignoring filter key with invalid attribute id: {}", key);
                continue;
            };
            attributes.entry(id).or_default()
        } else {
            let rest = &key[FILTER_PREFIX.len()..];
            let (base, _) = split_suffix(rest);
            if base.is_empty() {
                continue;
            }
            fields.entry(base.to_owned()).or_default()
        };

        let suffix = split_suffix(key).1;
        let first = values[0].trim().to_owned();
        let date_slot = match suffix {
            Some(START) => Some(&mut parts.start),
            Some(END) => Some(&mut parts.end),
            Some(ON) => Some(&mut parts.on),
            Some(GTE) => Some(&mut parts.gte),
            Some(LTE) => Some(&mut parts.lte),
            Some(_) => {
                parts.include_null = matches!(first.to_ascii_lowercase().as_str(), "true" | "1");
                None
            }
            None => {
                parts.plain.extend(values.into_iter().cloned());
                None
            }
        };
        if let Some(slot) = date_slot {
            if keep_bad_dates || parse_date(&first).is_some() {
                *slot = Some(first);
            } else {
                warn!("Ignoring filter key {} with unparsable date {:?}", key, first);
            }
        }
    }

    let mut doc = FilterDocument::default();
    for (name, parts) in fields {
        if let Some(spec) = parts.into_spec(true) {
            doc.model_fields.insert(name, spec);
        }
    }
    for (id, parts) in attributes {
        if let Some(spec) = parts.into_spec(false) {
            doc.custom_attributes.insert(id.to_string(), spec);
        }
    }
    doc
}

/// Copy of `params` with every filter key (and the mode flag) removed.
fn without_filters(params: &QueryParams) -> QueryParams {
    let mut out = params.clone();
    out.retain(|k| !k.starts_with(FILTER_PREFIX));
    out
}

/// Copy of `params` whose filter keys are exactly the encoding of `doc`.
pub fn with_filters(params: &QueryParams, doc: &FilterDocument) -> QueryParams {
    let mut out = without_filters(params);
    for (key, value) in encode(doc) {
        out.set(key, value);
    }
    out
}

/// Removes all filters and takes ownership of filtering, so saved filters are not re-applied.
pub fn clear_filters(params: &QueryParams) -> QueryParams {
    let mut out = without_filters(params);
    out.remove(PAGE_KEY);
    out.set(FILTER_MODE_KEY, "custom");
    out
}

/// Removes the filter on one column and takes ownership of filtering.
pub fn remove_filter(params: &QueryParams, column: &ColumnId) -> QueryParams {
    let mut out = params.clone();
    for key in filter_keys_for_column(column) {
        out.remove(&key);
    }
    out.remove(PAGE_KEY);
    out.set(FILTER_MODE_KEY, "custom");
    out
}

/// Whether the request's effective filters differ from `saved`.
pub fn has_unsaved_filters(params: &QueryParams, saved: &FilterDocument) -> bool {
    if FilterMode::from_params(params) == FilterMode::Default && !params.has_filters() {
        return false;
    }
    decode(params) != *saved
}

/// Redirect target that makes `saved` visible in the URL, when the request carries no filters of
/// its own and saved filters exist. `None` when no redirect is needed.
pub fn canonical_params_with_saved_filters(params: &QueryParams, saved: &FilterDocument) -> Option<QueryParams> {
    if saved.is_empty() || params.has_filters() || FilterMode::from_params(params) == FilterMode::Custom {
        return None;
    }
    Some(with_filters(params, saved))
}
