pub mod annotation;
pub mod attribute;
pub mod catalog;
pub mod codec;
pub mod columns;
pub mod config;
pub mod display;
pub mod error;
pub mod filter;
pub mod ids;
pub mod pagination;
pub mod preference;
pub mod registry;
pub mod sort;
pub mod validation;

pub use catalog::{Catalog, CatalogSnapshot, MemoryCatalog};
pub use config::ListConfig;
pub use filter::{DateFilter, DateOperator, FilterDocument, FilterSpec};
pub use preference::{ListPreference, PreferenceStore, PreferenceUpdate, ResolvedPreference, Scope, StoredPreference};
pub use registry::ListTypeRegistry;
pub use sort::{ColumnId, SortSpec};
