//! SQLite backend for the tabula list engine
//!
//! Stores custom attribute definitions, options and values next to the base entity tables, persists
//! list preferences, and compiles filter documents and sort specifiers into SQL over the base tables.
//!
//! - Attribute filters compile to `EXISTS` probes, so multi-valued attributes never duplicate rows
//! - Every list query is restricted to one organization
//! - Preference writes are single-statement upserts and converge under concurrent saves
//!
//! # SQLite Version Requirements
//!
//! `NULLS FIRST` / `NULLS LAST` ordering needs SQLite 3.30 and `RETURNING` needs 3.35. The
//! `rusqlite` crate with the "bundled" feature includes a compatible SQLite version.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabula_core::ListTypeRegistry;
//! use tabula_storage_sqlite::{ListRequest, SqliteConfig, SqliteStorage};
//!
//! let storage = SqliteStorage::open(SqliteConfig::file("lists.db"), ListTypeRegistry::builtin()).await?;
//! let view = storage.list(&ListRequest::new(org, Some(user), "encounter_list", QueryParams::parse(query_string))).await?;
//! ```

pub mod annotation;
mod catalog;
pub mod compiler;
pub mod config;
mod connection;
mod engine;
mod error;
mod listing;
mod preference;
pub mod query;
pub mod schema;
pub mod sql_builder;
mod value;
mod values;

pub use config::SqliteConfig;
pub use connection::{Location, PooledConnection, SqliteConnectionManager};
pub use engine::SqliteStorage;
pub use error::SqliteError;
pub use listing::{FilterSource, ListRequest, ListView};
pub use query::{ListQuery, ListRow};
pub use value::SqliteValue;
