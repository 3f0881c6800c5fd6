//! Bulk data-port engine for learning-management content.
//!
//! This crate turns external tabular records (course, lesson and
//! question rows) into validated, persisted domain objects, resolving
//! cross-references along the way and reporting per-row outcomes.
//!
//! # Architecture Overview
//!
//! The pipeline is built leaf-first:
//!
//! - **`schema`**: declarative per-kind field tables (type, default,
//!   required, pattern, HTML policy), static and immutable.
//!
//! - **`sanitize`**: pure value coercions: text/HTML cleaning, slug,
//!   email and URL normalization, permissive numeric parsing.
//!
//! - **`record`**: applies a schema to a raw row, producing a typed
//!   `SanitizedRecord` and field-localized validation errors.
//!
//! - **`store`**: the persistence collaborator boundary (`ContentStore`),
//!   with in-memory and PostgreSQL backends.
//!
//! - **`fetch`**: the remote-fetch collaborator used by attachment
//!   resolution.
//!
//! - **`resolve`**: idempotent reference resolution: hierarchical term
//!   paths, attachment sources deduplicated by URL fingerprint, teacher
//!   accounts created on demand.
//!
//! - **`model`**: binds one record to its persistence lifecycle through
//!   kind-specific strategies selected from a registry.
//!
//! - **`batch`**: orders rows by kind dependency, syncs them one by one,
//!   and aggregates the per-row report. No error crosses this boundary;
//!   a batch always completes with a full report.
//!
//! # Data Flow
//!
//! 1. **Parse**: the host (or `source` for JSON Lines) produces raw rows
//! 2. **Sanitize**: each row coerces against its kind's schema
//! 3. **Validate**: required/pattern rules decide whether a row syncs
//! 4. **Resolve**: terms, attachments and authors become persisted ids
//! 5. **Sync**: posts are created or updated, references linked
//! 6. **Report**: one result per row, in source order, plus batch stats

pub mod batch;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod record;
pub mod resolve;
pub mod sanitize;
pub mod schema;
pub mod source;
pub mod store;

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support;

pub use batch::{ImportReport, ImportResult, ImportStats, Importer, SourceRow};
pub use config::{Taxonomies, TaxonomyConfig};
pub use error::{ImportError, ImportIssue, IssueCode};
pub use fetch::{FetchError, HttpFetcher, RemoteFetcher};
pub use record::{RawRecord, SanitizedRecord, Value};
pub use schema::{RecordKind, schema_for};
pub use store::{ContentStore, StoreError};
