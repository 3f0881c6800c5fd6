//! Persistence collaborator boundary.
//!
//! The import core never talks to a concrete database; it consumes the
//! [`ContentStore`] trait, which exposes the post/term/attachment/user
//! operations the pipeline needs with find-or-create semantics. Two
//! backends ship with the crate: [`memory::MemoryStore`] for tests and dry
//! runs, and [`postgres::PgStore`] for real imports.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A persisted post-like entity (course, lesson, question).
#[derive(Debug, Clone)]
pub struct PostRecord {
    pub id: i64,
    pub post_type: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub author_id: Option<i64>,
    pub meta: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Scalar fields for a post create-or-update.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub post_type: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub author_id: Option<i64>,
    pub meta: Vec<(String, String)>,
}

/// A taxonomy term with optional parent linkage.
#[derive(Debug, Clone)]
pub struct TermRecord {
    pub id: i64,
    pub taxonomy: String,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i64>,
}

/// Key for a single-term lookup under a parent node.
///
/// Owner-scoped taxonomies query by slug (the scope is baked into the
/// slug); everything else queries by the human-readable name.
#[derive(Debug, Clone, Copy)]
pub enum TermLookup<'a> {
    Name { name: &'a str, parent: Option<i64> },
    Slug { slug: &'a str, parent: Option<i64> },
}

/// Metadata for a new attachment; the payload bytes travel separately.
#[derive(Debug, Clone, Default)]
pub struct NewAttachment {
    pub file_name: String,
    pub source_url: Option<String>,
    pub fingerprint: Option<String>,
    pub mime_type: Option<String>,
}

/// A persisted user account.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Elevated accounts skip owner-scoping of taxonomy term slugs.
    pub elevated: bool,
}

/// Operations the import core requires from the host persistence layer.
///
/// All lookups are point reads; all creates return the persisted id. The
/// engine assumes single-writer batches, so no operation needs to defend
/// against concurrent creation of the same entity.
#[async_trait]
pub trait ContentStore: Send + Sync {
    // Posts
    async fn find_post_by_meta(
        &self,
        post_type: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<i64>, StoreError>;
    async fn find_post_by_slug(
        &self,
        post_type: &str,
        slug: &str,
    ) -> Result<Option<i64>, StoreError>;
    async fn get_post(&self, id: i64) -> Result<Option<PostRecord>, StoreError>;
    async fn create_post(&self, post: &NewPost) -> Result<i64, StoreError>;
    async fn update_post(&self, id: i64, post: &NewPost) -> Result<(), StoreError>;
    async fn set_post_meta(&self, post_id: i64, key: &str, value: &str)
        -> Result<(), StoreError>;
    async fn set_post_terms(
        &self,
        post_id: i64,
        taxonomy: &str,
        term_ids: &[i64],
    ) -> Result<(), StoreError>;
    async fn set_featured_image(
        &self,
        post_id: i64,
        attachment_id: i64,
    ) -> Result<(), StoreError>;

    // Terms
    async fn find_term(
        &self,
        taxonomy: &str,
        lookup: TermLookup<'_>,
    ) -> Result<Option<TermRecord>, StoreError>;
    async fn create_term(
        &self,
        taxonomy: &str,
        name: &str,
        slug: &str,
        parent_id: Option<i64>,
    ) -> Result<TermRecord, StoreError>;

    // Attachments
    /// Reverse lookup by stored file name; `file_name` matches the last
    /// path segment of the stored location.
    async fn find_attachment_by_file_name(
        &self,
        file_name: &str,
    ) -> Result<Option<i64>, StoreError>;
    async fn find_attachment_by_url(&self, url: &str) -> Result<Option<i64>, StoreError>;
    async fn find_attachment_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<i64>, StoreError>;
    async fn create_attachment(
        &self,
        attachment: &NewAttachment,
        bytes: Vec<u8>,
    ) -> Result<i64, StoreError>;

    // Users
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError>;
    async fn get_user(&self, id: i64) -> Result<Option<UserRecord>, StoreError>;
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, StoreError>;
}
