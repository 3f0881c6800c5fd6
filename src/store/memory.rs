//! In-memory [`ContentStore`] backend.
//!
//! Backs tests and `--dry-run` imports. A single `RwLock` guards the whole
//! state so lookups across entity maps see one consistent snapshot; ids
//! are handed out from one shared counter across entity types.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    ContentStore, NewAttachment, NewPost, PostRecord, StoreError, TermLookup, TermRecord,
    UserRecord,
};

#[derive(Debug, Clone)]
struct StoredAttachment {
    id: i64,
    file_name: String,
    source_url: Option<String>,
    fingerprint: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    posts: HashMap<i64, PostRecord>,
    post_terms: HashMap<(i64, String), Vec<i64>>,
    terms: Vec<TermRecord>,
    attachments: Vec<StoredAttachment>,
    users: Vec<UserRecord>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Volatile store; contents die with the value.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().expect("memory store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().expect("memory store lock poisoned")
    }

    /// Number of persisted posts of a type. Test observability helper.
    pub fn post_count(&self, post_type: &str) -> usize {
        self.read()
            .posts
            .values()
            .filter(|post| post.post_type == post_type)
            .count()
    }

    /// Number of terms in a taxonomy. Test observability helper.
    pub fn term_count(&self, taxonomy: &str) -> usize {
        self.read()
            .terms
            .iter()
            .filter(|term| term.taxonomy == taxonomy)
            .count()
    }

    /// Number of stored attachments. Test observability helper.
    pub fn attachment_count(&self) -> usize {
        self.read().attachments.len()
    }

    /// Stored payload of an attachment. Test observability helper.
    pub fn attachment_bytes(&self, id: i64) -> Option<Vec<u8>> {
        self.read()
            .attachments
            .iter()
            .find(|attachment| attachment.id == id)
            .map(|attachment| attachment.bytes.clone())
    }

    /// Term ids assigned to a post in a taxonomy.
    pub fn terms_for_post(&self, post_id: i64, taxonomy: &str) -> Vec<i64> {
        self.read()
            .post_terms
            .get(&(post_id, taxonomy.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Seed an existing user, for tests exercising lookup paths.
    pub fn seed_user(&self, username: &str, email: &str, elevated: bool) -> UserRecord {
        let mut state = self.write();
        let user = UserRecord {
            id: state.next_id(),
            username: username.to_string(),
            email: email.to_string(),
            elevated,
        };
        state.users.push(user.clone());
        user
    }

    /// Seed a media-library attachment, for tests exercising filename lookup.
    pub fn seed_attachment(&self, file_name: &str) -> i64 {
        let mut state = self.write();
        let id = state.next_id();
        state.attachments.push(StoredAttachment {
            id,
            file_name: file_name.to_string(),
            source_url: None,
            fingerprint: None,
            bytes: Vec::new(),
        });
        id
    }
}

fn file_name_matches(stored: &str, wanted: &str) -> bool {
    stored == wanted || stored.ends_with(&format!("/{}", wanted))
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_post_by_meta(
        &self,
        post_type: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<i64>, StoreError> {
        let state = self.read();
        Ok(state
            .posts
            .values()
            .find(|post| {
                post.post_type == post_type && post.meta.get(key).map(String::as_str) == Some(value)
            })
            .map(|post| post.id))
    }

    async fn find_post_by_slug(
        &self,
        post_type: &str,
        slug: &str,
    ) -> Result<Option<i64>, StoreError> {
        let state = self.read();
        Ok(state
            .posts
            .values()
            .find(|post| post.post_type == post_type && post.slug == slug)
            .map(|post| post.id))
    }

    async fn get_post(&self, id: i64) -> Result<Option<PostRecord>, StoreError> {
        Ok(self.read().posts.get(&id).cloned())
    }

    async fn create_post(&self, post: &NewPost) -> Result<i64, StoreError> {
        let mut state = self.write();
        let id = state.next_id();
        state.posts.insert(
            id,
            PostRecord {
                id,
                post_type: post.post_type.clone(),
                title: post.title.clone(),
                slug: post.slug.clone(),
                content: post.content.clone(),
                excerpt: post.excerpt.clone(),
                status: post.status.clone(),
                author_id: post.author_id,
                meta: post.meta.iter().cloned().collect(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn update_post(&self, id: i64, post: &NewPost) -> Result<(), StoreError> {
        let mut state = self.write();
        let existing = state
            .posts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("post {}", id)))?;

        existing.title = post.title.clone();
        existing.slug = post.slug.clone();
        existing.content = post.content.clone();
        existing.excerpt = post.excerpt.clone();
        existing.status = post.status.clone();
        if post.author_id.is_some() {
            existing.author_id = post.author_id;
        }
        for (key, value) in &post.meta {
            existing.meta.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn set_post_meta(
        &self,
        post_id: i64,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.write();
        let post = state
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| StoreError::NotFound(format!("post {}", post_id)))?;
        post.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_post_terms(
        &self,
        post_id: i64,
        taxonomy: &str,
        term_ids: &[i64],
    ) -> Result<(), StoreError> {
        let mut state = self.write();
        if !state.posts.contains_key(&post_id) {
            return Err(StoreError::NotFound(format!("post {}", post_id)));
        }
        state
            .post_terms
            .insert((post_id, taxonomy.to_string()), term_ids.to_vec());
        Ok(())
    }

    async fn set_featured_image(
        &self,
        post_id: i64,
        attachment_id: i64,
    ) -> Result<(), StoreError> {
        self.set_post_meta(post_id, "_thumbnail_id", &attachment_id.to_string())
            .await
    }

    async fn find_term(
        &self,
        taxonomy: &str,
        lookup: TermLookup<'_>,
    ) -> Result<Option<TermRecord>, StoreError> {
        let state = self.read();
        let found = state.terms.iter().find(|term| {
            term.taxonomy == taxonomy
                && match lookup {
                    TermLookup::Name { name, parent } => {
                        term.name == name && term.parent_id == parent
                    }
                    TermLookup::Slug { slug, parent } => {
                        term.slug == slug && term.parent_id == parent
                    }
                }
        });
        Ok(found.cloned())
    }

    async fn create_term(
        &self,
        taxonomy: &str,
        name: &str,
        slug: &str,
        parent_id: Option<i64>,
    ) -> Result<TermRecord, StoreError> {
        let mut state = self.write();
        let term = TermRecord {
            id: state.next_id(),
            taxonomy: taxonomy.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            parent_id,
        };
        state.terms.push(term.clone());
        Ok(term)
    }

    async fn find_attachment_by_file_name(
        &self,
        file_name: &str,
    ) -> Result<Option<i64>, StoreError> {
        let state = self.read();
        Ok(state
            .attachments
            .iter()
            .find(|attachment| file_name_matches(&attachment.file_name, file_name))
            .map(|attachment| attachment.id))
    }

    async fn find_attachment_by_url(&self, url: &str) -> Result<Option<i64>, StoreError> {
        let state = self.read();
        Ok(state
            .attachments
            .iter()
            .find(|attachment| attachment.source_url.as_deref() == Some(url))
            .map(|attachment| attachment.id))
    }

    async fn find_attachment_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<i64>, StoreError> {
        let state = self.read();
        Ok(state
            .attachments
            .iter()
            .find(|attachment| attachment.fingerprint.as_deref() == Some(fingerprint))
            .map(|attachment| attachment.id))
    }

    async fn create_attachment(
        &self,
        attachment: &NewAttachment,
        bytes: Vec<u8>,
    ) -> Result<i64, StoreError> {
        let mut state = self.write();
        let id = state.next_id();
        state.attachments.push(StoredAttachment {
            id,
            file_name: attachment.file_name.clone(),
            source_url: attachment.source_url.clone(),
            fingerprint: attachment.fingerprint.clone(),
            bytes,
        });
        Ok(id)
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let state = self.read();
        Ok(state
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn get_user(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let state = self.read();
        Ok(state.users.iter().find(|user| user.id == id).cloned())
    }

    async fn create_user(
        &self,
        username: &str,
        email: &str,
        _password: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut state = self.write();
        let user = UserRecord {
            id: state.next_id(),
            username: username.to_string(),
            email: email.to_string(),
            elevated: false,
        };
        state.users.push(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn post_meta_lookup_scopes_by_type() {
        let store = MemoryStore::new();
        let id = store
            .create_post(&NewPost {
                post_type: "course".to_string(),
                title: "Course".to_string(),
                meta: vec![("_import_id".to_string(), "c-1".to_string())],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            store
                .find_post_by_meta("course", "_import_id", "c-1")
                .await
                .unwrap(),
            Some(id)
        );
        assert_eq!(
            store
                .find_post_by_meta("lesson", "_import_id", "c-1")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn update_merges_meta_and_keeps_author_when_absent() {
        let store = MemoryStore::new();
        let id = store
            .create_post(&NewPost {
                post_type: "course".to_string(),
                title: "Before".to_string(),
                author_id: Some(7),
                meta: vec![("a".to_string(), "1".to_string())],
                ..Default::default()
            })
            .await
            .unwrap();

        store
            .update_post(
                id,
                &NewPost {
                    post_type: "course".to_string(),
                    title: "After".to_string(),
                    meta: vec![("b".to_string(), "2".to_string())],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let post = store.get_post(id).await.unwrap().unwrap();
        assert_eq!(post.title, "After");
        assert_eq!(post.author_id, Some(7));
        assert_eq!(post.meta.get("a").map(String::as_str), Some("1"));
        assert_eq!(post.meta.get("b").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn file_name_lookup_matches_last_path_segment() {
        let store = MemoryStore::new();
        let id = store.seed_attachment("2024/03/photo.png");

        assert_eq!(
            store
                .find_attachment_by_file_name("photo.png")
                .await
                .unwrap(),
            Some(id)
        );
        assert_eq!(
            store.find_attachment_by_file_name("hoto.png").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn term_lookup_distinguishes_parents() {
        let store = MemoryStore::new();
        let root = store
            .create_term("module", "Basics", "basics", None)
            .await
            .unwrap();
        store
            .create_term("module", "Basics", "basics-child", Some(root.id))
            .await
            .unwrap();

        let at_root = store
            .find_term(
                "module",
                TermLookup::Name {
                    name: "Basics",
                    parent: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(at_root.id, root.id);

        let nested = store
            .find_term(
                "module",
                TermLookup::Name {
                    name: "Basics",
                    parent: Some(root.id),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_ne!(nested.id, root.id);
    }
}
