//! PostgreSQL [`ContentStore`] backend.
//!
//! Content lands in a small relational layout (posts + key/value meta,
//! terms with parent linkage, attachments with payload bytes, users).
//! Schema setup is idempotent and runs inline at connect time; imports are
//! single-writer, so upserts only guard against re-imports, not against
//! concurrent batches.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{
    ContentStore, NewAttachment, NewPost, PostRecord, StoreError, TermLookup, TermRecord,
    UserRecord,
};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL DEFAULT '',
        password_hash TEXT NOT NULL,
        elevated BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS posts (
        id BIGSERIAL PRIMARY KEY,
        post_type TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        slug TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL DEFAULT '',
        excerpt TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'publish',
        author_id BIGINT REFERENCES users(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_posts_type_slug ON posts(post_type, slug)",
    r#"CREATE TABLE IF NOT EXISTS post_meta (
        post_id BIGINT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        meta_key TEXT NOT NULL,
        meta_value TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (post_id, meta_key)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_post_meta_kv ON post_meta(meta_key, meta_value)",
    r#"CREATE TABLE IF NOT EXISTS terms (
        id BIGSERIAL PRIMARY KEY,
        taxonomy TEXT NOT NULL,
        name TEXT NOT NULL,
        slug TEXT NOT NULL,
        parent_id BIGINT REFERENCES terms(id)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_terms_taxonomy_slug ON terms(taxonomy, slug)",
    r#"CREATE TABLE IF NOT EXISTS post_terms (
        post_id BIGINT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        term_id BIGINT NOT NULL REFERENCES terms(id) ON DELETE CASCADE,
        taxonomy TEXT NOT NULL,
        PRIMARY KEY (post_id, term_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS attachments (
        id BIGSERIAL PRIMARY KEY,
        file_name TEXT NOT NULL,
        source_url TEXT,
        fingerprint TEXT,
        mime_type TEXT,
        data BYTEA NOT NULL DEFAULT ''::bytea,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_attachments_fingerprint ON attachments(fingerprint)",
];

/// PostgreSQL-backed content store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the content schema. Idempotent.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        log::info!("ensuring content schema is up to date");
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        log::info!("content schema ready");
        Ok(())
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn find_post_by_meta(
        &self,
        post_type: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"SELECT p.id FROM posts p
               JOIN post_meta m ON m.post_id = p.id
               WHERE p.post_type = $1 AND m.meta_key = $2 AND m.meta_value = $3
               ORDER BY p.id
               LIMIT 1"#,
        )
        .bind(post_type)
        .bind(key)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_post_by_slug(
        &self,
        post_type: &str,
        slug: &str,
    ) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM posts WHERE post_type = $1 AND slug = $2 ORDER BY id LIMIT 1",
        )
        .bind(post_type)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_post(&self, id: i64) -> Result<Option<PostRecord>, StoreError> {
        let row: Option<(
            i64,
            String,
            String,
            String,
            String,
            String,
            String,
            Option<i64>,
            chrono::DateTime<chrono::Utc>,
        )> = sqlx::query_as(
            r#"SELECT id, post_type, title, slug, content, excerpt, status, author_id, created_at
               FROM posts WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, post_type, title, slug, content, excerpt, status, author_id, created_at)) =
            row
        else {
            return Ok(None);
        };

        let meta_rows: Vec<(String, String)> =
            sqlx::query_as("SELECT meta_key, meta_value FROM post_meta WHERE post_id = $1")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(PostRecord {
            id,
            post_type,
            title,
            slug,
            content,
            excerpt,
            status,
            author_id,
            meta: meta_rows.into_iter().collect(),
            created_at,
        }))
    }

    async fn create_post(&self, post: &NewPost) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO posts (post_type, title, slug, content, excerpt, status, author_id)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id"#,
        )
        .bind(&post.post_type)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.status)
        .bind(post.author_id)
        .fetch_one(&self.pool)
        .await?;

        for (key, value) in &post.meta {
            self.set_post_meta(id, key, value).await?;
        }

        log::trace!("created {} post {}", post.post_type, id);
        Ok(id)
    }

    async fn update_post(&self, id: i64, post: &NewPost) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE posts
               SET title = $2, slug = $3, content = $4, excerpt = $5, status = $6,
                   author_id = COALESCE($7, author_id)
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.status)
        .bind(post.author_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("post {}", id)));
        }

        for (key, value) in &post.meta {
            self.set_post_meta(id, key, value).await?;
        }

        log::trace!("updated {} post {}", post.post_type, id);
        Ok(())
    }

    async fn set_post_meta(
        &self,
        post_id: i64,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO post_meta (post_id, meta_key, meta_value)
               VALUES ($1, $2, $3)
               ON CONFLICT (post_id, meta_key) DO UPDATE
               SET meta_value = EXCLUDED.meta_value"#,
        )
        .bind(post_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_post_terms(
        &self,
        post_id: i64,
        taxonomy: &str,
        term_ids: &[i64],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM post_terms WHERE post_id = $1 AND taxonomy = $2")
            .bind(post_id)
            .bind(taxonomy)
            .execute(&mut *tx)
            .await?;

        if !term_ids.is_empty() {
            let post_ids = vec![post_id; term_ids.len()];
            let taxonomies = vec![taxonomy.to_string(); term_ids.len()];

            sqlx::query(
                r#"INSERT INTO post_terms (post_id, term_id, taxonomy)
                   SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::text[])
                   ON CONFLICT (post_id, term_id) DO NOTHING"#,
            )
            .bind(&post_ids)
            .bind(term_ids)
            .bind(&taxonomies)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
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
        let (sql, key, parent) = match lookup {
            TermLookup::Name { name, parent } => (
                r#"SELECT id, taxonomy, name, slug, parent_id FROM terms
                   WHERE taxonomy = $1 AND name = $2 AND parent_id IS NOT DISTINCT FROM $3
                   ORDER BY id LIMIT 1"#,
                name,
                parent,
            ),
            TermLookup::Slug { slug, parent } => (
                r#"SELECT id, taxonomy, name, slug, parent_id FROM terms
                   WHERE taxonomy = $1 AND slug = $2 AND parent_id IS NOT DISTINCT FROM $3
                   ORDER BY id LIMIT 1"#,
                slug,
                parent,
            ),
        };

        let row: Option<(i64, String, String, String, Option<i64>)> = sqlx::query_as(sql)
            .bind(taxonomy)
            .bind(key)
            .bind(parent)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(id, taxonomy, name, slug, parent_id)| TermRecord {
            id,
            taxonomy,
            name,
            slug,
            parent_id,
        }))
    }

    async fn create_term(
        &self,
        taxonomy: &str,
        name: &str,
        slug: &str,
        parent_id: Option<i64>,
    ) -> Result<TermRecord, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO terms (taxonomy, name, slug, parent_id)
               VALUES ($1, $2, $3, $4)
               RETURNING id"#,
        )
        .bind(taxonomy)
        .bind(name)
        .bind(slug)
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;

        log::trace!("created term {} in {}", slug, taxonomy);
        Ok(TermRecord {
            id,
            taxonomy: taxonomy.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            parent_id,
        })
    }

    async fn find_attachment_by_file_name(
        &self,
        file_name: &str,
    ) -> Result<Option<i64>, StoreError> {
        let suffix = format!("%/{}", file_name);
        let id = sqlx::query_scalar::<_, i64>(
            r#"SELECT id FROM attachments
               WHERE file_name = $1 OR file_name LIKE $2
               ORDER BY id LIMIT 1"#,
        )
        .bind(file_name)
        .bind(&suffix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_attachment_by_url(&self, url: &str) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM attachments WHERE source_url = $1 ORDER BY id LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_attachment_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM attachments WHERE fingerprint = $1 ORDER BY id LIMIT 1",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn create_attachment(
        &self,
        attachment: &NewAttachment,
        bytes: Vec<u8>,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO attachments (file_name, source_url, fingerprint, mime_type, data)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(&attachment.file_name)
        .bind(&attachment.source_url)
        .bind(&attachment.fingerprint)
        .bind(&attachment.mime_type)
        .bind(&bytes)
        .fetch_one(&self.pool)
        .await?;

        log::trace!("stored attachment {} ({} bytes)", id, bytes.len());
        Ok(id)
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<(i64, String, String, bool)> = sqlx::query_as(
            "SELECT id, username, email, elevated FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, username, email, elevated)| UserRecord {
            id,
            username,
            email,
            elevated,
        }))
    }

    async fn get_user(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<(i64, String, String, bool)> =
            sqlx::query_as("SELECT id, username, email, elevated FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, username, email, elevated)| UserRecord {
            id,
            username,
            email,
            elevated,
        }))
    }

    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, StoreError> {
        // Generated import passwords are never handed out; store a digest
        // so the plaintext does not live in the database.
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        let digest = hasher.finalize();
        let password_hash: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO users (username, email, password_hash)
               VALUES ($1, $2, $3)
               ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username
               RETURNING id"#,
        )
        .bind(username)
        .bind(email)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await?;

        log::debug!("created user {} ({})", username, id);
        Ok(UserRecord {
            id,
            username: username.to_string(),
            email: email.to_string(),
            elevated: false,
        })
    }
}
