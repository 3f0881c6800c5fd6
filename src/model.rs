//! Record models: one sanitized row bound to a persistence lifecycle.
//!
//! Kind-specific behavior (existence probing, create-or-update, which
//! references to resolve) lives behind the [`KindSpec`] strategy trait
//! with one implementation per record kind, selected through
//! [`spec_for`]. A [`PortRecord`] moves through a one-way lifecycle:
//! constructed, then valid or invalid (decided once), then synced or
//! sync-failed; `sync` consumes the record so it cannot run twice.
//!
//! Partial failure is deliberate: when a reference fails to resolve the
//! post keeps its scalar fields and the failure is reported as an issue on
//! the row, never silently dropped.

use async_trait::async_trait;

use crate::config::{
    COURSE_CATEGORY_TAXONOMY, LESSON_TAG_TAXONOMY, MODULE_TAXONOMY, QUESTION_CATEGORY_TAXONOMY,
    Taxonomies,
};
use crate::error::{ImportError, ImportIssue};
use crate::fetch::RemoteFetcher;
use crate::record::{RawRecord, SanitizedRecord};
use crate::resolve::{Resolver, TermOwner};
use crate::sanitize;
use crate::schema::{RecordKind, schema_for};
use crate::store::{ContentStore, NewPost, StoreError, UserRecord};

/// Meta key carrying the source row's external identifier.
pub const IMPORT_ID_META: &str = "_import_id";

/// Collaborators a sync needs.
pub struct SyncContext<'a> {
    pub store: &'a dyn ContentStore,
    pub fetcher: &'a dyn RemoteFetcher,
    pub taxonomies: &'a Taxonomies,
}

impl<'a> SyncContext<'a> {
    pub fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.store, self.fetcher, self.taxonomies)
    }
}

/// Result of syncing one record.
#[derive(Debug)]
pub struct SyncOutcome {
    /// Persisted post id; `None` when the main upsert itself failed.
    pub post_id: Option<i64>,
    /// True when the post was newly created rather than updated.
    pub created: bool,
    pub issues: Vec<ImportIssue>,
}

/// Kind-specific import behavior.
#[async_trait]
pub trait KindSpec: Send + Sync {
    fn kind(&self) -> RecordKind;

    /// Probe for a pre-existing target post. Called once, at record
    /// construction, and only for valid records.
    async fn existing_post_id(
        &self,
        store: &dyn ContentStore,
        record: &SanitizedRecord,
    ) -> Result<Option<i64>, StoreError>;

    /// Create or update the target entity and resolve its references.
    async fn sync(
        &self,
        ctx: &SyncContext<'_>,
        record: &SanitizedRecord,
        existing: Option<i64>,
    ) -> SyncOutcome;
}

static COURSE_SPEC: CourseSpec = CourseSpec;
static LESSON_SPEC: LessonSpec = LessonSpec;
static QUESTION_SPEC: QuestionSpec = QuestionSpec;

/// Strategy registry keyed on record kind.
pub fn spec_for(kind: RecordKind) -> &'static dyn KindSpec {
    match kind {
        RecordKind::Course => &COURSE_SPEC,
        RecordKind::Lesson => &LESSON_SPEC,
        RecordKind::Question => &QUESTION_SPEC,
    }
}

/// One sanitized row bound to its persistence lifecycle.
#[derive(Debug)]
pub struct PortRecord {
    kind: RecordKind,
    record: SanitizedRecord,
    existing: Option<i64>,
    validation: Vec<ImportIssue>,
}

impl PortRecord {
    /// Sanitize a raw row and, when valid, probe for its target post.
    pub async fn from_raw(
        kind: RecordKind,
        raw: &RawRecord,
        store: &dyn ContentStore,
    ) -> Result<Self, StoreError> {
        let schema = schema_for(kind);
        let record = SanitizedRecord::from_raw(raw, schema);
        let validation = record.validation_errors(schema);

        let existing = if validation.is_empty() {
            spec_for(kind).existing_post_id(store, &record).await?
        } else {
            None
        };

        Ok(Self {
            kind,
            record,
            existing,
            validation,
        })
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn is_valid(&self) -> bool {
        self.validation.is_empty()
    }

    pub fn validation_issues(&self) -> &[ImportIssue] {
        &self.validation
    }

    pub fn existing_post_id(&self) -> Option<i64> {
        self.existing
    }

    /// Synchronize the record into the store. Consumes the record; a
    /// record can be synced at most once, retrying is the caller's call.
    pub async fn sync(self, ctx: &SyncContext<'_>) -> SyncOutcome {
        if !self.is_valid() {
            return SyncOutcome {
                post_id: None,
                created: false,
                issues: self.validation,
            };
        }

        spec_for(self.kind)
            .sync(ctx, &self.record, self.existing)
            .await
    }
}

/// Shared existence probe: external id meta first, slug second.
async fn probe_existing(
    store: &dyn ContentStore,
    kind: RecordKind,
    record: &SanitizedRecord,
) -> Result<Option<i64>, StoreError> {
    if let Some(external_id) = record.str_value("id") {
        if let Some(post_id) = store
            .find_post_by_meta(kind.post_type(), IMPORT_ID_META, external_id)
            .await?
        {
            return Ok(Some(post_id));
        }
    }

    if let Some(slug) = record.str_value("slug") {
        return store.find_post_by_slug(kind.post_type(), slug).await;
    }

    Ok(None)
}

/// Scalar post fields shared by all kinds.
fn base_post(kind: RecordKind, record: &SanitizedRecord, status: &str) -> NewPost {
    let title = record.str_value("title").unwrap_or("").to_string();
    let slug = record
        .str_value("slug")
        .map(str::to_string)
        .unwrap_or_else(|| sanitize::slugify(&title));

    let mut meta = Vec::new();
    if let Some(external_id) = record.str_value("id") {
        meta.push((IMPORT_ID_META.to_string(), external_id.to_string()));
    }
    if let Some(prerequisite) = record.str_value("prerequisite") {
        meta.push(("_prerequisite".to_string(), prerequisite.to_string()));
    }

    NewPost {
        post_type: kind.post_type().to_string(),
        title,
        slug,
        content: record.str_value("description").unwrap_or("").to_string(),
        excerpt: record.str_value("excerpt").unwrap_or("").to_string(),
        status: status.to_string(),
        author_id: None,
        meta,
    }
}

async fn upsert_post(
    store: &dyn ContentStore,
    existing: Option<i64>,
    post: &NewPost,
) -> Result<(i64, bool), StoreError> {
    match existing {
        Some(id) => {
            store.update_post(id, post).await?;
            Ok((id, false))
        }
        None => {
            let id = store.create_post(post).await?;
            Ok((id, true))
        }
    }
}

/// Comma-separated reference list, trimmed, empties dropped.
fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Resolve a list of term paths and assign the collected terms.
///
/// Each path resolves independently; a failing path records an issue on
/// `field` and the rest still apply.
async fn assign_terms(
    ctx: &SyncContext<'_>,
    post_id: i64,
    value: Option<&str>,
    taxonomy: &str,
    owner: Option<TermOwner>,
    field: &str,
    issues: &mut Vec<ImportIssue>,
) {
    let Some(value) = value else {
        return;
    };

    let resolver = ctx.resolver();
    let mut term_ids = Vec::new();

    for path in split_list(value) {
        match resolver.resolve_term(path, taxonomy, owner).await {
            Ok(resolution) => term_ids.push(resolution.term.id),
            Err(err) => issues.push(ImportIssue::new(Some(field), &err)),
        }
    }

    if term_ids.is_empty() {
        return;
    }

    if let Err(err) = ctx.store.set_post_terms(post_id, taxonomy, &term_ids).await {
        issues.push(ImportIssue::new(Some(field), &ImportError::Persistence(err)));
    }
}

/// Resolve and link a post image; failure records an issue.
async fn attach_image(
    ctx: &SyncContext<'_>,
    post_id: i64,
    source: Option<&str>,
    field: &str,
    issues: &mut Vec<ImportIssue>,
) {
    let Some(source) = source else {
        return;
    };

    if let Err(err) = ctx.resolver().resolve_attachment(source, post_id).await {
        issues.push(ImportIssue::new(Some(field), &err));
    }
}

struct CourseSpec;

#[async_trait]
impl KindSpec for CourseSpec {
    fn kind(&self) -> RecordKind {
        RecordKind::Course
    }

    async fn existing_post_id(
        &self,
        store: &dyn ContentStore,
        record: &SanitizedRecord,
    ) -> Result<Option<i64>, StoreError> {
        probe_existing(store, RecordKind::Course, record).await
    }

    async fn sync(
        &self,
        ctx: &SyncContext<'_>,
        record: &SanitizedRecord,
        existing: Option<i64>,
    ) -> SyncOutcome {
        let mut issues = Vec::new();

        // Resolving the teacher may create an account; that side effect is
        // wanted even when later steps fail.
        let mut author: Option<UserRecord> = None;
        if let Some(username) = record.str_value("teacher_username") {
            let email = record.str_value("teacher_email").unwrap_or("");
            match ctx.resolver().resolve_user(username, email).await {
                Ok(resolution) => author = Some(resolution.user),
                Err(err) => issues.push(ImportIssue::new(Some("teacher_username"), &err)),
            }
        }

        let mut post = base_post(RecordKind::Course, record, "publish");
        post.author_id = author.as_ref().map(|user| user.id);
        post.meta.push((
            "_featured".to_string(),
            record.bool_value("featured").to_string(),
        ));
        post.meta.push((
            "_notifications".to_string(),
            record.bool_value("notifications").to_string(),
        ));
        if let Some(video) = record.str_value("video") {
            post.meta.push(("_video".to_string(), video.to_string()));
        }

        let (post_id, created) = match upsert_post(ctx.store, existing, &post).await {
            Ok(result) => result,
            Err(err) => {
                issues.push(ImportIssue::new(None, &ImportError::Persistence(err)));
                return SyncOutcome {
                    post_id: None,
                    created: false,
                    issues,
                };
            }
        };

        let owner = author.as_ref().map(TermOwner::from_user);
        assign_terms(
            ctx,
            post_id,
            record.str_value("modules"),
            MODULE_TAXONOMY,
            owner,
            "modules",
            &mut issues,
        )
        .await;
        assign_terms(
            ctx,
            post_id,
            record.str_value("categories"),
            COURSE_CATEGORY_TAXONOMY,
            None,
            "categories",
            &mut issues,
        )
        .await;
        attach_image(ctx, post_id, record.str_value("image"), "image", &mut issues).await;

        SyncOutcome {
            post_id: Some(post_id),
            created,
            issues,
        }
    }
}

struct LessonSpec;

impl LessonSpec {
    /// Resolve the owning course by external id, then slug.
    async fn owning_course(
        &self,
        store: &dyn ContentStore,
        reference: &str,
    ) -> Result<Option<i64>, StoreError> {
        if let Some(id) = store
            .find_post_by_meta(
                RecordKind::Course.post_type(),
                IMPORT_ID_META,
                reference,
            )
            .await?
        {
            return Ok(Some(id));
        }

        store
            .find_post_by_slug(RecordKind::Course.post_type(), &sanitize::slugify(reference))
            .await
    }
}

#[async_trait]
impl KindSpec for LessonSpec {
    fn kind(&self) -> RecordKind {
        RecordKind::Lesson
    }

    async fn existing_post_id(
        &self,
        store: &dyn ContentStore,
        record: &SanitizedRecord,
    ) -> Result<Option<i64>, StoreError> {
        probe_existing(store, RecordKind::Lesson, record).await
    }

    async fn sync(
        &self,
        ctx: &SyncContext<'_>,
        record: &SanitizedRecord,
        existing: Option<i64>,
    ) -> SyncOutcome {
        let mut issues = Vec::new();

        // The owning course provides both the parent link and the module
        // term owner. Courses import before lessons, so an in-batch
        // reference is already persisted by the time we get here.
        let mut course_id: Option<i64> = None;
        let mut owner: Option<TermOwner> = None;
        if let Some(reference) = record.str_value("course") {
            match self.owning_course(ctx.store, reference).await {
                Ok(Some(id)) => {
                    course_id = Some(id);
                    match course_owner(ctx.store, id).await {
                        Ok(found) => owner = found,
                        Err(err) => {
                            issues.push(ImportIssue::new(
                                Some("course"),
                                &ImportError::Persistence(err),
                            ));
                        }
                    }
                }
                Ok(None) => {
                    issues.push(ImportIssue::new(
                        Some("course"),
                        &ImportError::ReferenceResolution(format!(
                            "course `{}` not found",
                            reference
                        )),
                    ));
                }
                Err(err) => {
                    issues.push(ImportIssue::new(
                        Some("course"),
                        &ImportError::Persistence(err),
                    ));
                }
            }
        }

        let status = record.str_value("status").unwrap_or("publish").to_string();
        let mut post = base_post(RecordKind::Lesson, record, &status);
        if let Some(course_id) = course_id {
            post.meta.push(("_course_id".to_string(), course_id.to_string()));
        }
        post.meta.push((
            "_preview".to_string(),
            record.bool_value("preview").to_string(),
        ));
        post.meta.push((
            "_pass_required".to_string(),
            record.bool_value("pass_required").to_string(),
        ));
        if let Some(length) = record.int_value("length") {
            post.meta.push(("_length".to_string(), length.to_string()));
        }
        if let Some(passmark) = record.float_value("passmark") {
            post.meta.push(("_passmark".to_string(), passmark.to_string()));
        }
        if let Some(complexity) = record.str_value("complexity") {
            post.meta.push(("_complexity".to_string(), complexity.to_string()));
        }
        if let Some(video) = record.str_value("video") {
            post.meta.push(("_video".to_string(), video.to_string()));
        }

        let (post_id, created) = match upsert_post(ctx.store, existing, &post).await {
            Ok(result) => result,
            Err(err) => {
                issues.push(ImportIssue::new(None, &ImportError::Persistence(err)));
                return SyncOutcome {
                    post_id: None,
                    created: false,
                    issues,
                };
            }
        };

        assign_terms(
            ctx,
            post_id,
            record.str_value("module"),
            MODULE_TAXONOMY,
            owner,
            "module",
            &mut issues,
        )
        .await;
        assign_terms(
            ctx,
            post_id,
            record.str_value("tags"),
            LESSON_TAG_TAXONOMY,
            None,
            "tags",
            &mut issues,
        )
        .await;
        attach_image(ctx, post_id, record.str_value("image"), "image", &mut issues).await;

        SyncOutcome {
            post_id: Some(post_id),
            created,
            issues,
        }
    }
}

/// Owner scope for a course's module terms: the course author.
async fn course_owner(
    store: &dyn ContentStore,
    course_id: i64,
) -> Result<Option<TermOwner>, StoreError> {
    let Some(course) = store.get_post(course_id).await? else {
        return Ok(None);
    };
    let Some(author_id) = course.author_id else {
        return Ok(None);
    };
    Ok(store
        .get_user(author_id)
        .await?
        .map(|user| TermOwner::from_user(&user)))
}

struct QuestionSpec;

#[async_trait]
impl KindSpec for QuestionSpec {
    fn kind(&self) -> RecordKind {
        RecordKind::Question
    }

    async fn existing_post_id(
        &self,
        store: &dyn ContentStore,
        record: &SanitizedRecord,
    ) -> Result<Option<i64>, StoreError> {
        probe_existing(store, RecordKind::Question, record).await
    }

    async fn sync(
        &self,
        ctx: &SyncContext<'_>,
        record: &SanitizedRecord,
        existing: Option<i64>,
    ) -> SyncOutcome {
        let mut issues = Vec::new();

        let status = record.str_value("status").unwrap_or("publish").to_string();
        let mut post = base_post(RecordKind::Question, record, &status);
        if let Some(answer) = record.str_value("answer") {
            post.meta.push(("_answer".to_string(), answer.to_string()));
        }
        if let Some(question_type) = record.str_value("type") {
            post.meta.push(("_question_type".to_string(), question_type.to_string()));
        }
        if let Some(grade) = record.int_value("grade") {
            post.meta.push(("_grade".to_string(), grade.to_string()));
        }
        post.meta.push((
            "_random_order".to_string(),
            record.bool_value("random_order").to_string(),
        ));
        if let Some(feedback) = record.str_value("feedback") {
            post.meta.push(("_feedback".to_string(), feedback.to_string()));
        }

        let (post_id, created) = match upsert_post(ctx.store, existing, &post).await {
            Ok(result) => result,
            Err(err) => {
                issues.push(ImportIssue::new(None, &ImportError::Persistence(err)));
                return SyncOutcome {
                    post_id: None,
                    created: false,
                    issues,
                };
            }
        };

        assign_terms(
            ctx,
            post_id,
            record.str_value("categories"),
            QUESTION_CATEGORY_TAXONOMY,
            None,
            "categories",
            &mut issues,
        )
        .await;
        attach_image(ctx, post_id, record.str_value("media"), "media", &mut issues).await;

        SyncOutcome {
            post_id: Some(post_id),
            created,
            issues,
        }
    }
}
