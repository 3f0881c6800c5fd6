//! End-to-end pipeline tests against the in-memory store.

use courseport::record::RawRecord;
use courseport::schema::RecordKind;
use courseport::store::ContentStore;
use courseport::store::memory::MemoryStore;
use courseport::test_support::StubFetcher;
use courseport::{Importer, IssueCode, SourceRow};

fn row(kind: RecordKind, pairs: &[(&str, &str)]) -> SourceRow {
    let fields: RawRecord = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    SourceRow { kind, fields }
}

#[tokio::test]
async fn duplicate_module_paths_create_each_term_once() {
    let store = MemoryStore::new();
    let fetcher = StubFetcher::new();
    let importer = Importer::new(&store, &fetcher);

    let report = importer
        .import(vec![
            row(
                RecordKind::Course,
                &[("title", "First"), ("modules", "Module A > Submodule B")],
            ),
            row(
                RecordKind::Course,
                &[("title", "Second"), ("modules", "Module A > Submodule B")],
            ),
        ])
        .await;

    assert_eq!(report.stats.imported, 2);
    // Exactly one "Module A" and one "Submodule B", parented.
    assert_eq!(store.term_count("module"), 2);

    let first_terms = store.terms_for_post(report.results[0].entity_id.unwrap(), "module");
    let second_terms = store.terms_for_post(report.results[1].entity_id.unwrap(), "module");
    assert_eq!(first_terms, second_terms);
}

#[tokio::test]
async fn missing_title_reports_validation_and_creates_nothing() {
    let store = MemoryStore::new();
    let fetcher = StubFetcher::new();
    let importer = Importer::new(&store, &fetcher);

    let report = importer
        .import(vec![row(
            RecordKind::Course,
            &[("description", "An untitled course")],
        )])
        .await;

    let result = &report.results[0];
    assert!(result.entity_id.is_none());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, IssueCode::Validation);
    assert_eq!(result.errors[0].field.as_deref(), Some("title"));
    assert_eq!(store.post_count("course"), 0);
}

#[tokio::test]
async fn broken_attachment_url_keeps_scalar_fields() {
    let store = MemoryStore::new();
    let fetcher = StubFetcher::new().with_status("https://example.com/gone.png", 404);
    let importer = Importer::new(&store, &fetcher);

    let report = importer
        .import(vec![row(
            RecordKind::Course,
            &[
                ("title", "Course with broken image"),
                ("image", "https://example.com/gone.png"),
            ],
        )])
        .await;

    let result = &report.results[0];
    // The post persisted even though the image could not be fetched.
    let post_id = result.entity_id.expect("post persisted");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, IssueCode::Fetch);
    assert_eq!(result.errors[0].field.as_deref(), Some("image"));

    let post = store.get_post(post_id).await.unwrap().unwrap();
    assert_eq!(post.title, "Course with broken image");
    assert!(post.meta.get("_thumbnail_id").is_none());
}

#[tokio::test]
async fn attachment_urls_are_fetched_once_across_rows() {
    let store = MemoryStore::new();
    let fetcher =
        StubFetcher::new().with_file("https://example.com/shared.png", b"PNGDATA".to_vec());
    let importer = Importer::new(&store, &fetcher);

    let report = importer
        .import(vec![
            row(
                RecordKind::Course,
                &[("title", "A"), ("image", "https://example.com/shared.png")],
            ),
            row(
                RecordKind::Course,
                &[("title", "B"), ("image", "https://example.com/shared.png")],
            ),
        ])
        .await;

    assert_eq!(report.stats.imported, 2);
    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(store.attachment_count(), 1);
}

#[tokio::test]
async fn lesson_resolves_course_listed_after_it() {
    let store = MemoryStore::new();
    let fetcher = StubFetcher::new();
    let importer = Importer::new(&store, &fetcher);

    let report = importer
        .import(vec![
            row(
                RecordKind::Lesson,
                &[
                    ("id", "l-1"),
                    ("title", "Ownership"),
                    ("course", "c-1"),
                    ("module", "Basics"),
                ],
            ),
            row(
                RecordKind::Question,
                &[
                    ("title", "What moves?"),
                    ("answer", "Values without Copy"),
                ],
            ),
            row(
                RecordKind::Course,
                &[
                    ("id", "c-1"),
                    ("title", "Rust 101"),
                    ("teacher_username", "ferris"),
                    ("modules", "Basics"),
                ],
            ),
        ])
        .await;

    assert_eq!(report.stats.rows, 3);
    assert_eq!(report.stats.failed, 0, "results: {:?}", report.results);

    // Lesson and course share the very same module term: the course
    // created it (scoped by its teacher) and the lesson found it again
    // through the course's author.
    let lesson_id = report.results[0].entity_id.unwrap();
    let course_id = report.results[2].entity_id.unwrap();
    let lesson_terms = store.terms_for_post(lesson_id, "module");
    let course_terms = store.terms_for_post(course_id, "module");
    assert_eq!(lesson_terms, course_terms);
    assert_eq!(store.term_count("module"), 1);
}

#[tokio::test]
async fn reimport_updates_in_place() {
    let store = MemoryStore::new();
    let fetcher = StubFetcher::new();
    let importer = Importer::new(&store, &fetcher);

    let rows = vec![
        row(
            RecordKind::Course,
            &[("id", "c-1"), ("title", "Rust 101"), ("modules", "Basics")],
        ),
        row(
            RecordKind::Lesson,
            &[("id", "l-1"), ("title", "Ownership"), ("course", "c-1")],
        ),
    ];

    let first = importer.import(rows.clone()).await;
    assert_eq!(first.stats.created, 2);

    let second = importer.import(rows).await;
    assert_eq!(second.stats.created, 0);
    assert_eq!(second.stats.updated, 2);

    assert_eq!(store.post_count("course"), 1);
    assert_eq!(store.post_count("lesson"), 1);
    assert_eq!(store.term_count("module"), 1);
}

#[tokio::test]
async fn malformed_status_is_rejected_with_field_error() {
    let store = MemoryStore::new();
    let fetcher = StubFetcher::new();
    let importer = Importer::new(&store, &fetcher);

    let report = importer
        .import(vec![row(
            RecordKind::Lesson,
            &[("title", "Lesson"), ("status", "scheduled")],
        )])
        .await;

    let result = &report.results[0];
    assert!(result.entity_id.is_none());
    assert_eq!(result.errors[0].code, IssueCode::Validation);
    assert_eq!(result.errors[0].field.as_deref(), Some("status"));
    assert_eq!(store.post_count("lesson"), 0);
}

#[tokio::test]
async fn jsonl_file_feeds_a_full_batch() {
    use std::io::{BufReader, Write};

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{"kind":"course","id":"c-1","title":"Rust 101","modules":"Basics"}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"kind":"lesson","title":"Ownership","course":"c-1","length":45}}"#
    )
    .unwrap();

    let rows = courseport::source::read_rows(BufReader::new(file.reopen().unwrap())).unwrap();
    assert_eq!(rows.len(), 2);

    let store = MemoryStore::new();
    let fetcher = StubFetcher::new();
    let importer = Importer::new(&store, &fetcher);
    let report = importer.import(rows).await;

    assert_eq!(report.stats.imported, 2);
    assert_eq!(report.stats.failed, 0);
    assert_eq!(store.post_count("course"), 1);
    assert_eq!(store.post_count("lesson"), 1);
}

#[tokio::test]
async fn local_media_reference_links_existing_attachment() {
    let store = MemoryStore::new();
    let attachment = store.seed_attachment("2024/06/diagram.png");
    let fetcher = StubFetcher::new();
    let importer = Importer::new(&store, &fetcher);

    let report = importer
        .import(vec![row(
            RecordKind::Question,
            &[
                ("title", "Borrowing"),
                ("answer", "Shared xor mutable"),
                ("media", "diagram.png"),
            ],
        )])
        .await;

    let result = &report.results[0];
    assert!(result.errors.is_empty());
    let post = store.get_post(result.entity_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(
        post.meta.get("_thumbnail_id").map(String::as_str),
        Some(attachment.to_string().as_str())
    );
    assert_eq!(fetcher.fetch_count(), 0);
}
