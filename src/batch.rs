//! Batch import orchestration.
//!
//! One batch consumes a finite sequence of source rows and produces one
//! report. Rows are grouped and processed kind by kind in dependency
//! order so later kinds can resolve entities earlier kinds persisted,
//! while the report keeps the source ordering. Failure isolation is
//! per-row: nothing a single row does can abort the batch, and entities
//! persisted by earlier rows stay persisted whatever happens later.

use serde::Serialize;

use crate::config::Taxonomies;
use crate::error::{ImportError, ImportIssue};
use crate::fetch::RemoteFetcher;
use crate::model::{PortRecord, SyncContext};
use crate::record::RawRecord;
use crate::schema::RecordKind;
use crate::store::ContentStore;

/// One raw row as handed to the importer.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub kind: RecordKind,
    pub fields: RawRecord,
}

/// Outcome of one source row, in source order.
#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub row: usize,
    pub kind: RecordKind,
    pub entity_id: Option<i64>,
    pub errors: Vec<ImportIssue>,
}

impl ImportResult {
    pub fn succeeded(&self) -> bool {
        self.entity_id.is_some() && self.errors.is_empty()
    }
}

/// Roll-up counters for a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportStats {
    pub rows: usize,
    /// Rows whose post was persisted (possibly with reference issues).
    pub imported: usize,
    /// Rows with at least one recorded issue.
    pub failed: usize,
    pub created: usize,
    pub updated: usize,
}

impl ImportStats {
    /// Merge another stats block into this one by summing all counts.
    pub fn merge(&mut self, other: &ImportStats) {
        self.rows += other.rows;
        self.imported += other.imported;
        self.failed += other.failed;
        self.created += other.created;
        self.updated += other.updated;
    }

    fn record(&mut self, result: &ImportResult, created: bool) {
        self.rows += 1;
        if result.entity_id.is_some() {
            self.imported += 1;
            if created {
                self.created += 1;
            } else {
                self.updated += 1;
            }
        }
        if !result.errors.is_empty() {
            self.failed += 1;
        }
    }
}

/// Full batch report: one result per row, source order, plus stats.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub results: Vec<ImportResult>,
    pub stats: ImportStats,
}

impl ImportReport {
    pub fn result_for_row(&self, row: usize) -> Option<&ImportResult> {
        self.results.iter().find(|result| result.row == row)
    }
}

/// Batch importer bound to its collaborators.
pub struct Importer<'a> {
    store: &'a dyn ContentStore,
    fetcher: &'a dyn RemoteFetcher,
    taxonomies: Taxonomies,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a dyn ContentStore, fetcher: &'a dyn RemoteFetcher) -> Self {
        Self::with_taxonomies(store, fetcher, Taxonomies::default())
    }

    pub fn with_taxonomies(
        store: &'a dyn ContentStore,
        fetcher: &'a dyn RemoteFetcher,
        taxonomies: Taxonomies,
    ) -> Self {
        Self {
            store,
            fetcher,
            taxonomies,
        }
    }

    /// Run one batch. Never fails as a whole: every row lands in the
    /// report, whatever happened to it.
    ///
    /// The source is consumed once up front; rows are never re-read.
    pub async fn import<I>(&self, rows: I) -> ImportReport
    where
        I: IntoIterator<Item = SourceRow>,
    {
        let rows: Vec<SourceRow> = rows.into_iter().collect();
        let total = rows.len();
        log::info!("starting import batch of {} rows", total);

        let ctx = SyncContext {
            store: self.store,
            fetcher: self.fetcher,
            taxonomies: &self.taxonomies,
        };

        let mut results: Vec<ImportResult> = Vec::with_capacity(total);
        let mut stats = ImportStats::default();

        for kind in RecordKind::DEPENDENCY_ORDER {
            let batch: Vec<(usize, &SourceRow)> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| row.kind == kind)
                .collect();

            if batch.is_empty() {
                continue;
            }
            log::info!("importing {} {} rows", batch.len(), kind);

            for (index, row) in batch {
                let (result, created) = self.import_row(&ctx, index, row).await;

                if result.errors.is_empty() {
                    log::debug!("row {} ({}) imported as {:?}", index, kind, result.entity_id);
                } else {
                    log::warn!(
                        "row {} ({}) finished with {} issue(s)",
                        index,
                        kind,
                        result.errors.len()
                    );
                }

                stats.record(&result, created);
                results.push(result);
            }
        }

        // Kind grouping shuffled processing order; reports read in source
        // order.
        results.sort_by_key(|result| result.row);

        log::info!(
            "import batch finished: {}/{} rows imported, {} with issues",
            stats.imported,
            stats.rows,
            stats.failed
        );

        ImportReport { results, stats }
    }

    async fn import_row(
        &self,
        ctx: &SyncContext<'_>,
        index: usize,
        row: &SourceRow,
    ) -> (ImportResult, bool) {
        let record = match PortRecord::from_raw(row.kind, &row.fields, self.store).await {
            Ok(record) => record,
            Err(err) => {
                // The existence probe itself failed; report the row rather
                // than guessing between create and update.
                let issue = ImportIssue::new(None, &ImportError::Persistence(err));
                return (
                    ImportResult {
                        row: index,
                        kind: row.kind,
                        entity_id: None,
                        errors: vec![issue],
                    },
                    false,
                );
            }
        };

        if !record.is_valid() {
            return (
                ImportResult {
                    row: index,
                    kind: row.kind,
                    entity_id: None,
                    errors: record.validation_issues().to_vec(),
                },
                false,
            );
        }

        let outcome = record.sync(ctx).await;
        (
            ImportResult {
                row: index,
                kind: row.kind,
                entity_id: outcome.post_id,
                errors: outcome.issues,
            },
            outcome.created,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::test_support::StubFetcher;

    fn row(kind: RecordKind, pairs: &[(&str, &str)]) -> SourceRow {
        SourceRow {
            kind,
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn report_keeps_source_order_across_kind_grouping() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let importer = Importer::new(&store, &fetcher);

        // Lesson listed before the course it references; the importer
        // still processes the course first.
        let report = importer
            .import(vec![
                row(
                    RecordKind::Lesson,
                    &[("title", "Lesson 1"), ("course", "c-1")],
                ),
                row(RecordKind::Course, &[("id", "c-1"), ("title", "Course")]),
            ])
            .await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].row, 0);
        assert_eq!(report.results[0].kind, RecordKind::Lesson);
        assert_eq!(report.results[1].row, 1);

        // The forward reference resolved because of dependency ordering.
        assert!(report.results[0].errors.is_empty());
        let lesson = store
            .get_post(report.results[0].entity_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            lesson.meta.get("_course_id"),
            Some(&report.results[1].entity_id.unwrap().to_string())
        );
    }

    #[tokio::test]
    async fn one_bad_row_does_not_stop_the_batch() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let importer = Importer::new(&store, &fetcher);

        let report = importer
            .import(vec![
                row(RecordKind::Course, &[("description", "title missing")]),
                row(RecordKind::Course, &[("title", "Fine")]),
            ])
            .await;

        assert_eq!(report.stats.rows, 2);
        assert_eq!(report.stats.imported, 1);
        assert_eq!(report.stats.failed, 1);
        assert!(report.results[0].entity_id.is_none());
        assert!(report.results[1].succeeded());
        assert_eq!(store.post_count("course"), 1);
    }

    #[tokio::test]
    async fn stats_distinguish_created_from_updated() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let importer = Importer::new(&store, &fetcher);

        let first = importer
            .import(vec![row(
                RecordKind::Course,
                &[("id", "c-1"), ("title", "Course")],
            )])
            .await;
        assert_eq!(first.stats.created, 1);
        assert_eq!(first.stats.updated, 0);

        let second = importer
            .import(vec![row(
                RecordKind::Course,
                &[("id", "c-1"), ("title", "Course v2")],
            )])
            .await;
        assert_eq!(second.stats.created, 0);
        assert_eq!(second.stats.updated, 1);
        assert_eq!(store.post_count("course"), 1);
    }

    #[test]
    fn stats_merge_sums_counts() {
        let mut a = ImportStats {
            rows: 2,
            imported: 1,
            failed: 1,
            created: 1,
            updated: 0,
        };
        let b = ImportStats {
            rows: 3,
            imported: 3,
            failed: 0,
            created: 2,
            updated: 1,
        };
        a.merge(&b);
        assert_eq!(a.rows, 5);
        assert_eq!(a.imported, 4);
        assert_eq!(a.created, 3);
    }
}
