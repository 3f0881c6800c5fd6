//! Cross-reference resolution.
//!
//! Human-readable references in source rows (term paths, attachment
//! sources, teacher usernames) resolve here into persisted identifiers,
//! creating missing entities on demand. Every operation is idempotent with
//! respect to persisted state: resolving the same input twice returns the
//! same identifier and creates nothing new. Resolution results carry
//! explicit `created`/`fetched` flags because creation is a side effect
//! callers may want to audit or count.

use sha2::{Digest, Sha256};
use url::Url;

use crate::config::Taxonomies;
use crate::error::ImportError;
use crate::fetch::RemoteFetcher;
use crate::sanitize;
use crate::store::{ContentStore, NewAttachment, TermLookup, TermRecord, UserRecord};

/// How many characters of generated password new accounts receive.
const GENERATED_PASSWORD_LEN: usize = 24;

/// The owner on whose behalf owner-scoped terms are created.
#[derive(Debug, Clone, Copy)]
pub struct TermOwner {
    pub user_id: i64,
    pub elevated: bool,
}

impl TermOwner {
    pub fn from_user(user: &UserRecord) -> Self {
        Self {
            user_id: user.id,
            elevated: user.elevated,
        }
    }
}

/// Outcome of a term-path resolution: the leaf term, and whether any
/// level of the path had to be created.
#[derive(Debug, Clone)]
pub struct TermResolution {
    pub term: TermRecord,
    pub created: bool,
}

/// Outcome of an attachment resolution. `fetched` is true only when the
/// bytes actually crossed the network this call.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentResolution {
    pub attachment_id: i64,
    pub fetched: bool,
}

/// Outcome of a user resolution. `created` marks the side-effecting path
/// where a new account (with a generated password) came into existence.
#[derive(Debug, Clone)]
pub struct UserResolution {
    pub user: UserRecord,
    pub created: bool,
}

/// Resolves row references against the persistence and fetch collaborators.
pub struct Resolver<'a> {
    store: &'a dyn ContentStore,
    fetcher: &'a dyn RemoteFetcher,
    taxonomies: &'a Taxonomies,
}

impl<'a> Resolver<'a> {
    pub fn new(
        store: &'a dyn ContentStore,
        fetcher: &'a dyn RemoteFetcher,
        taxonomies: &'a Taxonomies,
    ) -> Self {
        Self {
            store,
            fetcher,
            taxonomies,
        }
    }

    /// Resolve a term path to its leaf term, creating missing levels.
    ///
    /// Hierarchical taxonomies split `path` on `>`; each segment resolves
    /// under the previously resolved node as parent. Owner-scoped
    /// taxonomies bake the owner id into the slug (unless the owner holds
    /// elevated privileges) and look terms up by that slug; other
    /// taxonomies look up by name. Ancestors created before a failing
    /// level are left in place.
    pub async fn resolve_term(
        &self,
        path: &str,
        taxonomy: &str,
        owner: Option<TermOwner>,
    ) -> Result<TermResolution, ImportError> {
        let config = self.taxonomies.get(taxonomy).ok_or_else(|| {
            ImportError::ReferenceResolution(format!("unknown taxonomy `{}`", taxonomy))
        })?;

        let segments: Vec<&str> = if config.hierarchical {
            path.split('>').map(str::trim).collect()
        } else {
            vec![path.trim()]
        };

        let mut parent: Option<TermRecord> = None;
        let mut created_any = false;

        for segment in segments {
            if segment.is_empty() {
                return Err(ImportError::ReferenceResolution(format!(
                    "empty term name in path `{}`",
                    path
                )));
            }

            let slug = term_slug(segment, config.owner_scoped, owner);
            let parent_id = parent.as_ref().map(|term| term.id);

            let lookup = if config.owner_scoped {
                TermLookup::Slug {
                    slug: &slug,
                    parent: parent_id,
                }
            } else {
                TermLookup::Name {
                    name: segment,
                    parent: parent_id,
                }
            };

            let term = match self.store.find_term(taxonomy, lookup).await? {
                Some(existing) => existing,
                None => {
                    let term = self
                        .store
                        .create_term(taxonomy, segment, &slug, parent_id)
                        .await?;
                    log::debug!("created {} term `{}` ({})", taxonomy, segment, term.id);
                    created_any = true;
                    term
                }
            };

            parent = Some(term);
        }

        // The loop always runs at least once: a non-hierarchical path has
        // exactly one segment and hierarchical splits never yield zero.
        let term = parent.ok_or_else(|| {
            ImportError::ReferenceResolution(format!("empty term path `{}`", path))
        })?;

        Ok(TermResolution {
            term,
            created: created_any,
        })
    }

    /// Resolve an attachment source and link it as the post's image.
    ///
    /// Non-URL sources are treated as media-library file names and looked
    /// up by their last path segment. URL sources first try the local
    /// reverse map, then the URL fingerprint (so repeated imports reuse
    /// the attachment created the first time), and only then fetch.
    pub async fn resolve_attachment(
        &self,
        source: &str,
        post_id: i64,
    ) -> Result<AttachmentResolution, ImportError> {
        let parsed_url =
            Url::parse(source.trim()).ok().filter(|url| matches!(url.scheme(), "http" | "https"));

        let (attachment_id, fetched) = match parsed_url {
            None => {
                let file_name = sanitize::sanitize_file_name(source);
                let found = self.store.find_attachment_by_file_name(&file_name).await?;
                match found {
                    Some(id) => (id, false),
                    None => {
                        return Err(ImportError::ReferenceResolution(format!(
                            "no attachment matching file name `{}`",
                            file_name
                        )));
                    }
                }
            }
            Some(url) => self.attachment_from_url(url.as_str()).await?,
        };

        self.store.set_featured_image(post_id, attachment_id).await?;

        Ok(AttachmentResolution {
            attachment_id,
            fetched,
        })
    }

    async fn attachment_from_url(&self, url: &str) -> Result<(i64, bool), ImportError> {
        if let Some(id) = self.store.find_attachment_by_url(url).await? {
            return Ok((id, false));
        }

        let fingerprint = url_fingerprint(url);
        if let Some(id) = self
            .store
            .find_attachment_by_fingerprint(&fingerprint)
            .await?
        {
            log::debug!("attachment for {} already imported, reusing {}", url, id);
            return Ok((id, false));
        }

        let file = self.fetcher.fetch(url).await?;

        let attachment = NewAttachment {
            file_name: sanitize::sanitize_file_name(url),
            source_url: Some(url.to_string()),
            fingerprint: Some(fingerprint),
            mime_type: file.content_type,
        };
        let id = self.store.create_attachment(&attachment, file.bytes).await?;
        log::debug!("imported remote attachment {} as {}", url, id);

        Ok((id, true))
    }

    /// Resolve a username to an account, creating one when absent.
    ///
    /// New accounts receive the supplied email and a generated random
    /// password; the `created` flag makes the hidden side effect visible
    /// to callers.
    pub async fn resolve_user(
        &self,
        username: &str,
        email: &str,
    ) -> Result<UserResolution, ImportError> {
        if let Some(user) = self.store.find_user_by_username(username).await? {
            return Ok(UserResolution {
                user,
                created: false,
            });
        }

        let password = generate_password();
        let user = self.store.create_user(username, email, &password).await?;
        log::info!("created account `{}` for imported content", username);

        Ok(UserResolution {
            user,
            created: true,
        })
    }
}

/// Slug for one term segment. Owner-scoped taxonomies prefix the owner id
/// unless the owner holds elevated privileges.
fn term_slug(name: &str, owner_scoped: bool, owner: Option<TermOwner>) -> String {
    let base = sanitize::slugify(name);
    match owner {
        Some(owner) if owner_scoped && !owner.elevated => {
            format!("{}-{}", owner.user_id, base)
        }
        _ => base,
    }
}

/// Stable fingerprint of a remote URL, used to deduplicate downloads
/// across imports.
pub fn url_fingerprint(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn generate_password() -> String {
    use rand::Rng;
    use rand::distributions::Alphanumeric;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewPost;
    use crate::store::memory::MemoryStore;
    use crate::test_support::StubFetcher;

    fn taxonomies() -> Taxonomies {
        Taxonomies::default()
    }

    #[tokio::test]
    async fn term_path_creates_hierarchy_once() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);

        let first = resolver
            .resolve_term("Module A > Submodule B", "module", None)
            .await
            .unwrap();
        assert!(first.created);

        let second = resolver
            .resolve_term("Module A > Submodule B", "module", None)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(first.term.id, second.term.id);
        assert_eq!(store.term_count("module"), 2);

        // Leaf is parented under the root segment.
        let leaf = second.term;
        assert_eq!(leaf.name, "Submodule B");
        assert!(leaf.parent_id.is_some());
    }

    #[tokio::test]
    async fn flat_taxonomy_keeps_delimiter_in_name() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);

        let resolution = resolver
            .resolve_term("science > fiction", "lesson-tag", None)
            .await
            .unwrap();

        assert_eq!(resolution.term.name, "science > fiction");
        assert_eq!(store.term_count("lesson-tag"), 1);
    }

    #[tokio::test]
    async fn owner_scoped_slugs_separate_owners() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);

        let first = resolver
            .resolve_term(
                "Basics",
                "module",
                Some(TermOwner {
                    user_id: 11,
                    elevated: false,
                }),
            )
            .await
            .unwrap();
        let second = resolver
            .resolve_term(
                "Basics",
                "module",
                Some(TermOwner {
                    user_id: 12,
                    elevated: false,
                }),
            )
            .await
            .unwrap();

        assert_ne!(first.term.id, second.term.id);
        assert_eq!(first.term.slug, "11-basics");
        assert_eq!(second.term.slug, "12-basics");
    }

    #[tokio::test]
    async fn elevated_owner_uses_plain_slug() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);

        let resolution = resolver
            .resolve_term(
                "Basics",
                "module",
                Some(TermOwner {
                    user_id: 11,
                    elevated: true,
                }),
            )
            .await
            .unwrap();

        assert_eq!(resolution.term.slug, "basics");
    }

    #[tokio::test]
    async fn unknown_taxonomy_is_an_error() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);

        let err = resolver.resolve_term("x", "genre", None).await.unwrap_err();
        assert!(matches!(err, ImportError::ReferenceResolution(_)));
    }

    #[tokio::test]
    async fn repeated_url_fetches_once() {
        let store = MemoryStore::new();
        let fetcher =
            StubFetcher::new().with_file("https://example.com/img.png", b"PNGDATA".to_vec());
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);

        let post = seed_post(&store).await;
        let other = seed_post(&store).await;

        let first = resolver
            .resolve_attachment("https://example.com/img.png", post)
            .await
            .unwrap();
        assert!(first.fetched);

        let second = resolver
            .resolve_attachment("https://example.com/img.png", other)
            .await
            .unwrap();
        assert!(!second.fetched);
        assert_eq!(first.attachment_id, second.attachment_id);
        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(store.attachment_count(), 1);
        assert_eq!(
            store.attachment_bytes(first.attachment_id).unwrap(),
            b"PNGDATA".to_vec()
        );
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);
        let post = seed_post(&store).await;

        let err = resolver
            .resolve_attachment("missing.png", post)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::ReferenceResolution(_)));
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn local_file_reverse_lookup_links_image() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);

        let attachment = store.seed_attachment("2024/03/banner.jpg");
        let post = seed_post(&store).await;

        let resolution = resolver
            .resolve_attachment("banner.jpg", post)
            .await
            .unwrap();
        assert_eq!(resolution.attachment_id, attachment);
        assert!(!resolution.fetched);

        let stored = store.get_post(post).await.unwrap().unwrap();
        assert_eq!(
            stored.meta.get("_thumbnail_id").map(String::as_str),
            Some(attachment.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_as_fetch_error() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new().with_status("https://example.com/gone.png", 404);
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);
        let post = seed_post(&store).await;

        let err = resolver
            .resolve_attachment("https://example.com/gone.png", post)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Fetch(_)));
        assert_eq!(store.attachment_count(), 0);
    }

    #[tokio::test]
    async fn user_resolution_creates_then_reuses() {
        let store = MemoryStore::new();
        let fetcher = StubFetcher::new();
        let taxonomies = taxonomies();
        let resolver = Resolver::new(&store, &fetcher, &taxonomies);

        let first = resolver
            .resolve_user("jsmith", "j@example.com")
            .await
            .unwrap();
        assert!(first.created);

        let second = resolver
            .resolve_user("jsmith", "j@example.com")
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(first.user.id, second.user.id);
    }

    #[test]
    fn fingerprint_is_stable_and_hex() {
        let a = url_fingerprint("https://example.com/a.png");
        let b = url_fingerprint("https://example.com/a.png");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    async fn seed_post(store: &MemoryStore) -> i64 {
        store
            .create_post(&NewPost {
                post_type: "course".to_string(),
                title: "Host".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
    }
}
