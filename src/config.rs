//! Taxonomy configuration.
//!
//! The engine treats taxonomies as host configuration rather than code:
//! which taxonomies exist, whether they nest, and whether term slugs are
//! scoped per owning teacher. The defaults mirror the standard course
//! content layout; hosts embedding the library can register their own.

use std::collections::HashMap;

/// Taxonomy names the default content layout uses.
pub const MODULE_TAXONOMY: &str = "module";
pub const COURSE_CATEGORY_TAXONOMY: &str = "course-category";
pub const LESSON_TAG_TAXONOMY: &str = "lesson-tag";
pub const QUESTION_CATEGORY_TAXONOMY: &str = "question-category";

/// Behavior of one taxonomy.
#[derive(Debug, Clone)]
pub struct TaxonomyConfig {
    pub name: String,
    /// Hierarchical taxonomies accept `>`-delimited term paths.
    pub hierarchical: bool,
    /// Owner-scoped taxonomies key term slugs by the owning user unless
    /// that user holds elevated privileges, so two teachers' equally-named
    /// terms never collide.
    pub owner_scoped: bool,
}

impl TaxonomyConfig {
    pub fn new(name: &str, hierarchical: bool, owner_scoped: bool) -> Self {
        Self {
            name: name.to_string(),
            hierarchical,
            owner_scoped,
        }
    }
}

/// Registry of configured taxonomies.
#[derive(Debug, Clone)]
pub struct Taxonomies {
    configs: HashMap<String, TaxonomyConfig>,
}

impl Taxonomies {
    pub fn empty() -> Self {
        Self {
            configs: HashMap::new(),
        }
    }

    pub fn register(&mut self, config: TaxonomyConfig) {
        self.configs.insert(config.name.clone(), config);
    }

    pub fn get(&self, name: &str) -> Option<&TaxonomyConfig> {
        self.configs.get(name)
    }
}

impl Default for Taxonomies {
    fn default() -> Self {
        let mut taxonomies = Self::empty();
        taxonomies.register(TaxonomyConfig::new(MODULE_TAXONOMY, true, true));
        taxonomies.register(TaxonomyConfig::new(COURSE_CATEGORY_TAXONOMY, true, false));
        taxonomies.register(TaxonomyConfig::new(LESSON_TAG_TAXONOMY, false, false));
        taxonomies.register(TaxonomyConfig::new(QUESTION_CATEGORY_TAXONOMY, true, false));
        taxonomies
    }
}
