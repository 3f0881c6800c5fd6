//! Declarative field schemas for each importable record kind.
//!
//! The registry is configuration data: built once at first use, immutable
//! afterwards, with field patterns pre-compiled. Callers can only ask for
//! registered kinds because [`RecordKind`] is a closed enum; kind strings
//! arriving from an external row source go through [`RecordKind::from_str`]
//! and surface parse failures there.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::record::Value;

/// The category of importable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Course,
    Lesson,
    Question,
}

impl RecordKind {
    /// Processing order for a batch. Courses first: module and category
    /// terms come into existence while courses sync, so lesson rows can
    /// resolve them; questions resolve against lessons' quizzes last.
    pub const DEPENDENCY_ORDER: [RecordKind; 3] =
        [RecordKind::Course, RecordKind::Lesson, RecordKind::Question];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Course => "course",
            RecordKind::Lesson => "lesson",
            RecordKind::Question => "question",
        }
    }

    /// Post type the kind persists as.
    pub fn post_type(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "course" => Ok(RecordKind::Course),
            "lesson" => Ok(RecordKind::Lesson),
            "question" => Ok(RecordKind::Question),
            other => Err(format!("unknown record kind `{}`", other)),
        }
    }
}

/// Scalar type a field coerces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Int,
    Float,
    Bool,
    Slug,
    Email,
    Url,
}

/// Declarative configuration for one source column.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub field_type: FieldType,
    pub pattern: Option<Regex>,
    pub default: Option<Value>,
    pub required: bool,
    pub allow_html: bool,
}

impl FieldSchema {
    fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            pattern: None,
            default: None,
            required: false,
            allow_html: false,
        }
    }

    pub fn text() -> Self {
        Self::new(FieldType::Text)
    }

    pub fn int() -> Self {
        Self::new(FieldType::Int)
    }

    pub fn float() -> Self {
        Self::new(FieldType::Float)
    }

    pub fn bool() -> Self {
        Self::new(FieldType::Bool)
    }

    pub fn slug() -> Self {
        Self::new(FieldType::Slug)
    }

    pub fn email() -> Self {
        Self::new(FieldType::Email)
    }

    pub fn url() -> Self {
        Self::new(FieldType::Url)
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn html(mut self) -> Self {
        self.allow_html = true;
        self
    }

    fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(Regex::new(pattern).expect("valid field pattern"));
        self
    }

    fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn default_text(self, value: &str) -> Self {
        self.default_value(Value::Text(value.to_string()))
    }

    /// A `null` value for this field marks malformed input rather than an
    /// omitted column. Required fields always do; so do fields carrying
    /// both a default and a pattern, where the default would have filled
    /// an empty cell and only a pattern miss leaves `null` behind.
    pub fn rejects_empty(&self) -> bool {
        if self.required {
            return true;
        }
        self.default.is_some() && self.pattern.is_some()
    }
}

/// Ordered field table for one record kind.
///
/// Declaration order is preserved so validation errors and serialized
/// reports stay deterministic.
#[derive(Debug)]
pub struct Schema {
    fields: Vec<(&'static str, FieldSchema)>,
}

impl Schema {
    fn new(fields: Vec<(&'static str, FieldSchema)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, schema)| schema)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldSchema)> {
        self.fields.iter().map(|(name, schema)| (*name, schema))
    }

    pub fn required_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|(_, schema)| schema.required)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn optional_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|(_, schema)| !schema.required)
            .map(|(name, _)| *name)
            .collect()
    }
}

const STATUS_PATTERN: &str = "^(publish|pending|draft|private)$";

static COURSE_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        ("id", FieldSchema::text()),
        ("title", FieldSchema::text().required()),
        ("slug", FieldSchema::slug()),
        ("description", FieldSchema::text().html()),
        ("excerpt", FieldSchema::text().html()),
        ("teacher_username", FieldSchema::text()),
        ("teacher_email", FieldSchema::email()),
        ("modules", FieldSchema::text()),
        ("categories", FieldSchema::text()),
        ("prerequisite", FieldSchema::text()),
        ("featured", FieldSchema::bool().default_value(Value::Bool(false))),
        ("image", FieldSchema::text()),
        ("video", FieldSchema::text().html()),
        (
            "notifications",
            FieldSchema::bool().default_value(Value::Bool(false)),
        ),
    ])
});

static LESSON_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        ("id", FieldSchema::text()),
        ("title", FieldSchema::text().required()),
        ("slug", FieldSchema::slug()),
        ("description", FieldSchema::text().html()),
        ("excerpt", FieldSchema::text().html()),
        (
            "status",
            FieldSchema::text()
                .pattern(STATUS_PATTERN)
                .default_text("publish"),
        ),
        ("course", FieldSchema::text()),
        ("module", FieldSchema::text()),
        ("prerequisite", FieldSchema::text()),
        ("preview", FieldSchema::bool().default_value(Value::Bool(false))),
        ("tags", FieldSchema::text()),
        ("image", FieldSchema::text()),
        ("length", FieldSchema::int()),
        ("complexity", FieldSchema::text().pattern("^(easy|std|hard)$")),
        ("video", FieldSchema::text().html()),
        (
            "pass_required",
            FieldSchema::bool().default_value(Value::Bool(false)),
        ),
        ("passmark", FieldSchema::float().default_value(Value::Float(0.0))),
    ])
});

static QUESTION_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        ("id", FieldSchema::text()),
        ("title", FieldSchema::text().required()),
        ("answer", FieldSchema::text().required()),
        ("slug", FieldSchema::slug()),
        ("description", FieldSchema::text().html()),
        (
            "status",
            FieldSchema::text()
                .pattern(STATUS_PATTERN)
                .default_text("publish"),
        ),
        (
            "type",
            FieldSchema::text()
                .pattern("^(multiple-choice|boolean|gap-fill|single-line|multi-line|file-upload)$")
                .default_text("multiple-choice"),
        ),
        ("grade", FieldSchema::int().default_value(Value::Int(1))),
        (
            "random_order",
            FieldSchema::bool().default_value(Value::Bool(true)),
        ),
        ("media", FieldSchema::text()),
        ("categories", FieldSchema::text()),
        ("feedback", FieldSchema::text().html()),
    ])
});

/// Field table for a record kind. Static and immutable.
pub fn schema_for(kind: RecordKind) -> &'static Schema {
    match kind {
        RecordKind::Course => &COURSE_SCHEMA,
        RecordKind::Lesson => &LESSON_SCHEMA,
        RecordKind::Question => &QUESTION_SCHEMA,
    }
}
