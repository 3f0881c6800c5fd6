//! Value coercion and normalization helpers.
//!
//! These are the pure building blocks the record sanitizer applies per
//! field: text cleaning, HTML filtering, slug/email/URL normalization and
//! the permissive numeric coercions inherited from the legacy importer
//! (non-numeric input coerces to zero instead of failing the row).

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static SCRIPT_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:script|style|iframe)\b[^>]*>.*?</(?:script|style|iframe)\s*>")
        .expect("valid regex")
});

static EVENT_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid regex")
});

static JS_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(href|src)\s*=\s*("|')?\s*javascript:[^"'\s>]*("|')?"#).expect("valid regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$")
        .expect("valid regex")
});

/// Plain-text sanitization: drop NUL bytes, strip markup, collapse runs of
/// whitespace into single spaces.
pub fn sanitize_text(value: &str) -> String {
    let no_nul = value.replace('\0', "");
    let no_tags = TAG_RE.replace_all(&no_nul, " ");
    let words: Vec<&str> = no_tags.split_whitespace().collect();
    words.join(" ")
}

/// HTML-preserving sanitization for fields that allow markup.
///
/// Script, style and iframe blocks are removed with their content; inline
/// event-handler attributes and `javascript:` URLs are stripped. Everything
/// else passes through untouched.
pub fn filter_html(value: &str) -> String {
    let no_nul = value.replace('\0', "");
    let no_blocks = SCRIPT_BLOCK_RE.replace_all(&no_nul, "");
    let no_handlers = EVENT_ATTR_RE.replace_all(&no_blocks, "");
    let no_js_urls = JS_HREF_RE.replace_all(&no_handlers, "$1=\"\"");
    no_js_urls.trim().to_string()
}

/// Lowercase-hyphenated slug normalization.
///
/// Alphanumerics are kept, everything else becomes a hyphen, runs of
/// hyphens collapse and leading/trailing hyphens are dropped.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_was_hyphen = true;

    for ch in value.trim().chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

/// Strict email normalization. Invalid addresses become the empty string,
/// matching the legacy importer's "present but unusable" convention.
pub fn sanitize_email(value: &str) -> String {
    let trimmed = value.trim();
    if EMAIL_RE.is_match(trimmed) {
        trimmed.to_lowercase()
    } else {
        String::new()
    }
}

/// Validated URL normalization. Only http(s) URLs survive; anything else
/// becomes the empty string.
pub fn sanitize_url(value: &str) -> String {
    match Url::parse(value.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.to_string(),
        _ => String::new(),
    }
}

/// Permissive integer coercion: parse the leading signed digit run,
/// anything else is zero.
pub fn parse_int_permissive(value: &str) -> i64 {
    let trimmed = value.trim();
    let mut end = 0;
    for (idx, ch) in trimmed.char_indices() {
        if ch.is_ascii_digit() || (idx == 0 && (ch == '-' || ch == '+')) {
            end = idx + ch.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse::<i64>().unwrap_or(0)
}

/// Permissive float coercion: parse the leading numeric prefix (one decimal
/// point allowed), anything else is zero.
pub fn parse_float_permissive(value: &str) -> f64 {
    let trimmed = value.trim();
    let mut end = 0;
    let mut seen_dot = false;
    for (idx, ch) in trimmed.char_indices() {
        let ok = ch.is_ascii_digit()
            || (idx == 0 && (ch == '-' || ch == '+'))
            || (ch == '.' && !seen_dot);
        if !ok {
            break;
        }
        if ch == '.' {
            seen_dot = true;
        }
        end = idx + ch.len_utf8();
    }
    trimmed[..end].parse::<f64>().unwrap_or(0.0)
}

/// Truthy coercion for boolean columns.
pub fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Reduce an attachment source to its bare file name (last path segment),
/// dropping characters that are unsafe in stored file names.
pub fn sanitize_file_name(source: &str) -> String {
    let last = source
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source)
        .trim();

    last.chars()
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, '.' | '-' | '_'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("  hello\0 world  "), "hello world");
        assert_eq!(sanitize_text("a <b>bold</b> move"), "a bold move");
        assert_eq!(sanitize_text("line\nbreaks\tcollapse"), "line breaks collapse");
    }

    #[test]
    fn test_filter_html_strips_scripts() {
        let dirty = "<p>keep</p><script>alert('x')</script><em>this</em>";
        assert_eq!(filter_html(dirty), "<p>keep</p><em>this</em>");
    }

    #[test]
    fn test_filter_html_strips_event_handlers() {
        let dirty = r#"<a href="https://example.com" onclick="steal()">link</a>"#;
        let clean = filter_html(dirty);
        assert!(!clean.contains("onclick"));
        assert!(clean.contains(r#"href="https://example.com""#));
    }

    #[test]
    fn test_filter_html_neutralizes_javascript_urls() {
        let dirty = r#"<a href="javascript:evil()">x</a>"#;
        assert!(!filter_html(dirty).contains("javascript:"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Module A"), "module-a");
        assert_eq!(slugify("  Ünïcode -- Name!  "), "ünïcode-name");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("!!"), "");
    }

    #[test]
    fn test_sanitize_email() {
        assert_eq!(sanitize_email(" Teacher@Example.COM "), "teacher@example.com");
        assert_eq!(sanitize_email("not-an-email"), "");
        assert_eq!(sanitize_email("a@b"), "");
    }

    #[test]
    fn test_sanitize_url() {
        assert_eq!(
            sanitize_url("https://example.com/image.png"),
            "https://example.com/image.png"
        );
        assert_eq!(sanitize_url("ftp://example.com/file"), "");
        assert_eq!(sanitize_url("image.png"), "");
    }

    #[test]
    fn test_parse_int_permissive() {
        assert_eq!(parse_int_permissive("42"), 42);
        assert_eq!(parse_int_permissive("12 minutes"), 12);
        assert_eq!(parse_int_permissive("-3"), -3);
        assert_eq!(parse_int_permissive("minutes"), 0);
    }

    #[test]
    fn test_parse_float_permissive() {
        assert_eq!(parse_float_permissive("70.5"), 70.5);
        assert_eq!(parse_float_permissive("1.5x"), 1.5);
        assert_eq!(parse_float_permissive("x"), 0.0);
    }

    #[test]
    fn test_truthy() {
        assert!(truthy("1"));
        assert!(truthy("TRUE"));
        assert!(truthy("yes"));
        assert!(!truthy("0"));
        assert!(!truthy("false"));
        assert!(!truthy(""));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(
            sanitize_file_name("https://example.com/uploads/photo.png"),
            "photo.png"
        );
        assert_eq!(sanitize_file_name("dir/sub/im age.jpg"), "image.jpg");
        assert_eq!(sanitize_file_name("plain.gif"), "plain.gif");
    }
}
