//! Turning retailer pages into prompt text, and model output into records.
//!
//! Regex based; the pages only need to become readable text for the model,
//! not a faithful DOM.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

/// Maximum number of characters of page text sent to the model.
pub const MAX_PROMPT_CONTENT_CHARS: usize = 8_000;

/// Metadata fields the model is asked to return.
pub const BOOK_FIELDS: &[&str] = &[
    "title",
    "author",
    "publisher",
    "pages",
    "edition_year",
    "isbn",
    "description",
];

static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>").expect("valid regex"));
static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("valid regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1\s*>").expect("valid regex"));
static FENCED_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").expect("valid regex"));
static BRACED_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

// ---------------------------------------------------------------------------
// HTML -> text
// ---------------------------------------------------------------------------

/// Readable text of an HTML document.
///
/// Keeps the `<body>` when there is one, drops scripts, styles, comments
/// and tags, decodes common entities and collapses whitespace.
pub fn html_to_text(html: &str) -> String {
    let body = BODY_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map_or(html, |m| m.as_str());
    fragment_to_text(body)
}

/// Text of an HTML fragment, without body detection.
fn fragment_to_text(fragment: &str) -> String {
    let text = SCRIPT_RE.replace_all(fragment, " ");
    let text = STYLE_RE.replace_all(&text, " ");
    let text = COMMENT_RE.replace_all(&text, " ");
    let text = TAG_RE.replace_all(&text, " ");
    let text = decode_entities(&text);
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Text of the first `<h1>` element.
pub fn first_heading(html: &str) -> Option<String> {
    H1_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| fragment_to_text(m.as_str()))
}

/// Text of the first element whose `class` attribute contains `class_name`.
///
/// Nested elements with the same tag name are balanced so the whole element
/// is captured.
pub fn element_text_by_class(html: &str, class_name: &str) -> Option<String> {
    let open = Regex::new(&format!(
        r#"(?is)<([a-z][a-z0-9]*)\b[^>]*\bclass\s*=\s*["'][^"']*\b{}\b[^"']*["'][^>]*>"#,
        regex::escape(class_name)
    ))
    .ok()?;
    let caps = open.captures(html)?;
    let tag = caps.get(1)?.as_str().to_ascii_lowercase();
    let content_start = caps.get(0)?.end();

    let nested = Regex::new(&format!(r"(?is)<(/?){tag}\b[^>]*>")).ok()?;
    let mut depth = 1usize;
    for m in nested.captures_iter(&html[content_start..]) {
        let whole = m.get(0)?;
        if m.get(1).is_some_and(|s| !s.as_str().is_empty()) {
            depth -= 1;
            if depth == 0 {
                let inner = &html[content_start..content_start + whole.start()];
                return Some(fragment_to_text(inner));
            }
        } else if !whole.as_str().ends_with("/>") {
            depth += 1;
        }
    }
    Some(fragment_to_text(&html[content_start..]))
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Metadata-extraction prompt for a page's text.
pub fn build_prompt(content: &str) -> String {
    let truncated: String = content.chars().take(MAX_PROMPT_CONTENT_CHARS).collect();
    let fields: String = BOOK_FIELDS.iter().map(|f| format!("- {f}\n")).collect();
    format!(
        "Please analyze this book information from a bookstore page and extract the metadata:\n\n\
         {truncated}\n\n\
         Please provide a JSON response with the following book metadata:\n\
         {fields}"
    )
}

// ---------------------------------------------------------------------------
// Model output
// ---------------------------------------------------------------------------

/// Parse JSON out of a model reply.
///
/// Tries the whole reply, then a fenced code block, then the span from the
/// first `{` to the last `}`.
pub fn parse_model_json(reply: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(reply.trim()) {
        return Some(value);
    }
    let fenced = FENCED_JSON_RE
        .captures(reply)
        .and_then(|c| c.get(1))
        .and_then(|m| serde_json::from_str(m.as_str().trim()).ok());
    if fenced.is_some() {
        return fenced;
    }
    BRACED_JSON_RE
        .find(reply)
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
}

/// Flatten a metadata object into ordered string fields for the CSV store.
///
/// Strings are kept as-is, `null` becomes empty and other values use their
/// JSON text. Non-objects yield an empty record.
pub fn flatten_book_data(value: &serde_json::Value) -> IndexMap<String, String> {
    let Some(object) = value.as_object() else {
        return IndexMap::new();
    };
    object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}
