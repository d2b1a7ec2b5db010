//! JSONPath-like path construction and parsing.
//!
//! Paths are the textual locator described in the data model: `$`, `$.foo`,
//! `$.arr[3]`, `$.arr[?(@.id==42)]`. They double as report keys and as the
//! cache key into the [`SchemaIndex`](crate::schema_index::SchemaIndex), so
//! construction and parsing must agree with each other exactly.

use std::borrow::Cow;

/// A single decoded path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// An object key, e.g. `.foo` or `['foo bar']`.
    Key(String),
    /// An array index, e.g. `[3]`.
    Index(usize),
    /// A keyed-array selector, e.g. `[?(@.sku=='A')]`. Carries the raw
    /// predicate text (`sku=='A'`) for display; the schema index treats it
    /// like an `Index` step when descending into `items`.
    Filter(String),
}

/// A path key, either an object property name or an array index — used when
/// building a child path from a parent.
#[derive(Debug, Clone)]
pub enum Key<'a> {
    Name(&'a str),
    Index(usize),
}

/// True if `key` can be written as a bare `.key` segment without quoting.
fn is_bare_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Append one segment to a parent path, quoting the key if it contains
/// characters that would otherwise be ambiguous with dotted/bracket notation.
pub fn build_path(parent: &str, key: Key<'_>) -> String {
    match key {
        Key::Index(i) => format!("{parent}[{i}]"),
        Key::Name(name) if is_bare_identifier(name) => format!("{parent}.{name}"),
        Key::Name(name) => format!("{parent}['{}']", name.replace('\'', "\\'")),
    }
}

/// Build the path for a keyed-array item matched by its fingerprint.
///
/// Single-field keys render as `arr[?(@.sku==A)]`; composite keys render as
/// `arr[key=(A, 1)]` since JSONPath has no native tuple-predicate syntax.
pub fn keyed_item_path(parent: &str, key_spec: &KeySpec, display: &str) -> String {
    match key_spec {
        KeySpec::Single(field) => format!("{parent}[?(@.{field}=={display})]"),
        KeySpec::Composite(_) => format!("{parent}[key={display}]"),
    }
}

/// The decoded form of `x-migration-array-key`: one field, or several for a
/// composite fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    Single(String),
    Composite(Vec<String>),
}

impl KeySpec {
    pub fn fields(&self) -> &[String] {
        match self {
            KeySpec::Single(f) => std::slice::from_ref(f),
            KeySpec::Composite(fs) => fs,
        }
    }
}

/// Parse a path string into its segments, stripping the leading `$`.
///
/// `$` and `$.` both parse to an empty segment list (the root). Quoted
/// bracket keys (`['a.b']`, `["a.b"]`) are unescaped; numeric brackets parse
/// as indices; `[?(...)]` parses as a `Filter` carrying the raw predicate.
pub fn parse_segments(path: &str) -> Vec<Segment> {
    let body: &str = path.strip_prefix('$').unwrap_or(path);
    let mut segments = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
            }
            '[' => {
                let close = match chars[i..].iter().position(|&c| c == ']') {
                    Some(offset) => i + offset,
                    None => break,
                };
                let inner: String = chars[i + 1..close].iter().collect();
                segments.push(parse_bracket(&inner));
                i = close + 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                let key: String = chars[start..i].iter().collect();
                if !key.is_empty() {
                    segments.push(Segment::Key(key));
                }
            }
        }
    }
    segments
}

fn parse_bracket(inner: &str) -> Segment {
    if let Some(predicate) = inner.strip_prefix("?(").and_then(|s| s.strip_suffix(')')) {
        return Segment::Filter(predicate.to_string());
    }
    if let Ok(index) = inner.parse::<usize>() {
        return Segment::Index(index);
    }
    let unquoted = unquote(inner);
    Segment::Key(unquoted.into_owned())
}

fn unquote(raw: &str) -> Cow<'_, str> {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return Cow::Owned(raw[1..raw.len() - 1].replace("\\'", "'"));
        }
    }
    Cow::Borrowed(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_path_uses_dot_for_bare_identifiers() {
        assert_eq!(build_path("$", Key::Name("foo")), "$.foo");
    }

    #[test]
    fn build_path_quotes_special_keys() {
        assert_eq!(build_path("$", Key::Name("a.b")), "$['a.b']");
    }

    #[test]
    fn build_path_indexes_arrays() {
        assert_eq!(build_path("$.arr", Key::Index(3)), "$.arr[3]");
    }

    #[test]
    fn parse_segments_simple() {
        assert_eq!(
            parse_segments("$.foo.bar"),
            vec![Segment::Key("foo".into()), Segment::Key("bar".into())]
        );
    }

    #[test]
    fn parse_segments_root_is_empty() {
        assert!(parse_segments("$").is_empty());
    }

    #[test]
    fn parse_segments_index() {
        assert_eq!(
            parse_segments("$.arr[3]"),
            vec![Segment::Key("arr".into()), Segment::Index(3)]
        );
    }

    #[test]
    fn parse_segments_quoted_key() {
        assert_eq!(
            parse_segments("$['a.b']"),
            vec![Segment::Key("a.b".into())]
        );
    }

    #[test]
    fn parse_segments_filter() {
        assert_eq!(
            parse_segments("$.arr[?(@.id==42)]"),
            vec![Segment::Key("arr".into()), Segment::Filter("@.id==42".into())]
        );
    }

    #[test]
    fn keyed_item_path_single_field() {
        let spec = KeySpec::Single("sku".into());
        assert_eq!(
            keyed_item_path("$.items", &spec, "'A'"),
            "$.items[?(@.sku=='A')]"
        );
    }

    #[test]
    fn keyed_item_path_composite() {
        let spec = KeySpec::Composite(vec!["a".into(), "b".into()]);
        assert_eq!(keyed_item_path("$.items", &spec, "(1, 2)"), "$.items[key=(1, 2)]");
    }

    #[test]
    fn round_trips_build_and_parse() {
        let p1 = build_path("$", Key::Name("items"));
        let p2 = build_path(&p1, Key::Index(0));
        let p3 = build_path(&p2, Key::Name("sku"));
        assert_eq!(p3, "$.items[0].sku");
        assert_eq!(
            parse_segments(&p3),
            vec![
                Segment::Key("items".into()),
                Segment::Index(0),
                Segment::Key("sku".into())
            ]
        );
    }
}
