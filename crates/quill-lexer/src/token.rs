/// A position in source text, tracking line and column for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// Token classification for Quill source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal markup text, may contain `{$...}` interpolation markers.
    Text,
    /// `<tag ...>` or `<tag ... />`
    TagOpen,
    /// `</tag>`
    TagClose,
    /// `<!-- ... -->`
    Comment,
    /// `{@ ... }`, delimiters included.
    RawCode,
}

/// A token produced by the Quill scanner.
///
/// `raw` is the exact source slice. Tag tokens additionally carry the
/// sub-parsed [`TagInfo`].
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub raw: String,
    pub parsed: Option<TagInfo>,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, raw: String, span: Span) -> Self {
        Self {
            kind,
            raw,
            parsed: None,
            span,
        }
    }

    pub fn tag(raw: String, info: TagInfo, span: Span) -> Self {
        let kind = if info.is_closing {
            TokenKind::TagClose
        } else {
            TokenKind::TagOpen
        };
        Self {
            kind,
            raw,
            parsed: Some(info),
            span,
        }
    }
}

/// Structure of a single tag, as seen by the tag sub-parser.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagInfo {
    pub name: String,
    pub is_closing: bool,
    pub is_self_closing: bool,
    pub attributes: Attributes,
}

/// An attribute value: quoted/bare text, or the valueless boolean marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    Bool,
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Bool => None,
        }
    }
}

/// Insertion-ordered attribute map.
///
/// Re-inserting an existing name overwrites its value in place, so emission
/// order follows the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes {
    entries: Vec<(String, AttrValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Text value of `name`. Boolean attributes read as `None`.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttrValue::as_text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Drop every entry whose name matches `name` ignoring ASCII case.
    pub fn remove_ignore_case(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, AttrValue)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, AttrValue)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (name, value) in iter {
            attrs.insert(name, value);
        }
        attrs
    }
}

/// HTML5 void elements (self-closing, no children).
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Check if a tag name is an HTML5 void element (case-insensitive).
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}
