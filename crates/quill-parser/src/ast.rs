//! Document tree for Quill templates.
//!
//! Every node owns its children outright; the tree is built once by
//! [`crate::Parser`] and consumed by the code generator.

pub use quill_lexer::{AttrValue, Attributes};

/// Tag that records a deferred CSS/JS asset declaration.
pub const LOAD_TAG: &str = "load";
/// Tag that documents the removal of an asset.
pub const UNLOAD_TAG: &str = "unload";
/// Wrapper tag whose own start/end tags are never emitted.
pub const FRAGMENT_TAG: &str = "fragment";

/// A complete Quill document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub children: Vec<Node>,
}

/// A node in the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A markup element with attributes and children.
    Element(Element),

    /// Literal text (may contain `{$expr}` and `{@ code }` markers).
    Text(String),

    /// The body of a `<!-- ... -->` comment.
    Comment(String),

    /// The code between `{@` and its matching `}`.
    RawCode(String),
}

/// A markup element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag_name: String,
    pub attributes: Attributes,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag_name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes,
            children: Vec::new(),
        }
    }

    /// Case-insensitive tag name comparison.
    pub fn is(&self, tag: &str) -> bool {
        self.tag_name.eq_ignore_ascii_case(tag)
    }

    pub fn is_void(&self) -> bool {
        quill_lexer::is_void_element(&self.tag_name)
    }
}
