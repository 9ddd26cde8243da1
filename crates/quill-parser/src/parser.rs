//! Document tree builder for Quill.
//!
//! Consumes the flat token stream from `quill-lexer` and produces a
//! `Document`. Elements stay on an open-element stack until their closing
//! tag (or end of input) and are then attached to their parent.

use crate::ast::{Document, Element, Node, LOAD_TAG, UNLOAD_TAG};
use quill_lexer::{Scanner, TagInfo, Token, TokenKind};

/// Quill tree builder.
pub struct Parser {
    tokens: Vec<Token>,
    stack: Vec<Element>,
    nodes: Vec<Node>,
}

impl Parser {
    /// Create a new parser for the given tokens.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            stack: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Tokenize and build a document from source text.
    pub fn parse(source: &str) -> Document {
        Parser::build(Scanner::tokenize(source))
    }

    /// Build a document from an already tokenized source.
    pub fn build(tokens: Vec<Token>) -> Document {
        Parser::new(tokens).parse_document()
    }

    fn parse_document(mut self) -> Document {
        let tokens = std::mem::take(&mut self.tokens);
        let count = tokens.len();

        for token in tokens {
            match token.kind {
                TokenKind::Text => self.append(Node::Text(token.raw)),
                TokenKind::Comment => self.append(Node::Comment(comment_body(&token.raw))),
                TokenKind::RawCode => self.append(Node::RawCode(raw_code_body(&token.raw))),
                TokenKind::TagOpen => {
                    if let Some(info) = token.parsed {
                        self.open_element(info);
                    }
                }
                TokenKind::TagClose => {
                    let name = token.parsed.map(|info| info.name).unwrap_or_default();
                    if !self.close_element(&name) {
                        tracing::trace!(
                            tag = %name,
                            line = token.span.line,
                            column = token.span.column,
                            "ignoring unmatched closing tag"
                        );
                    }
                }
            }
        }

        // Implicitly close whatever is still open
        while self.pop_into_parent() {}

        tracing::debug!(tokens = count, nodes = self.nodes.len(), "built document tree");
        Document {
            children: self.nodes,
        }
    }

    // =========================================================================
    // Stack handling
    // =========================================================================

    fn open_element(&mut self, info: TagInfo) {
        let mut attributes = info.attributes;
        attributes.remove_ignore_case(&info.name);
        let element = Element::new(info.name, attributes);

        if info.is_self_closing || element.is_void() || is_directive_leaf(&element) {
            self.append(Node::Element(element));
        } else {
            self.stack.push(element);
        }
    }

    /// Pop down to and including the nearest open element named `name`.
    /// Returns false (and leaves the stack alone) when nothing matches.
    fn close_element(&mut self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let Some(index) = self.stack.iter().rposition(|el| el.is(name)) else {
            return false;
        };
        while self.stack.len() > index {
            self.pop_into_parent();
        }
        true
    }

    fn pop_into_parent(&mut self) -> bool {
        match self.stack.pop() {
            Some(element) => {
                self.append(Node::Element(element));
                true
            }
            None => false,
        }
    }

    fn append(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.nodes.push(node),
        }
    }
}

/// `load` and `unload` never wrap content, even when written without `/>`.
fn is_directive_leaf(element: &Element) -> bool {
    element.is(LOAD_TAG) || element.is(UNLOAD_TAG)
}

fn comment_body(raw: &str) -> String {
    let body = raw.strip_prefix("<!--").unwrap_or(raw);
    body.strip_suffix("-->").unwrap_or(body).to_string()
}

/// Strip `{@` and, when the block was terminated, its closing `}`.
fn raw_code_body(raw: &str) -> String {
    let body = raw.strip_prefix("{@").unwrap_or(raw);
    // the scanner closes a block only once its braces balance
    let terminated = raw.matches('{').count() == raw.matches('}').count();
    let body = if terminated {
        body.strip_suffix('}').unwrap_or(body)
    } else {
        body
    };
    body.to_string()
}
