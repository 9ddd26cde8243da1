//! Quill Parser
//!
//! Builds a document tree from the token stream produced by `quill-lexer`.
//! Tag nesting is resolved with an open-element stack; mismatched closing
//! tags are tolerated rather than reported, so building never fails.

pub mod ast;
pub mod parser;

pub use ast::{Document, Element, Node};
pub use parser::Parser;
