//! Quill Lexer
//!
//! Tokenizes Quill template source into a flat stream of text, tag, comment
//! and raw-code tokens. Tags are sub-parsed into name, closing/self-closing
//! flags and an ordered attribute map.
//!
//! Lexing is lenient: malformed or unterminated constructs become
//! best-effort tokens, so tokenizing never fails.
//!
//! # Example
//!
//! ```
//! use quill_lexer::{Scanner, TokenKind};
//!
//! let tokens = Scanner::tokenize("<p>{$name}</p>");
//! assert_eq!(tokens.len(), 3);
//! assert_eq!(tokens[0].kind, TokenKind::TagOpen);
//! ```

pub mod scanner;
pub mod token;

pub use scanner::{parse_tag, ScanState, Scanner};
pub use token::{is_void_element, AttrValue, Attributes, Span, TagInfo, Token, TokenKind};
