//! Quill Code Generator
//!
//! Compiles a Quill document tree into a PHP template. Embedded code is
//! checked by the [`validator`] before it is emitted, `{$…}` chains go through
//! the [`filters`] compiler, and `<load>` declarations are collected into an
//! [`assets::AssetRegistry`] and injected after the walk.
//!
//! ```text
//! source → Parser::parse() → Document → compile() → PHP template
//! ```

pub mod assets;
pub mod filters;
pub mod html;
pub mod loops;
pub mod validator;

use assets::AssetRegistry;
use filters::FilterError;
use quill_parser::{Document, Parser};
use validator::SecurityError;

/// Any failure that aborts a compile invocation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Malformed directive or asset declaration.
    #[error("Structure error: {message}")]
    Structure { message: String },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

impl CompileError {
    pub fn structure(message: impl Into<String>) -> Self {
        CompileError::Structure {
            message: message.into(),
        }
    }
}

/// Per-invocation state threaded through the tree walk.
#[derive(Debug, Default)]
pub struct CompilationContext {
    pub assets: AssetRegistry,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Compile a document tree into a PHP template.
pub fn compile(doc: &Document) -> Result<String, CompileError> {
    let mut ctx = CompilationContext::new();

    let markup = html::generate(doc, &mut ctx)?;
    tracing::debug!(
        bytes = markup.len(),
        assets = ctx.assets.len(),
        "rendered document"
    );

    Ok(ctx.assets.inject(markup))
}

/// Parse and compile template source in one step.
pub fn compile_text(source: &str) -> Result<String, CompileError> {
    compile(&Parser::parse(source))
}
