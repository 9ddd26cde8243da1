//! `loop` attribute grammar.
//!
//! Three spellings are accepted and normalized to PHP's alternative loop
//! syntax:
//!
//! ```text
//! items as item / items as key => item   →  foreach ($items as $key => $item):
//! items=>item   / items=>key,item        →  foreach ($items as $key => $item):
//! $i = 0; $i < 3; $i++                   →  for ($i = 0; $i < 3; $i++):
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::validator::validate;
use crate::CompileError;

static NATIVE_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(.+?)\s+as\s+(?:(\$?[A-Za-z_]\w*)\s*=>\s*)?(\$?[A-Za-z_]\w*)$")
        .expect("native loop pattern is valid")
});

static ARROW_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(.+?)\s*=>\s*(?:(\$?[A-Za-z_]\w*)\s*,\s*)?(\$?[A-Za-z_]\w*)$")
        .expect("arrow loop pattern is valid")
});

static BARE_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("identifier pattern is valid"));

/// A compiled loop: the opening and closing PHP statements.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopHeader {
    pub open: String,
    pub close: &'static str,
}

impl LoopHeader {
    /// Wrap a loop body between the loop start and end markers.
    pub fn wrap(&self, body: &str) -> String {
        format!("{}{body}{}", self.open, self.close)
    }
}

/// Validate and compile a `loop` attribute value.
pub fn compile_loop(expr: &str) -> Result<LoopHeader, CompileError> {
    validate(expr)?;
    let expr = expr.trim();

    if expr.contains(';') {
        let parts: Vec<&str> = expr.split(';').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(CompileError::structure(format!(
                "C-style loop needs `init; condition; step`, got `{expr}`"
            )));
        }
        return Ok(LoopHeader {
            open: format!("<?php for ({}; {}; {}): ?>", parts[0], parts[1], parts[2]),
            close: "<?php endfor; ?>",
        });
    }

    let caps = NATIVE_FORM
        .captures(expr)
        .or_else(|| ARROW_FORM.captures(expr))
        .ok_or_else(|| CompileError::structure(format!("invalid loop expression `{expr}`")))?;

    let collection = variable(caps[1].trim());
    let value = variable(&caps[3]);
    let open = match caps.get(2) {
        Some(key) => format!(
            "<?php foreach ({collection} as {} => {value}): ?>",
            variable(key.as_str())
        ),
        None => format!("<?php foreach ({collection} as {value}): ?>"),
    };

    Ok(LoopHeader {
        open,
        close: "<?php endforeach; ?>",
    })
}

/// Bare identifiers become PHP variables; anything else is kept verbatim.
fn variable(name: &str) -> String {
    if BARE_IDENT.is_match(name) {
        format!("${name}")
    } else {
        name.to_string()
    }
}
