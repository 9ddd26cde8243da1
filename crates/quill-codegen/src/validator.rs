//! Blacklist validator for author-supplied PHP fragments.
//!
//! Comments and string-literal contents are stripped before matching, so
//! blacklisted names inside string data or comments pass, while the same
//! names in code position fail. This is a surface-syntax check: it cannot
//! see through obfuscated or dynamically built calls.

use std::sync::LazyLock;

use regex::Regex;

/// A blacklisted construct found in an embedded code fragment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Security error: {message} in `{fragment}`")]
pub struct SecurityError {
    pub message: String,
    pub fragment: String,
}

/// Functions that execute processes, touch the filesystem or evaluate code.
pub const DANGEROUS_CALLS: &[&str] = &[
    "exec",
    "shell_exec",
    "system",
    "passthru",
    "popen",
    "proc_open",
    "pcntl_exec",
    "eval",
    "assert",
    "create_function",
    "call_user_func",
    "call_user_func_array",
    "unlink",
    "rmdir",
    "mkdir",
    "rename",
    "copy",
    "file_put_contents",
    "fopen",
    "fwrite",
    "chmod",
    "chown",
    "symlink",
    "move_uploaded_file",
];

/// Request, session and environment superglobals.
pub const RESERVED_VARIABLES: &[&str] = &[
    "_GET", "_POST", "_REQUEST", "_COOKIE", "_SESSION", "_SERVER", "_ENV", "_FILES", "GLOBALS",
];

static CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\s*\(", DANGEROUS_CALLS.join("|")))
        .expect("call blacklist pattern is valid")
});

// Not preceded by `$` (variable) or `->` (property/method access)
static INCLUDE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^$\w>])(include_once|include|require_once|require)\b")
        .expect("include pattern is valid")
});

static RESERVED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\$({})\b", RESERVED_VARIABLES.join("|")))
        .expect("superglobal pattern is valid")
});

/// Check a code fragment against the blacklist.
pub fn validate(fragment: &str) -> Result<(), SecurityError> {
    let code = strip_code(fragment);

    let violation = if let Some(caps) = CALL_PATTERN.captures(&code) {
        Some(format!("call to `{}` is not allowed", &caps[1]))
    } else if let Some(caps) = INCLUDE_PATTERN.captures(&code) {
        Some(format!("`{}` is not allowed", &caps[1]))
    } else if let Some(caps) = RESERVED_PATTERN.captures(&code) {
        Some(format!("reference to `${}` is not allowed", &caps[1]))
    } else if code.contains('`') {
        Some("shell-escape backtick is not allowed".to_string())
    } else {
        None
    };

    match violation {
        Some(message) => Err(SecurityError {
            message,
            fragment: fragment.trim().to_string(),
        }),
        None => Ok(()),
    }
}

/// Remove comments and blank out string literals.
///
/// `/* */`, `//` and `#` comments are replaced by a single space (line
/// comments keep their newline). String literals become `''` or `""`.
pub fn strip_code(fragment: &str) -> String {
    let chars: Vec<char> = fragment.chars().collect();
    let mut out = String::with_capacity(fragment.len());
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let next = chars.get(pos + 1).copied();

        match c {
            '/' if next == Some('*') => {
                pos += 2;
                while pos < chars.len() && !(chars[pos] == '*' && chars.get(pos + 1) == Some(&'/')) {
                    pos += 1;
                }
                pos += 2;
                out.push(' ');
            }
            '/' if next == Some('/') => {
                pos = skip_line(&chars, pos);
                out.push(' ');
            }
            // `#[` starts a PHP attribute, not a comment
            '#' if next != Some('[') => {
                pos = skip_line(&chars, pos);
                out.push(' ');
            }
            '\'' | '"' => {
                pos += 1;
                while pos < chars.len() && chars[pos] != c {
                    if chars[pos] == '\\' {
                        pos += 1;
                    }
                    pos += 1;
                }
                pos += 1;
                out.push(c);
                out.push(c);
            }
            _ => {
                out.push(c);
                pos += 1;
            }
        }
    }

    out
}

/// Index of the newline ending the current line (or end of input).
fn skip_line(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos] != '\n' {
        pos += 1;
    }
    pos
}
