//! Filter chain compiler.
//!
//! Turns the body of an interpolation marker (`$name|upper|escape`) into a
//! PHP expression. Filters and escape directives live in two static
//! registries; each filter carries a small emission rule, so all special
//! cases are handled by one dispatch in [`EmitRule::apply`].
//!
//! ```text
//! $price|number:2     →  number_format($price, 2)
//! $name|upper         →  htmlspecialchars((string) strtoupper($name), ENT_QUOTES, 'UTF-8')
//! $url|link:"Home"    →  '<a href="' . htmlspecialchars(...) . '">' . 'Home' . '</a>'
//! ```

use std::sync::LazyLock;

use regex::Regex;

/// A malformed filter chain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Filter error: {message} in `{expression}`")]
pub struct FilterError {
    pub message: String,
    pub expression: String,
}

/// How a filter wraps the accumulated expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitRule {
    /// `func(value)`, or `func(value, arg)` when an argument is present.
    Call(&'static str),
    /// Free-form call with `{value}` and `{arg}` placeholders.
    Template(&'static str),
    /// `func(arg, value)`; the host function takes its format first.
    Reorder(&'static str),
    /// `(value / 1000) . arg`
    Shorten,
    /// Terminal anchor tag; ends the chain.
    Link,
}

impl EmitRule {
    /// Wrap `value` according to the rule. `Link` is terminal and handled by
    /// [`compile_expression`], so it leaves the value untouched here.
    pub fn apply(self, value: &str, arg: Option<&str>) -> String {
        match self {
            EmitRule::Call(func) => match arg {
                Some(arg) => format!("{func}({value}, {arg})"),
                None => format!("{func}({value})"),
            },
            EmitRule::Template(template) => fill_template(template, value, arg.unwrap_or("null")),
            EmitRule::Reorder(func) => format!("{func}({}, {value})", arg.unwrap_or("null")),
            EmitRule::Shorten => format!("({value} / 1000) . {}", arg.unwrap_or("''")),
            EmitRule::Link => value.to_string(),
        }
    }
}

/// A filter registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSpec {
    pub rule: EmitRule,
    /// PHP literal used when the filter is written without `:option`.
    pub default_arg: Option<&'static str>,
    /// Whether the output still needs HTML escaping.
    pub needs_escape: bool,
}

const fn filter(rule: EmitRule, default_arg: Option<&'static str>, needs_escape: bool) -> FilterSpec {
    FilterSpec {
        rule,
        default_arg,
        needs_escape,
    }
}

/// Built-in filters.
pub const FILTERS: &[(&str, FilterSpec)] = &[
    ("upper", filter(EmitRule::Call("strtoupper"), None, true)),
    ("lower", filter(EmitRule::Call("strtolower"), None, true)),
    ("capitalize", filter(EmitRule::Call("ucfirst"), None, true)),
    ("title", filter(EmitRule::Call("ucwords"), None, true)),
    ("trim", filter(EmitRule::Call("trim"), None, true)),
    ("length", filter(EmitRule::Call("mb_strlen"), None, false)),
    ("count", filter(EmitRule::Call("count"), None, false)),
    (
        "truncate",
        filter(EmitRule::Template("mb_strimwidth({value}, 0, {arg}, '...')"), Some("80"), true),
    ),
    ("default", filter(EmitRule::Template("({value} ?: {arg})"), Some("''"), true)),
    ("number", filter(EmitRule::Call("number_format"), Some("0"), false)),
    ("round", filter(EmitRule::Call("round"), Some("0"), false)),
    ("date", filter(EmitRule::Reorder("date"), Some("'Y-m-d'"), true)),
    ("shorten", filter(EmitRule::Shorten, Some("'k'"), true)),
    ("json", filter(EmitRule::Call("json_encode"), None, true)),
    ("urlencode", filter(EmitRule::Call("rawurlencode"), None, false)),
    ("striptags", filter(EmitRule::Call("strip_tags"), None, true)),
    (
        "nl2br",
        filter(
            EmitRule::Template("nl2br(htmlspecialchars((string) {value}, ENT_QUOTES, 'UTF-8'))"),
            None,
            false,
        ),
    ),
    ("link", filter(EmitRule::Link, None, true)),
];

/// Escape directives: name → escaping function, `None` turns escaping off.
pub const ESCAPE_DIRECTIVES: &[(&str, Option<&str>)] = &[
    ("escape", Some("htmlspecialchars")),
    ("e", Some("htmlspecialchars")),
    ("entities", Some("htmlentities")),
    ("noescape", None),
];

/// Escaping applied when nothing in the chain says otherwise.
pub const DEFAULT_ESCAPE: &str = "htmlspecialchars";

pub fn lookup_filter(name: &str) -> Option<&'static FilterSpec> {
    FILTERS.iter().find(|(n, _)| *n == name).map(|(_, spec)| spec)
}

/// Look up an escape directive. The outer `Option` is "is this a
/// directive", the inner one is the selected escaping function.
pub fn lookup_directive(name: &str) -> Option<Option<&'static str>> {
    ESCAPE_DIRECTIVES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, function)| *function)
}

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\$[A-Za-z_]\w*(?:->[A-Za-z_]\w*(?:\([^()]*\))?|\[(?:-?\d+|'[^']*'|"[^"]*"|\$[A-Za-z_]\w*)\])*$"#,
    )
    .expect("variable pattern is valid")
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").expect("number pattern is valid"));

/// Pending final-pass escaping state while walking a chain.
struct Escaping {
    function: &'static str,
    pending: bool,
}

/// Compile `variable (| filter[:option] | directive)*` into a PHP expression.
pub fn compile_expression(expr: &str) -> Result<String, FilterError> {
    let error = |message: String| FilterError {
        message,
        expression: expr.trim().to_string(),
    };

    let segments = split_segments(expr);
    let mut segments = segments.iter().map(|s| s.trim());

    let variable = segments.next().unwrap_or_default();
    if !VARIABLE.is_match(variable) {
        return Err(error(format!("invalid variable reference `{variable}`")));
    }

    let mut value = variable.to_string();
    let mut escaping = Escaping {
        function: DEFAULT_ESCAPE,
        pending: true,
    };

    for segment in segments {
        if segment.is_empty() {
            return Err(error("empty filter segment".to_string()));
        }

        if let Some(directive) = lookup_directive(segment) {
            match directive {
                Some(function) => {
                    escaping.function = function;
                    escaping.pending = true;
                }
                None => escaping.pending = false,
            }
            continue;
        }

        let (name, option) = match segment.split_once(':') {
            Some((name, option)) => (name.trim(), Some(option.trim())),
            None => (segment, None),
        };
        let spec = lookup_filter(name).ok_or_else(|| error(format!("unknown filter `{name}`")))?;

        if spec.rule == EmitRule::Link {
            return Ok(emit_link(&value, option, &escaping));
        }

        let arg = match option {
            Some(option) => Some(php_literal(option)),
            None => spec.default_arg.map(str::to_string),
        };
        value = spec.rule.apply(&value, arg.as_deref());
        escaping.pending = spec.needs_escape;
    }

    if escaping.pending {
        Ok(escape_call(escaping.function, &value))
    } else {
        Ok(value)
    }
}

/// `'<a href="' . V . '">' . L . '</a>'`; the label is escaped at compile time.
fn emit_link(value: &str, label: Option<&str>, escaping: &Escaping) -> String {
    let href = if escaping.pending {
        escape_call(escaping.function, value)
    } else {
        value.to_string()
    };
    let text = match label {
        Some(label) => {
            let label = unquote(label).unwrap_or_else(|| label.to_string());
            single_quoted(&html_escape(&label))
        }
        None => href.clone(),
    };
    format!("'<a href=\"' . {href} . '\">' . {text} . '</a>'")
}

fn escape_call(function: &str, value: &str) -> String {
    format!("{function}((string) {value}, ENT_QUOTES, 'UTF-8')")
}

/// Split on `|` outside quoted option strings.
fn split_segments(expr: &str) -> Vec<String> {
    let mut segments = vec![String::new()];
    let mut quote: Option<char> = None;
    let mut chars = expr.chars();

    while let Some(c) = chars.next() {
        if quote.is_none() && c == '|' {
            segments.push(String::new());
            continue;
        }

        let current = segments.last_mut().expect("segments never empty");
        current.push(c);
        match quote {
            Some(_) if c == '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {}
        }
    }

    segments
}

fn fill_template(template: &str, value: &str, arg: &str) -> String {
    let mut out = String::new();
    let mut rest = template;

    while let Some(index) = rest.find('{') {
        out.push_str(&rest[..index]);
        let tail = &rest[index..];
        if let Some(after) = tail.strip_prefix("{value}") {
            out.push_str(value);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{arg}") {
            out.push_str(arg);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// Turn a filter option into a PHP literal: quoted text becomes a
/// single-quoted string, numbers stay as they are, bare words are quoted.
pub fn php_literal(option: &str) -> String {
    match unquote(option) {
        Some(text) => single_quoted(&text),
        None if NUMBER.is_match(option) => option.to_string(),
        None => single_quoted(option),
    }
}

fn unquote(option: &str) -> Option<String> {
    let quote = option.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = option.strip_prefix(quote)?.strip_suffix(quote)?;
    Some(inner.replace(&format!("\\{quote}"), &quote.to_string()))
}

/// Single-quoted PHP string literal. Only `\` and `'` are special inside.
pub fn single_quoted(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// HTML-escape text the way `htmlspecialchars(..., ENT_QUOTES)` does.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
