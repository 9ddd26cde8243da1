//! Deferred CSS/JS asset declarations.
//!
//! `<load>` tags are recorded during the tree walk and emitted once after
//! the whole document is rendered: stylesheets and head scripts right before
//! `</head>`, body scripts right before `</body>`.

use quill_parser::ast::Element;

use crate::filters::html_escape;
use crate::CompileError;

/// Order index of a declaration without `index`: after everything else.
pub const LAST: i64 = i64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Css,
    Js,
}

impl AssetKind {
    /// Infer the kind from the target's extension, ignoring any query string
    /// or fragment.
    pub fn from_target(target: &str) -> Option<AssetKind> {
        let path = target
            .split(['?', '#'])
            .next()
            .unwrap_or(target)
            .to_ascii_lowercase();
        if path.ends_with(".css") {
            Some(AssetKind::Css)
        } else if path.ends_with(".js") || path.ends_with(".mjs") {
            Some(AssetKind::Js)
        } else {
            None
        }
    }
}

/// Where a script tag is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptSlot {
    #[default]
    Head,
    Body,
}

/// One `<load>` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDeclaration {
    pub kind: AssetKind,
    pub target: String,
    pub order_index: i64,
    /// CSS only.
    pub media: String,
    /// JS only.
    pub slot: ScriptSlot,
}

impl AssetDeclaration {
    /// Read a declaration from a `<load target index media type>` element.
    pub fn from_element(el: &Element) -> Result<Self, CompileError> {
        let target = required_target(el)?;
        let kind = asset_kind(&el.tag_name, target)?;

        let order_index = match el.attributes.get_text("index") {
            Some(index) => index.trim().parse::<i64>().map_err(|_| {
                CompileError::structure(format!(
                    "<{}> `index` must be an integer, got `{index}`",
                    el.tag_name
                ))
            })?,
            None => LAST,
        };

        let media = el
            .attributes
            .get_text("media")
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("all")
            .to_string();

        let slot = match el.attributes.get_text("type").map(str::trim) {
            None | Some("head") => ScriptSlot::Head,
            Some("body") => ScriptSlot::Body,
            Some(other) if kind == AssetKind::Js => {
                return Err(CompileError::structure(format!(
                    "<{}> `type` must be `head` or `body`, got `{other}`",
                    el.tag_name
                )))
            }
            Some(_) => ScriptSlot::Head,
        };

        Ok(AssetDeclaration {
            kind,
            target: target.to_string(),
            order_index,
            media,
            slot,
        })
    }

    fn render(&self) -> String {
        let target = html_escape(&self.target);
        match self.kind {
            AssetKind::Css => format!(
                "<link rel=\"stylesheet\" href=\"{target}\" media=\"{}\">\n",
                html_escape(&self.media)
            ),
            AssetKind::Js => format!("<script src=\"{target}\"></script>\n"),
        }
    }
}

/// Render the documentation comment for an `<unload target>` element.
pub fn render_unload(el: &Element) -> Result<String, CompileError> {
    let target = required_target(el)?;
    asset_kind(&el.tag_name, target)?;
    Ok(format!("<!-- unload: {} -->", html_escape(target)))
}

fn required_target(el: &Element) -> Result<&str, CompileError> {
    el.attributes
        .get_text("target")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            CompileError::structure(format!("<{}> requires a `target` attribute", el.tag_name))
        })
}

fn asset_kind(tag: &str, target: &str) -> Result<AssetKind, CompileError> {
    AssetKind::from_target(target).ok_or_else(|| {
        CompileError::structure(format!(
            "<{tag}> target `{target}` is not a supported asset (expected .css or .js)"
        ))
    })
}

/// Declarations collected during one compile invocation.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    css: Vec<AssetDeclaration>,
    js: Vec<AssetDeclaration>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, declaration: AssetDeclaration) {
        match declaration.kind {
            AssetKind::Css => self.css.push(declaration),
            AssetKind::Js => self.js.push(declaration),
        }
    }

    pub fn len(&self) -> usize {
        self.css.len() + self.js.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Head block: stylesheets, then head-slot scripts.
    pub fn head_block(&self) -> String {
        let mut block = render_sorted(self.css.iter());
        block.push_str(&render_sorted(self.js.iter().filter(|d| d.slot == ScriptSlot::Head)));
        block
    }

    pub fn body_block(&self) -> String {
        render_sorted(self.js.iter().filter(|d| d.slot == ScriptSlot::Body))
    }

    /// Insert the head and body blocks before the first `</head>` and
    /// `</body>` markers. Without a marker the block is dropped.
    pub fn inject(&self, mut html: String) -> String {
        if self.is_empty() {
            return html;
        }

        for (marker, block) in [("</head>", self.head_block()), ("</body>", self.body_block())] {
            if block.is_empty() {
                continue;
            }
            match find_ignore_case(&html, marker) {
                Some(index) => html.insert_str(index, &block),
                None => tracing::warn!(marker, "no marker in output, dropping asset declarations"),
            }
        }

        html
    }
}

/// Stable sort by order index; equal indexes keep declaration order.
fn render_sorted<'a>(declarations: impl Iterator<Item = &'a AssetDeclaration>) -> String {
    let mut sorted: Vec<&AssetDeclaration> = declarations.collect();
    sorted.sort_by_key(|d| d.order_index);
    sorted.iter().map(|d| d.render()).collect()
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets intact
    haystack.to_ascii_lowercase().find(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_parser::ast::{AttrValue, Attributes};

    fn load(attrs: &[(&str, &str)]) -> Element {
        let attributes: Attributes = attrs
            .iter()
            .map(|(n, v)| (*n, AttrValue::Text(v.to_string())))
            .collect();
        Element::new("load", attributes)
    }

    fn declare(attrs: &[(&str, &str)]) -> AssetDeclaration {
        AssetDeclaration::from_element(&load(attrs)).unwrap()
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(AssetKind::from_target("a/b.css"), Some(AssetKind::Css));
        assert_eq!(AssetKind::from_target("APP.JS"), Some(AssetKind::Js));
        assert_eq!(AssetKind::from_target("mod.mjs?v=2"), Some(AssetKind::Js));
        assert_eq!(AssetKind::from_target("style.css#x"), Some(AssetKind::Css));
        assert_eq!(AssetKind::from_target("logo.png"), None);
        assert_eq!(AssetKind::from_target("css"), None);
    }

    #[test]
    fn test_defaults() {
        let css = declare(&[("target", "app.css")]);
        assert_eq!(css.kind, AssetKind::Css);
        assert_eq!(css.order_index, LAST);
        assert_eq!(css.media, "all");

        let js = declare(&[("target", "app.js")]);
        assert_eq!(js.slot, ScriptSlot::Head);
    }

    #[test]
    fn test_explicit_attributes() {
        let css = declare(&[("target", "print.css"), ("index", " -3 "), ("media", "print")]);
        assert_eq!(css.order_index, -3);
        assert_eq!(css.media, "print");

        let js = declare(&[("target", "app.js"), ("type", "body")]);
        assert_eq!(js.slot, ScriptSlot::Body);
    }

    #[test]
    fn test_missing_target() {
        let err = AssetDeclaration::from_element(&load(&[("index", "1")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Structure error: <load> requires a `target` attribute"
        );
    }

    #[test]
    fn test_boolean_target_is_missing() {
        let el = Element::new("load", [("target", AttrValue::Bool)].into_iter().collect());
        assert!(AssetDeclaration::from_element(&el).is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let err = AssetDeclaration::from_element(&load(&[("target", "font.woff")])).unwrap_err();
        assert!(err.to_string().contains("not a supported asset"));
    }

    #[test]
    fn test_bad_index_and_slot() {
        assert!(AssetDeclaration::from_element(&load(&[("target", "a.css"), ("index", "first")])).is_err());
        assert!(AssetDeclaration::from_element(&load(&[("target", "a.js"), ("type", "footer")])).is_err());
    }

    #[test]
    fn test_unload_comment() {
        let el = Element::new(
            "unload",
            [("target", AttrValue::Text("old.js".into()))].into_iter().collect(),
        );
        assert_eq!(render_unload(&el).unwrap(), "<!-- unload: old.js -->");

        let el = Element::new(
            "unload",
            [("target", AttrValue::Text("old.txt".into()))].into_iter().collect(),
        );
        assert!(render_unload(&el).is_err());
    }

    // =========================================================================
    // Ordering and injection
    // =========================================================================

    #[test]
    fn test_sorted_by_index_then_declaration_order() {
        let mut registry = AssetRegistry::new();
        registry.declare(declare(&[("target", "last.css")]));
        registry.declare(declare(&[("target", "two-a.css"), ("index", "2")]));
        registry.declare(declare(&[("target", "one.css"), ("index", "1")]));
        registry.declare(declare(&[("target", "two-b.css"), ("index", "2")]));

        assert_eq!(
            registry.head_block(),
            "<link rel=\"stylesheet\" href=\"one.css\" media=\"all\">\n\
             <link rel=\"stylesheet\" href=\"two-a.css\" media=\"all\">\n\
             <link rel=\"stylesheet\" href=\"two-b.css\" media=\"all\">\n\
             <link rel=\"stylesheet\" href=\"last.css\" media=\"all\">\n"
        );
    }

    #[test]
    fn test_inject_head_and_body() {
        let mut registry = AssetRegistry::new();
        registry.declare(declare(&[("target", "app.js"), ("type", "body")]));
        registry.declare(declare(&[("target", "head.js")]));
        registry.declare(declare(&[("target", "site.css")]));

        let html = "<html><head><title>t</title></HEAD><body><p>x</p></body></html>".to_string();
        assert_eq!(
            registry.inject(html),
            "<html><head><title>t</title>\
             <link rel=\"stylesheet\" href=\"site.css\" media=\"all\">\n\
             <script src=\"head.js\"></script>\n\
             </HEAD><body><p>x</p>\
             <script src=\"app.js\"></script>\n\
             </body></html>"
        );
    }

    #[test]
    fn test_inject_only_before_first_marker() {
        let mut registry = AssetRegistry::new();
        registry.declare(declare(&[("target", "a.css")]));
        let out = registry.inject("</head></head>".to_string());
        assert_eq!(
            out,
            "<link rel=\"stylesheet\" href=\"a.css\" media=\"all\">\n</head></head>"
        );
    }

    #[test]
    fn test_missing_markers_drop_declarations() {
        let mut registry = AssetRegistry::new();
        registry.declare(declare(&[("target", "a.css")]));
        registry.declare(declare(&[("target", "b.js"), ("type", "body")]));
        assert_eq!(registry.inject("<p>x</p>".to_string()), "<p>x</p>");
    }

    #[test]
    fn test_target_is_escaped() {
        let mut registry = AssetRegistry::new();
        registry.declare(declare(&[("target", "a.js?x=1&y=\"2\"")]));
        assert_eq!(
            registry.head_block(),
            "<script src=\"a.js?x=1&amp;y=&quot;2&quot;\"></script>\n"
        );
    }
}
