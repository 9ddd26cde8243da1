//! PHP template generator.
//!
//! Walks the document tree and renders markup with embedded PHP. Asset
//! declarations found along the way are recorded in the context and injected
//! by [`crate::compile`] once the walk is finished.

use crate::assets::{render_unload, AssetDeclaration};
use crate::filters::{compile_expression, html_escape};
use crate::loops::compile_loop;
use crate::validator::validate;
use crate::{CompilationContext, CompileError};
use quill_parser::ast::{AttrValue, Document, Element, Node, FRAGMENT_TAG, LOAD_TAG, UNLOAD_TAG};

const COND_ATTR: &str = "cond";
const LOOP_ATTR: &str = "loop";

/// Render a document, recording asset declarations in the context.
pub fn generate(doc: &Document, ctx: &mut CompilationContext) -> Result<String, CompileError> {
    let mut out = String::new();

    for node in &doc.children {
        render_node(node, ctx, &mut out)?;
    }

    Ok(out)
}

fn render_node(
    node: &Node,
    ctx: &mut CompilationContext,
    out: &mut String,
) -> Result<(), CompileError> {
    match node {
        Node::Element(el) => render_element(el, ctx, out),
        Node::Text(text) => {
            out.push_str(&compile_markers(text, |s| s.to_string())?);
            Ok(())
        }
        Node::Comment(body) => {
            out.push_str(&render_comment(body));
            Ok(())
        }
        Node::RawCode(code) => {
            out.push_str(&render_code(code)?);
            Ok(())
        }
    }
}

fn render_element(
    el: &Element,
    ctx: &mut CompilationContext,
    out: &mut String,
) -> Result<(), CompileError> {
    if el.is(LOAD_TAG) {
        ctx.assets.declare(AssetDeclaration::from_element(el)?);
        return Ok(());
    }
    if el.is(UNLOAD_TAG) {
        out.push_str(&render_unload(el)?);
        return Ok(());
    }

    let mut children = String::new();
    for child in &el.children {
        render_node(child, ctx, &mut children)?;
    }

    let markup = if el.is(FRAGMENT_TAG) {
        children
    } else if el.is_void() {
        format!("<{}{} />", el.tag_name, render_attributes(el)?)
    } else {
        format!(
            "<{tag}{attrs}>{children}</{tag}>",
            tag = el.tag_name,
            attrs = render_attributes(el)?
        )
    };

    // `loop` takes precedence; a `cond` next to it is stripped unused
    let markup = match directive(el, LOOP_ATTR)? {
        Some(expr) => compile_loop(expr)?.wrap(&markup),
        None => match directive(el, COND_ATTR)? {
            Some(cond) => wrap_condition(cond, &markup)?,
            None => markup,
        },
    };

    out.push_str(&markup);
    Ok(())
}

/// Read a `cond`/`loop` attribute, which must carry an expression.
fn directive<'a>(el: &'a Element, name: &str) -> Result<Option<&'a str>, CompileError> {
    match el.attributes.get(name) {
        None => Ok(None),
        Some(AttrValue::Text(value)) if !value.trim().is_empty() => Ok(Some(value.trim())),
        Some(_) => Err(CompileError::structure(format!(
            "`{name}` on <{}> needs an expression",
            el.tag_name
        ))),
    }
}

fn wrap_condition(cond: &str, body: &str) -> Result<String, CompileError> {
    validate(cond)?;
    Ok(format!("<?php if ({cond}): ?>{body}<?php endif; ?>"))
}

fn render_attributes(el: &Element) -> Result<String, CompileError> {
    let mut attrs = String::new();

    for (name, value) in el.attributes.iter() {
        if name == COND_ATTR || name == LOOP_ATTR || el.is(name) {
            continue;
        }
        attrs.push(' ');
        attrs.push_str(name);
        if let AttrValue::Text(value) = value {
            attrs.push_str("=\"");
            attrs.push_str(&compile_markers(value, html_escape)?);
            attrs.push('"');
        }
    }

    Ok(attrs)
}

fn render_comment(body: &str) -> String {
    let body = body.trim();
    let body = body.strip_suffix("//").unwrap_or(body).trim_end();
    if body.is_empty() {
        String::new()
    } else {
        format!("<!-- {body} -->")
    }
}

fn render_code(code: &str) -> Result<String, CompileError> {
    validate(code)?;
    Ok(format!("<?php {} ?>", code.trim()))
}

fn render_interpolation(expr: &str) -> Result<String, CompileError> {
    validate(expr)?;
    Ok(format!("<?= {} ?>", compile_expression(expr)?))
}

// =========================================================================
// Marker scanning
// =========================================================================

/// Replace `{$expr}` and `{@ code }` markers in one left-to-right pass.
/// Text between markers goes through `literal`; compiled output is never
/// rescanned. An unterminated marker stays literal text.
pub fn compile_markers<F>(text: &str, literal: F) -> Result<String, CompileError>
where
    F: Fn(&str) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = find_marker(rest) {
        out.push_str(&literal(&rest[..start]));
        rest = &rest[start..];

        let Some(end) = matching_brace(rest) else {
            break;
        };
        let (marker, tail) = rest.split_at(end + 1);
        let body = &marker[1..marker.len() - 1];
        match body.strip_prefix('@') {
            Some(code) => out.push_str(&render_code(code)?),
            None => out.push_str(&render_interpolation(body)?),
        }
        rest = tail;
    }

    out.push_str(&literal(rest));
    Ok(out)
}

/// Byte offset of the next `{$` or `{@`.
fn find_marker(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    text.match_indices('{')
        .map(|(index, _)| index)
        .find(|&index| matches!(bytes.get(index + 1), Some(b'$') | Some(b'@')))
}

/// Byte offset of the `}` that balances the `{` at offset zero.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_parser::Parser;

    fn gen(source: &str) -> (String, CompilationContext) {
        let doc = Parser::parse(source);
        let mut ctx = CompilationContext::new();
        let html = generate(&doc, &mut ctx).unwrap();
        (html, ctx)
    }

    fn html(source: &str) -> String {
        gen(source).0
    }

    fn error(source: &str) -> CompileError {
        generate(&Parser::parse(source), &mut CompilationContext::new()).unwrap_err()
    }

    // =========================================================================
    // Plain markup
    // =========================================================================

    #[test]
    fn test_empty_document() {
        assert_eq!(html(""), "");
    }

    #[test]
    fn test_plain_markup_passes_through() {
        assert_eq!(
            html("<div class=\"box\"><p>Hello</p></div>"),
            "<div class=\"box\"><p>Hello</p></div>"
        );
    }

    #[test]
    fn test_doctype_and_stray_angle_are_text() {
        assert_eq!(
            html("<!DOCTYPE html><p>a < b</p>"),
            "<!DOCTYPE html><p>a < b</p>"
        );
    }

    #[test]
    fn test_boolean_attribute() {
        assert_eq!(
            html("<input type=\"checkbox\" checked>"),
            "<input type=\"checkbox\" checked />"
        );
    }

    #[test]
    fn test_attribute_value_escaped() {
        assert_eq!(
            html("<a title='say \"hi\" & go'>x</a>"),
            "<a title=\"say &quot;hi&quot; &amp; go\">x</a>"
        );
    }

    #[test]
    fn test_void_element_drops_stray_children() {
        let doc = Document {
            children: vec![Node::Element(Element {
                tag_name: "br".into(),
                attributes: Default::default(),
                children: vec![Node::Text("lost".into())],
            })],
        };
        let out = generate(&doc, &mut CompilationContext::new()).unwrap();
        assert_eq!(out, "<br />");
    }

    #[test]
    fn test_implicitly_closed_elements() {
        assert_eq!(html("<ul><li>one"), "<ul><li>one</li></ul>");
    }

    // =========================================================================
    // Comments and raw code
    // =========================================================================

    #[test]
    fn test_comment_trimmed() {
        assert_eq!(html("<!--   note   -->"), "<!-- note -->");
    }

    #[test]
    fn test_comment_trailing_slashes_stripped() {
        assert_eq!(html("<!-- note // -->"), "<!-- note -->");
    }

    #[test]
    fn test_empty_comment_dropped() {
        assert_eq!(html("a<!--  -->b"), "ab");
        assert_eq!(html("<!-- // -->"), "");
    }

    #[test]
    fn test_raw_code_block() {
        assert_eq!(
            html("{@ $total = count($items); }"),
            "<?php $total = count($items); ?>"
        );
    }

    #[test]
    fn test_raw_code_with_nested_braces() {
        assert_eq!(
            html("{@ if ($a) { $b = 1; } }"),
            "<?php if ($a) { $b = 1; } ?>"
        );
    }

    #[test]
    fn test_unterminated_raw_code_keeps_inner_brace() {
        assert_eq!(
            html("{@ if ($a) { $b = 1; }"),
            "<?php if ($a) { $b = 1; } ?>"
        );
    }

    #[test]
    fn test_raw_code_validated() {
        assert!(matches!(error("{@ system('ls'); }"), CompileError::Security(_)));
    }

    // =========================================================================
    // Interpolation
    // =========================================================================

    #[test]
    fn test_interpolation_escaped_by_default() {
        assert_eq!(
            html("<p>Hi {$name}!</p>"),
            "<p>Hi <?= htmlspecialchars((string) $name, ENT_QUOTES, 'UTF-8') ?>!</p>"
        );
    }

    #[test]
    fn test_interpolation_with_filters() {
        assert_eq!(
            html("{$items|count}"),
            "<?= count($items) ?>"
        );
    }

    #[test]
    fn test_interpolation_in_attribute() {
        assert_eq!(
            html("<a href=\"/u/{$user->id}?a&b\">x</a>"),
            "<a href=\"/u/<?= htmlspecialchars((string) $user->id, ENT_QUOTES, 'UTF-8') ?>?a&amp;b\">x</a>"
        );
    }

    #[test]
    fn test_code_marker_in_attribute() {
        assert_eq!(
            html("<p class=\"{@ echo $cls; }\">x</p>"),
            "<p class=\"<?php echo $cls; ?>\">x</p>"
        );
    }

    #[test]
    fn test_unterminated_marker_is_literal() {
        assert_eq!(html("<p>{$name</p>"), "<p>{$name</p>");
    }

    #[test]
    fn test_markup_in_quoted_filter_option() {
        assert_eq!(
            html("<p>{$x|default:'<b>'}</p>"),
            "<p><?= htmlspecialchars((string) ($x ?: '<b>'), ENT_QUOTES, 'UTF-8') ?></p>"
        );
    }

    #[test]
    fn test_plain_braces_are_literal() {
        assert_eq!(html("<p>{ not a marker }</p>"), "<p>{ not a marker }</p>");
    }

    #[test]
    fn test_interpolated_superglobal_rejected() {
        assert!(matches!(error("<p>{$_GET}</p>"), CompileError::Security(_)));
    }

    #[test]
    fn test_unknown_filter_rejected() {
        assert!(matches!(error("{$x|shout}"), CompileError::Filter(_)));
    }

    #[test]
    fn test_marker_output_not_rescanned() {
        let out = compile_markers("{$a|default:'{$b}'}", |s| s.to_string()).unwrap();
        assert_eq!(
            out,
            "<?= htmlspecialchars((string) ($a ?: '{$b}'), ENT_QUOTES, 'UTF-8') ?>"
        );
    }

    // =========================================================================
    // Directives
    // =========================================================================

    #[test]
    fn test_cond_wraps_element() {
        assert_eq!(
            html("<p cond=\"$show\">x</p>"),
            "<?php if ($show): ?><p>x</p><?php endif; ?>"
        );
    }

    #[test]
    fn test_loop_wraps_element() {
        assert_eq!(
            html("<li loop=\"items as item\">{$item}</li>"),
            "<?php foreach ($items as $item): ?><li><?= htmlspecialchars((string) $item, ENT_QUOTES, 'UTF-8') ?></li><?php endforeach; ?>"
        );
    }

    #[test]
    fn test_loop_takes_precedence_over_cond() {
        assert_eq!(
            html("<li loop=\"users=>u\" cond=\"$u->active\" class=\"x\">y</li>"),
            "<?php foreach ($users as $u): ?><li class=\"x\">y</li><?php endforeach; ?>"
        );
    }

    #[test]
    fn test_cond_on_void_element() {
        assert_eq!(
            html("<hr cond=\"$sep\">"),
            "<?php if ($sep): ?><hr /><?php endif; ?>"
        );
    }

    #[test]
    fn test_cond_validated() {
        assert!(html("<p cond='\"exec(1)\" == $x'>y</p>").starts_with("<?php if (\"exec(1)\" == $x): ?>"));
        assert!(matches!(error("<p cond=\"exec(1) == $x\">y</p>"), CompileError::Security(_)));
    }

    #[test]
    fn test_directive_without_expression() {
        let err = error("<p cond>y</p>");
        assert_eq!(err.to_string(), "Structure error: `cond` on <p> needs an expression");
        assert!(matches!(error("<p loop=\" \">y</p>"), CompileError::Structure { .. }));
    }

    #[test]
    fn test_fragment_emits_children_only() {
        assert_eq!(html("<fragment><b>a</b>c</fragment>"), "<b>a</b>c");
    }

    #[test]
    fn test_fragment_with_cond() {
        assert_eq!(
            html("<fragment cond=\"$x\">a</fragment>"),
            "<?php if ($x): ?>a<?php endif; ?>"
        );
    }

    #[test]
    fn test_fragment_with_loop_and_cond() {
        assert_eq!(
            html("<fragment loop=\"$i = 0; $i < 3; $i++\" cond=\"$i > 0\">,</fragment>"),
            "<?php for ($i = 0; $i < 3; $i++): ?>,<?php endfor; ?>"
        );
        assert_eq!(
            html("<fragment loop=\"a=>b\" cond=\"$x\">y</fragment>"),
            "<?php foreach ($a as $b): ?>y<?php endforeach; ?>"
        );
    }

    // =========================================================================
    // Assets
    // =========================================================================

    #[test]
    fn test_load_records_declaration() {
        let (out, ctx) = gen("<load target=\"app.css\"/><p>x</p>");
        assert_eq!(out, "<p>x</p>");
        assert_eq!(ctx.assets.len(), 1);
    }

    #[test]
    fn test_load_errors_propagate() {
        assert!(matches!(error("<load index=\"1\">"), CompileError::Structure { .. }));
        assert!(matches!(error("<load target=\"a.txt\">"), CompileError::Structure { .. }));
    }

    #[test]
    fn test_unload_emits_comment() {
        assert_eq!(
            html("<unload target=\"legacy.js\">"),
            "<!-- unload: legacy.js -->"
        );
    }
}
