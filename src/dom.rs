use std::rc::Rc;

use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};

pub(crate) fn parse_document(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

/// Parses `markup` in body context and returns its top-level nodes, detached.
pub(crate) fn parse_fragment(markup: &str) -> Vec<NodeRef> {
    let document = kuchiki::parse_html().one(format!(
        "<!DOCTYPE html><html><head></head><body>{markup}</body></html>"
    ));
    let body = match document.select_first("body") {
        Ok(body) => body,
        Err(_) => return Vec::new(),
    };
    let nodes: Vec<NodeRef> = body.as_node().children().collect();
    for node in &nodes {
        node.detach();
    }
    nodes
}

/// Structural copy of an element subtree. Only element, text and comment
/// nodes occur below an element; anything else becomes an empty text node.
pub(crate) fn deep_clone(node: &NodeRef) -> NodeRef {
    let copy = match node.data() {
        NodeData::Element(element) => NodeRef::new_element(
            element.name.clone(),
            element.attributes.borrow().map.clone(),
        ),
        NodeData::Text(text) => NodeRef::new_text(text.borrow().clone()),
        NodeData::Comment(text) => NodeRef::new_comment(text.borrow().clone()),
        _ => NodeRef::new_text(String::new()),
    };
    for child in node.children() {
        copy.append(deep_clone(&child));
    }
    copy
}

pub(crate) fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    Rc::ptr_eq(&a.0, &b.0)
}

pub(crate) fn inner_html(node: &NodeRef) -> String {
    node.children().map(|child| child.to_string()).collect()
}

pub(crate) fn clear_children(node: &NodeRef) {
    let children: Vec<NodeRef> = node.children().collect();
    for child in children {
        child.detach();
    }
}

/// Moves `node` into the place of its parent, dropping the parent and any
/// other children it had.
pub(crate) fn replace_parent_with(node: &NodeRef) {
    if let Some(parent) = node.parent() {
        parent.insert_before(node.clone());
        parent.detach();
    }
}

pub(crate) fn is_element(node: &NodeRef, local: &str) -> bool {
    node.as_element()
        .map(|el| el.name.local.as_ref().eq_ignore_ascii_case(local))
        .unwrap_or(false)
}

/// Nearest preceding sibling that is not whitespace-only text.
pub(crate) fn previous_significant_sibling(node: &NodeRef) -> Option<NodeRef> {
    let mut current = node.previous_sibling();
    while let Some(sibling) = current {
        let blank_text = sibling
            .as_text()
            .map(|text| text.borrow().trim().is_empty())
            .unwrap_or(false);
        if !blank_text {
            return Some(sibling);
        }
        current = sibling.previous_sibling();
    }
    None
}

pub(crate) fn attr(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|el| el.attributes.borrow().get(name).map(|v| v.to_string()))
}

pub(crate) fn set_attr(node: &NodeRef, name: &str, value: impl Into<String>) {
    if let Some(el) = node.as_element() {
        el.attributes.borrow_mut().insert(name, value.into());
    }
}

pub(crate) fn remove_attr(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|el| el.attributes.borrow_mut().remove(name).map(|a| a.value))
}

pub(crate) fn classes(node: &NodeRef) -> Vec<String> {
    attr(node, "class")
        .map(|raw| raw.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub(crate) fn has_class(node: &NodeRef, class: &str) -> bool {
    classes(node).iter().any(|c| c == class)
}

pub(crate) fn add_class(node: &NodeRef, class: &str) {
    let mut list = classes(node);
    if list.iter().any(|c| c == class) {
        return;
    }
    list.push(class.to_string());
    set_attr(node, "class", list.join(" "));
}

/// Sets one declaration in the element's inline `style`, keeping the others.
pub(crate) fn set_style_property(node: &NodeRef, name: &str, value: &str) {
    let existing = attr(node, "style").unwrap_or_default();
    let mut declarations = retained_declarations(&existing, name);
    declarations.push(format!("{name}: {value}"));
    set_attr(node, "style", declarations.join("; "));
}

fn retained_declarations(style: &str, replaced: &str) -> Vec<String> {
    if style.trim().is_empty() {
        return Vec::new();
    }
    let parsed = match StyleAttribute::parse(style, ParserOptions::default()) {
        Ok(parsed) => parsed,
        Err(_) => return raw_declarations_without(style, replaced),
    };
    let block = &parsed.declarations;
    let mut out = Vec::new();
    for (props, important) in [
        (&block.declarations, false),
        (&block.important_declarations, true),
    ] {
        for prop in props.iter() {
            if prop.property_id().name().eq_ignore_ascii_case(replaced) {
                continue;
            }
            if let Ok(css) = prop.to_css_string(important, PrinterOptions::default()) {
                out.push(css);
            }
        }
    }
    out
}

/// Fallback for styles lightningcss rejects: split on `;` and drop the
/// declarations of `replaced`.
fn raw_declarations_without(style: &str, replaced: &str) -> Vec<String> {
    style
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .filter(|decl| {
            let name = decl.split(':').next().unwrap_or("").trim();
            !name.eq_ignore_ascii_case(replaced)
        })
        .map(str::to_string)
        .collect()
}

/// Drops `.md p` elements whose markup is only whitespace. Returns how many
/// were removed.
pub(crate) fn remove_empty_paragraphs(document: &NodeRef) -> usize {
    let empty: Vec<NodeRef> = match document.select(".md p") {
        Ok(paragraphs) => paragraphs
            .map(|p| p.as_node().clone())
            .filter(|p| inner_html(p).trim().is_empty())
            .collect(),
        Err(_) => return 0,
    };
    for p in &empty {
        p.detach();
    }
    empty.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_clone_is_detached_from_source() {
        let doc = parse_document(r#"<div id="src"><b class="x">bold</b> tail</div>"#);
        let src = doc.select_first("#src").expect("src");
        let copy = deep_clone(src.as_node());
        copy.first_child().expect("b").detach();
        assert_eq!(inner_html(src.as_node()), r#"<b class="x">bold</b> tail"#);
        assert_eq!(inner_html(&copy), " tail");
    }

    #[test]
    fn replace_parent_unwraps_single_child() {
        let doc = parse_document(r##"<p>x<sup><a href="#n">1</a></sup>y</p>"##);
        let a = doc.select_first("a").expect("a");
        replace_parent_with(a.as_node());
        let p = doc.select_first("p").expect("p");
        assert_eq!(inner_html(p.as_node()), r##"x<a href="#n">1</a>y"##);
    }

    #[test]
    fn style_property_replaces_only_named_declaration() {
        let doc = parse_document(r#"<svg style="color: red; width: 10px"></svg>"#);
        let svg = doc.select_first("svg").expect("svg");
        set_style_property(svg.as_node(), "width", "200px");
        let style = attr(svg.as_node(), "style").expect("style");
        assert!(style.contains("color"), "style={style}");
        assert!(style.contains("width: 200px"), "style={style}");
        assert!(!style.contains("10px"), "style={style}");
    }

    #[test]
    fn unparsed_style_fallback_drops_replaced_declaration() {
        assert_eq!(
            raw_declarations_without("width: 3px; color: {red}; WIDTH:4px;", "width"),
            vec!["color: {red}".to_string()]
        );
        assert!(raw_declarations_without("  ;  ", "width").is_empty());
    }

    #[test]
    fn empty_paragraphs_inside_content_root_are_removed() {
        let doc = parse_document(
            "<p> </p><div class=\"md\"><p>\n  </p><p>kept</p><p></p></div>",
        );
        assert_eq!(remove_empty_paragraphs(&doc), 2);
        assert_eq!(doc.select("p").expect("select").count(), 2);
    }

    #[test]
    fn class_helpers_do_not_duplicate() {
        let doc = parse_document(r#"<a class="one"></a>"#);
        let a = doc.select_first("a").expect("a");
        add_class(a.as_node(), "two");
        add_class(a.as_node(), "two");
        assert_eq!(classes(a.as_node()), vec!["one", "two"]);
        assert!(has_class(a.as_node(), "one"));
    }
}
