//! Endnote to footnote conversion.
//!
//! Markdeep renders an endnote reference as `<sup><a href="#endnote-x">1</a></sup>`
//! and the note itself as a block holding an `<a name="endnote-x">` target,
//! a leading `<sup>` ordinal and the note content. The paginator numbers
//! footnotes itself, so each reference is rewritten to carry the note content
//! (base64 of its inner markup) and the endnote blocks are removed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kuchiki::NodeRef;
use log::debug;

use crate::dom;
use crate::error::{Result, ThesisError};

pub const FOOTNOTE_CONTENT_ATTR: &str = "data-footnote-content";
pub const FOOTNOTE_REFERENCE_CLASS: &str = "footnote-reference";
const REFERENCE_SELECTOR: &str = "sup > a[href^='#endnote-']";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndnoteSummary {
    pub references: usize,
    pub bodies_removed: usize,
}

pub fn encode_footnote_content(markup: &str) -> String {
    STANDARD.encode(markup.as_bytes())
}

pub fn decode_footnote_content(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| ThesisError::FootnoteContent(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| ThesisError::FootnoteContent(err.to_string()))
}

/// Decoded note markup carried by a converted reference.
pub fn footnote_content(reference: &NodeRef) -> Result<String> {
    let encoded = dom::attr(reference, FOOTNOTE_CONTENT_ATTR).ok_or_else(|| {
        ThesisError::FootnoteContent(format!("reference has no {FOOTNOTE_CONTENT_ATTR}"))
    })?;
    decode_footnote_content(&encoded)
}

fn find_body(document: &NodeRef, name: &str) -> Option<NodeRef> {
    let anchors = document.select("a[name]").ok()?;
    for anchor in anchors {
        let matches = anchor.attributes.borrow().get("name") == Some(name);
        if matches {
            return anchor.as_node().parent();
        }
    }
    None
}

/// Copy of the endnote body without its leading ordinal, serialized.
fn body_markup(body: &NodeRef) -> String {
    let copy = dom::deep_clone(body);
    let ordinal = copy
        .children()
        .find(|child| child.as_element().is_some() && !dom::is_element(child, "a"));
    if let Some(ordinal) = ordinal.filter(|node| dom::is_element(node, "sup")) {
        ordinal.detach();
    }
    dom::inner_html(&copy)
}

/// Every reference is resolved before the first one is rewritten, so an
/// unresolved reference leaves the document unchanged.
pub fn convert_endnotes(document: &NodeRef) -> Result<EndnoteSummary> {
    let references: Vec<NodeRef> = match document.select(REFERENCE_SELECTOR) {
        Ok(found) => found.map(|a| a.as_node().clone()).collect(),
        Err(_) => Vec::new(),
    };

    let mut resolved: Vec<(NodeRef, NodeRef)> = Vec::with_capacity(references.len());
    for reference in references {
        let href = dom::attr(&reference, "href").unwrap_or_default();
        let name = href.trim_start_matches('#');
        let body = find_body(document, name)
            .ok_or_else(|| ThesisError::UnresolvedEndnote(name.to_string()))?;
        resolved.push((reference, body));
    }

    let mut bodies: Vec<NodeRef> = Vec::new();
    for (reference, body) in &resolved {
        if !bodies.iter().any(|seen| dom::same_node(seen, body)) {
            bodies.push(body.clone());
        }
        let encoded = encode_footnote_content(&body_markup(body));
        dom::set_attr(reference, FOOTNOTE_CONTENT_ATTR, encoded);
        dom::add_class(reference, FOOTNOTE_REFERENCE_CLASS);
        dom::clear_children(reference);
        dom::replace_parent_with(reference);
    }

    for body in &bodies {
        body.detach();
    }

    let summary = EndnoteSummary {
        references: resolved.len(),
        bodies_removed: bodies.len(),
    };
    debug!(
        "endnotes: {} references, {} bodies removed",
        summary.references, summary.bodies_removed
    );
    Ok(summary)
}
