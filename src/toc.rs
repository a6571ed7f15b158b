use kuchiki::NodeRef;
use log::{debug, warn};

use crate::dom;
use crate::error::{Result, ThesisError};

pub const LONG_TOC_SELECTOR: &str = ".longTOC";
pub const HEADING_TARGET_CLASS: &str = "heading-target";
const HEADING_SELECTOR: &str = ".md h1, .md h2, .md h3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Level class as rendered, e.g. `level2`.
    pub level_class: String,
    pub level: u8,
    /// Numbering label, e.g. `1.2`.
    pub label: String,
    /// Anchor name the entry links to, e.g. `toc1.2`.
    pub target: String,
}

fn level_from_class(class: &str) -> u8 {
    class
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .unwrap_or(0)
}

/// `1.2\u{a0}\u{a0}` (and any trailing decoration) becomes `1.2`.
fn numbering_label(entry: &NodeRef) -> Result<String> {
    let span = entry
        .select_first("span")
        .map_err(|_| ThesisError::MissingElement("numbering span in TOC entry".to_string()))?;
    let text = span.text_contents();
    let label = text
        .split(|c: char| c == '\u{a0}' || c.is_whitespace())
        .find(|part| !part.is_empty())
        .unwrap_or("")
        .to_string();
    if label.is_empty() {
        return Err(ThesisError::MissingElement(
            "numbering label in TOC entry".to_string(),
        ));
    }
    Ok(label)
}

fn long_toc(document: &NodeRef) -> Result<NodeRef> {
    let blocks: Vec<NodeRef> = document
        .select(LONG_TOC_SELECTOR)
        .map(|found| found.map(|el| el.as_node().clone()).collect())
        .unwrap_or_default();
    match blocks.len() {
        1 => Ok(blocks[0].clone()),
        0 => Err(ThesisError::MissingElement(LONG_TOC_SELECTOR.to_string())),
        count => Err(ThesisError::AmbiguousElement {
            selector: LONG_TOC_SELECTOR.to_string(),
            count,
        }),
    }
}

/// The child of the TOC block that holds the entry links.
fn entry_container(toc: &NodeRef) -> Result<NodeRef> {
    toc.children()
        .find(|child| {
            child.as_element().is_some() && child.children().any(|c| dom::is_element(&c, "a"))
        })
        .ok_or_else(|| ThesisError::MissingElement("TOC entry list".to_string()))
}

/// Replaces the rendered long TOC with a flat `<ol>` whose rows link to
/// `tocN.N` anchors. Entries keep document order.
pub fn rebuild_toc(document: &NodeRef) -> Result<Vec<TocEntry>> {
    let toc = long_toc(document)?;
    let container = entry_container(&toc)?;
    let links: Vec<NodeRef> = container
        .children()
        .filter(|child| dom::is_element(child, "a") && !dom::has_class(child, "tocTop"))
        .collect();

    let mut entries = Vec::with_capacity(links.len());
    for link in &links {
        let level_class = dom::classes(link)
            .into_iter()
            .next()
            .ok_or_else(|| ThesisError::MissingElement("level class on TOC entry".to_string()))?;
        let label = numbering_label(link)?;
        entries.push(TocEntry {
            level: level_from_class(&level_class),
            target: format!("toc{label}"),
            level_class,
            label,
        });
    }

    let list = dom::parse_fragment("<ol></ol>")
        .into_iter()
        .next()
        .ok_or_else(|| ThesisError::MissingElement("TOC list".to_string()))?;
    for (link, entry) in links.iter().zip(&entries) {
        dom::remove_attr(link, "class");
        dom::set_attr(link, "href", format!("#{}", entry.target));
        let row = dom::parse_fragment("<li><span></span></li>")
            .into_iter()
            .next()
            .ok_or_else(|| ThesisError::MissingElement("TOC row".to_string()))?;
        dom::set_attr(&row, "class", entry.level_class.as_str());
        if let Some(span) = row.first_child() {
            span.append(link.clone());
        }
        list.append(row);
    }
    container.insert_before(list);
    container.detach();

    debug!("toc: {} entries rebuilt", entries.len());
    Ok(entries)
}

/// Copies the anchor right before each heading into the heading itself and
/// tags it as a heading target, so the anchor stays on the heading's page.
/// Headings without a preceding anchor (unnumbered ones) are skipped.
pub fn pin_heading_targets(document: &NodeRef) -> usize {
    let headings: Vec<NodeRef> = match document.select(HEADING_SELECTOR) {
        Ok(found) => found.map(|h| h.as_node().clone()).collect(),
        Err(_) => return 0,
    };
    let mut pinned = 0;
    for heading in &headings {
        let anchor = match dom::previous_significant_sibling(heading) {
            Some(node) if dom::is_element(&node, "a") => node,
            _ => {
                warn!("heading without preceding anchor skipped: {}", heading.text_contents().trim());
                continue;
            }
        };
        let copy = dom::deep_clone(&anchor);
        dom::add_class(&copy, HEADING_TARGET_CLASS);
        heading.append(copy);
        pinned += 1;
    }
    debug!("toc: {pinned} heading targets pinned");
    pinned
}
