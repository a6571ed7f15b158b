//! Layout rules handed to the paginator, including the render callbacks the
//! paginator invokes while laying out pages.

use std::fmt;
use std::sync::Arc;

use kuchiki::NodeRef;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};

use crate::dom;
use crate::endnotes::{FOOTNOTE_REFERENCE_CLASS, footnote_content};
use crate::error::Result;
use crate::toc::HEADING_TARGET_CLASS;

/// Physical pages before page 1 of the numbered text.
pub const FRONT_MATTER_PAGES: i64 = 2;
pub const TOC_ENTRY_SELECTOR: &str = ".longTOC li";
pub const EXTERNAL_LINK_SELECTOR: &str =
    "p a[href^=\"http\"], blockquote a[href^=\"http\"], li a[href^=\"http\"]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Continuation {
    Same,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakPosition {
    Before,
    Avoid,
}

/// What the paginator knows about a page when asking for its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    pub number: i64,
    pub is_left: bool,
}

pub type RunningHeaderFn = Arc<dyn Fn(&PageDescriptor) -> String + Send + Sync>;

/// Header formatter from a template with `{number}` and `{side}` placeholders.
fn template_running_header(template: impl Into<String>) -> RunningHeaderFn {
    let template = template.into();
    Arc::new(move |page: &PageDescriptor| {
        let side = if page.is_left { "left" } else { "right" };
        template
            .replace("{number}", &page.number.to_string())
            .replace("{side}", side)
    })
}

#[derive(Clone)]
pub struct RunningHeader {
    formatter: RunningHeaderFn,
    /// Source template, when the formatter came from one.
    template: Option<String>,
    front_matter_pages: i64,
}

impl RunningHeader {
    pub fn new(formatter: RunningHeaderFn) -> Self {
        Self {
            formatter,
            template: None,
            front_matter_pages: FRONT_MATTER_PAGES,
        }
    }

    pub fn from_template(template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            formatter: template_running_header(template.clone()),
            template: Some(template),
            front_matter_pages: FRONT_MATTER_PAGES,
        }
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Shifts the physical page number past the front matter; pages that end
    /// up at zero or below get no header.
    pub fn render(&self, page: &PageDescriptor) -> String {
        let number = page.number - self.front_matter_pages;
        if number <= 0 {
            return String::new();
        }
        (self.formatter)(&PageDescriptor {
            number,
            is_left: page.is_left,
        })
    }
}

impl fmt::Debug for RunningHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningHeader")
            .field("template", &self.template)
            .field("front_matter_pages", &self.front_matter_pages)
            .finish_non_exhaustive()
    }
}

/// Back-fills TOC rows with the page number of the heading they point to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReference {
    pub selector: String,
    pub front_matter_pages: i64,
}

impl Default for PageReference {
    fn default() -> Self {
        Self {
            selector: TOC_ENTRY_SELECTOR.to_string(),
            front_matter_pages: FRONT_MATTER_PAGES,
        }
    }
}

impl PageReference {
    /// Selector of the pinned heading anchor a TOC row refers to.
    pub fn target_selector(&self, entry: &NodeRef) -> Option<String> {
        let link = entry.select_first("a").ok()?;
        let href = dom::attr(link.as_node(), "href")?;
        let name = href.strip_prefix('#').unwrap_or(&href);
        if name.is_empty() {
            return None;
        }
        Some(format!(
            "a.target.{HEADING_TARGET_CLASS}[name='{}']",
            name.replace('\'', "\\'")
        ))
    }

    pub fn is_target(&self, entry: &NodeRef, candidate: &NodeRef) -> bool {
        match self.target_selector(entry) {
            Some(selector) => candidate.select_first(&selector).is_ok(),
            None => false,
        }
    }

    pub fn replace(&self, entry: &NodeRef, physical_page: i64) {
        let number = physical_page - self.front_matter_pages;
        for node in dom::parse_fragment(&format!("<span class=\"num\">{number}</span>")) {
            entry.append(node);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FootnoteKind {
    /// Content decoded from the converted endnote reference.
    Endnote,
    /// "See URL" note for a bare external link.
    ExternalLink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footnote {
    pub selector: String,
    pub kind: FootnoteKind,
}

impl Footnote {
    pub fn endnotes() -> Self {
        Self {
            selector: format!("a.{FOOTNOTE_REFERENCE_CLASS}"),
            kind: FootnoteKind::Endnote,
        }
    }

    pub fn external_links() -> Self {
        Self {
            selector: EXTERNAL_LINK_SELECTOR.to_string(),
            kind: FootnoteKind::ExternalLink,
        }
    }

    pub fn render(&self, reference: &NodeRef, number: usize) -> Result<String> {
        match self.kind {
            FootnoteKind::Endnote => Ok(format!("<sup>{number}</sup>{}", footnote_content(reference)?)),
            FootnoteKind::ExternalLink => {
                let href = escape_attr(&dom::attr(reference, "href").unwrap_or_default());
                Ok(format!(
                    "<sup>{number}</sup> See <a href=\"{href}\" class=\"url\">{href}</a>."
                ))
            }
        }
    }
}

fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub enum Rule {
    FullBleedPage {
        selector: String,
        continue_on: Continuation,
    },
    PageBreak {
        selector: String,
        position: BreakPosition,
        continue_on: Option<Continuation>,
    },
    RunningHeader(RunningHeader),
    PageReference(PageReference),
    Footnote(Footnote),
    /// User-supplied rule, passed through untouched.
    Extra(Value),
}

impl Rule {
    pub fn page_break(selector: &str, position: BreakPosition, continue_on: Option<Continuation>) -> Rule {
        Rule::PageBreak {
            selector: selector.to_string(),
            position,
            continue_on,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Rule::FullBleedPage {
                selector,
                continue_on,
            } => json!({ "rule": "FullBleedPage", "selector": selector, "continue": continue_on }),
            Rule::PageBreak {
                selector,
                position,
                continue_on,
            } => {
                let mut value = json!({ "rule": "PageBreak", "selector": selector, "position": position });
                if let (Some(continue_on), Value::Object(map)) = (continue_on, &mut value) {
                    map.insert("continue".to_string(), json!(continue_on));
                }
                value
            }
            Rule::RunningHeader(header) => {
                let mut value = json!({
                    "rule": "RunningHeader",
                    "frontMatterPages": header.front_matter_pages,
                });
                if let (Some(template), Value::Object(map)) = (&header.template, &mut value) {
                    map.insert("template".to_string(), json!(template));
                }
                value
            }
            Rule::PageReference(reference) => json!({
                "rule": "PageReference",
                "selector": reference.selector,
                "frontMatterPages": reference.front_matter_pages,
                "target": format!("a.target.{HEADING_TARGET_CLASS}[name]"),
            }),
            Rule::Footnote(footnote) => json!({
                "rule": "Footnote",
                "selector": footnote.selector,
                "kind": footnote.kind,
            }),
            Rule::Extra(value) => value.clone(),
        }
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Built-in thesis rules in paginator order, then `extra` verbatim.
pub fn thesis_rules(running_header: RunningHeader, extra: &[Value]) -> Vec<Rule> {
    let mut rules = vec![
        Rule::FullBleedPage {
            selector: ".title-page".to_string(),
            continue_on: Continuation::Same,
        },
        Rule::page_break("h1", BreakPosition::Before, Some(Continuation::Right)),
        Rule::page_break(".nonumberh1", BreakPosition::Before, Some(Continuation::Right)),
        Rule::page_break("hr", BreakPosition::Before, Some(Continuation::Right)),
        Rule::page_break(".image", BreakPosition::Avoid, None),
        Rule::page_break(".table", BreakPosition::Avoid, None),
        Rule::RunningHeader(running_header),
        Rule::PageReference(PageReference::default()),
        Rule::Footnote(Footnote::endnotes()),
        Rule::Footnote(Footnote::external_links()),
    ];
    rules.extend(extra.iter().cloned().map(Rule::Extra));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endnotes::{FOOTNOTE_CONTENT_ATTR, encode_footnote_content};

    fn header(template: &str) -> RunningHeader {
        RunningHeader::from_template(template)
    }

    #[test]
    fn running_header_skips_front_matter() {
        let header = header("{number}");
        let page = |number| PageDescriptor {
            number,
            is_left: false,
        };
        assert_eq!(header.render(&page(1)), "");
        assert_eq!(header.render(&page(2)), "");
        assert_eq!(header.render(&page(3)), "1");
        assert_eq!(header.render(&page(12)), "10");
    }

    #[test]
    fn template_header_serializes_its_template() {
        let json = Rule::RunningHeader(header("Chapter page {number}")).to_json();
        assert_eq!(json["template"], "Chapter page {number}");
        assert_eq!(json["frontMatterPages"], 2);

        let closure = RunningHeader::new(Arc::new(|page: &PageDescriptor| page.number.to_string()));
        assert_eq!(closure.template(), None);
        assert!(Rule::RunningHeader(closure).to_json().get("template").is_none());
    }

    #[test]
    fn running_header_template_knows_the_side() {
        let header = header("{side}:{number}");
        let left = PageDescriptor {
            number: 5,
            is_left: true,
        };
        assert_eq!(header.render(&left), "left:3");
    }

    #[test]
    fn page_reference_targets_pinned_heading_anchor() {
        let doc = dom::parse_document(
            r##"<div class="longTOC"><ol><li class="level1"><span><a href="#toc1.2">Intro</a></span></li></ol></div>
                <h2 id="h">Intro<a class="target heading-target" name="toc1.2">&nbsp;</a></h2>
                <h2 id="other">Other<a class="target" name="toc1.2">&nbsp;</a></h2>"##,
        );
        let reference = PageReference::default();
        let entry = doc.select_first(TOC_ENTRY_SELECTOR).expect("entry");
        let heading = doc.select_first("#h").expect("heading");
        let other = doc.select_first("#other").expect("other");
        assert!(reference.is_target(entry.as_node(), heading.as_node()));
        assert!(!reference.is_target(entry.as_node(), other.as_node()));

        reference.replace(entry.as_node(), 9);
        let num = entry.as_node().select_first("span.num").expect("num");
        assert_eq!(num.text_contents(), "7");
    }

    #[test]
    fn footnotes_render_decoded_endnote_and_link_notice() {
        let doc = dom::parse_document(r#"<p><a id="n"></a><a id="l" href="https://example.org/a?b=1&c=2">site</a></p>"#);
        let note = doc.select_first("#n").expect("note");
        dom::set_attr(note.as_node(), FOOTNOTE_CONTENT_ATTR, encode_footnote_content("Note <em>A</em>."));
        assert_eq!(
            Footnote::endnotes().render(note.as_node(), 3).expect("render"),
            "<sup>3</sup>Note <em>A</em>."
        );
        let link = doc.select_first("#l").expect("link");
        assert_eq!(
            Footnote::external_links().render(link.as_node(), 4).expect("render"),
            "<sup>4</sup> See <a href=\"https://example.org/a?b=1&amp;c=2\" class=\"url\">https://example.org/a?b=1&amp;c=2</a>."
        );
    }

    #[test]
    fn built_in_rules_precede_extras() {
        let extra = vec![json!({ "rule": "Custom", "selector": ".x" })];
        let rules = thesis_rules(RunningHeader::from_template("{number}"), &extra);
        assert_eq!(rules.len(), 11);
        assert!(matches!(rules[0], Rule::FullBleedPage { .. }));
        assert_eq!(rules[10].to_json(), extra[0]);
        let json = serde_json::to_value(&rules).expect("json");
        assert_eq!(json[1]["selector"], "h1");
        assert_eq!(json[1]["continue"], "right");
        assert_eq!(json[4]["position"], "avoid");
        assert!(json[4].get("continue").is_none());
        assert_eq!(json[9]["kind"], "externalLink");
    }
}
