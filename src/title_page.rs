use kuchiki::NodeRef;
use log::debug;

use crate::dom;
use crate::error::{Result, ThesisError};
use crate::options::TitlePage;

pub const TITLE_PAGE_CLASS: &str = "title-page";
pub const REVIEWER_CLASS: &str = "thesis-reviewer";

/// Field values are trusted author markup; newlines become `<br>`.
fn field(value: Option<&str>) -> String {
    value
        .unwrap_or("")
        .trim()
        .split('\n')
        .collect::<Vec<_>>()
        .join("<br>")
}

pub fn title_page_markup(title: &TitlePage) -> String {
    let mut out = String::new();
    out.push_str(&format!("<div class=\"{TITLE_PAGE_CLASS}\">"));
    out.push_str("<div class=\"title-top\">");
    out.push_str(&format!(
        "<div class=\"title-institution\">{}</div>",
        field(title.institution.as_deref())
    ));
    out.push_str(&format!(
        "<div class=\"title-institution-extra\">{}</div>",
        field(title.institution_extra.as_deref())
    ));
    out.push_str("</div>");
    out.push_str("<div class=\"title-middle\">");
    for (class, value) in [
        ("title-kind", &title.thesis_kind),
        ("title-title", &title.thesis_title),
        ("title-author", &title.thesis_author),
        ("title-date", &title.thesis_date),
    ] {
        out.push_str(&format!(
            "<div class=\"{class}\">{}</div>",
            field(value.as_deref())
        ));
    }
    out.push_str("</div>");
    out.push_str("<div class=\"title-bottom\">");
    if let Some(reviewers) = title.reviewers.as_ref().filter(|r| !r.is_empty()) {
        out.push_str(&format!(
            "<div class=\"{REVIEWER_CLASS} thesis-reviewer-heading\">Reviewers:</div>"
        ));
        for reviewer in reviewers {
            out.push_str(&format!(
                "<div class=\"{REVIEWER_CLASS}\">{}</div>",
                field(Some(reviewer.as_str()))
            ));
        }
    }
    out.push_str("</div>");
    out.push_str("</div>");
    out.push_str("<hr>");
    out
}

/// Inserts the title block and its separating rule as the first child of the
/// `.md` root. Returns whether anything was inserted.
pub fn render_title_page(document: &NodeRef, title: Option<&TitlePage>) -> Result<bool> {
    let Some(title) = title else {
        return Ok(false);
    };
    let root = document
        .select_first(".md")
        .map_err(|_| ThesisError::MissingElement(".md".to_string()))?;
    let wrapper = dom::parse_fragment("<div></div>")
        .into_iter()
        .next()
        .ok_or_else(|| ThesisError::MissingElement("title page wrapper".to_string()))?;
    for node in dom::parse_fragment(&title_page_markup(title)) {
        wrapper.append(node);
    }
    root.as_node().prepend(wrapper);
    debug!(
        "title page inserted ({} reviewers)",
        title.reviewers.as_ref().map(Vec::len).unwrap_or(0)
    );
    Ok(true)
}
