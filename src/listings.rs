use kuchiki::NodeRef;
use log::debug;

use crate::dom;
use crate::error::{Result, ThesisError};

pub const LINE_NUMBER_ATTR: &str = "data-linenumber";
pub const LINE_NUMBER_RULE: &str =
    ".md pre.listing .linenumbers span.line:before { content: attr(data-linenumber) !important; }";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingSummary {
    pub listings: usize,
    pub lines: usize,
}

fn install_line_number_rule(document: &NodeRef) -> Result<()> {
    let head = document
        .select_first("head")
        .map_err(|_| ThesisError::MissingElement("head".to_string()))?;
    let style = dom::parse_fragment(&format!(
        "<style class=\"listing-linenumbers\">{LINE_NUMBER_RULE}</style>"
    ));
    for node in style {
        head.as_node().append(node);
    }
    Ok(())
}

/// Freezes listing line numbers into `data-linenumber` attributes so a
/// listing split across pages keeps counting where it left off.
pub fn stabilize_line_numbers(document: &NodeRef) -> Result<ListingSummary> {
    install_line_number_rule(document)?;

    let listings: Vec<NodeRef> = match document.select("pre .linenumbers") {
        Ok(found) => found.map(|el| el.as_node().clone()).collect(),
        Err(_) => Vec::new(),
    };
    let mut summary = ListingSummary {
        listings: listings.len(),
        lines: 0,
    };
    for listing in &listings {
        let lines = match listing.select(".line") {
            Ok(found) => found,
            Err(_) => continue,
        };
        for (index, line) in lines.enumerate() {
            dom::set_attr(line.as_node(), LINE_NUMBER_ATTR, (index + 1).to_string());
            summary.lines += 1;
        }
    }
    debug!(
        "listings: {} listings, {} lines numbered",
        summary.listings, summary.lines
    );
    Ok(summary)
}
