use kuchiki::NodeRef;
use log::debug;

use crate::dom;
use crate::error::{Result, ThesisError};

const DIAGRAM_SELECTOR: &str = "svg.diagram";

fn pixel_dimension(diagram: &NodeRef, name: &str) -> Result<(String, f64)> {
    let raw = dom::attr(diagram, name).ok_or_else(|| {
        ThesisError::InvalidDiagram(format!("missing {name} attribute (already rescaled?)"))
    })?;
    let number = raw
        .trim()
        .trim_end_matches("px")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| ThesisError::InvalidDiagram(format!("{name}='{raw}' is not a pixel size")))?;
    Ok((raw.trim().trim_end_matches("px").trim().to_string(), number))
}

/// Moves a diagram's pixel size into its viewBox and displays it at `zoom`
/// times that size. The width/height attributes are consumed, so a second
/// pass over the same diagram fails.
pub fn rescale_diagram(diagram: &NodeRef, zoom: f64) -> Result<()> {
    let (width_raw, width) = pixel_dimension(diagram, "width")?;
    let (height_raw, height) = pixel_dimension(diagram, "height")?;
    dom::remove_attr(diagram, "width");
    dom::remove_attr(diagram, "height");
    dom::set_attr(diagram, "viewBox", format!("0 0 {width_raw} {height_raw}"));
    dom::set_style_property(diagram, "width", &format!("{}px", width * zoom));
    dom::set_style_property(diagram, "height", &format!("{}px", height * zoom));
    Ok(())
}

/// All diagrams are validated before any is rewritten.
pub fn rescale_diagrams(document: &NodeRef, zoom: f64) -> Result<usize> {
    let diagrams: Vec<NodeRef> = match document.select(DIAGRAM_SELECTOR) {
        Ok(found) => found.map(|el| el.as_node().clone()).collect(),
        Err(_) => Vec::new(),
    };
    for diagram in &diagrams {
        pixel_dimension(diagram, "width")?;
        pixel_dimension(diagram, "height")?;
    }
    for diagram in &diagrams {
        rescale_diagram(diagram, zoom)?;
    }
    debug!("diagrams: {} rescaled at zoom {zoom}", diagrams.len());
    Ok(diagrams.len())
}
