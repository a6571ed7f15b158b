use lightningcss::traits::Parse;
use lightningcss::values::length::LengthValue;

use crate::error::{Result, ThesisError};

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Pt(f32);

impl Pt {
    pub const ZERO: Pt = Pt(0.0);

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        // Quantize to thousandths so parsed lengths compare stably.
        Pt((value * 1000.0).round() / 1000.0)
    }

    pub fn to_f32(self) -> f32 {
        self.0
    }

    /// Parses an absolute CSS length (`21cm`, `2.5mm`, `1in`, `10pt`, `12px`, `1pc`).
    /// A bare `0` is accepted; relative units are not.
    pub fn parse_css(raw: &str) -> Option<Pt> {
        let raw = raw.trim();
        if raw == "0" {
            return Some(Pt::ZERO);
        }
        let length = LengthValue::parse_string(raw).ok()?;
        length.to_px().map(|px| Pt::from_f32(px * 0.75))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

/// Margins of a bound page. `inner` is the binding edge, so it is the left
/// margin on right-hand pages and the right margin on left-hand pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Pt,
    pub inner: Pt,
    pub outer: Pt,
    pub bottom: Pt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub size: Size,
    pub margins: Margins,
}

pub(crate) fn parse_length(field: &str, raw: &str) -> Result<Pt> {
    Pt::parse_css(raw).ok_or_else(|| {
        ThesisError::InvalidConfiguration(format!("{field}: '{raw}' is not an absolute CSS length"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(value: Pt, expected: f32) -> bool {
        (value.to_f32() - expected).abs() <= 0.01
    }

    #[test]
    fn parses_absolute_units_to_points() {
        assert!(approx(Pt::parse_css("1in").expect("in"), 72.0));
        assert!(approx(Pt::parse_css("10pt").expect("pt"), 10.0));
        assert!(approx(Pt::parse_css("16px").expect("px"), 12.0));
        assert!(approx(Pt::parse_css("2.54cm").expect("cm"), 72.0));
        assert!(approx(Pt::parse_css(" 25.4mm ").expect("mm"), 72.0));
        assert_eq!(Pt::parse_css("0"), Some(Pt::ZERO));
    }

    #[test]
    fn rejects_relative_and_garbage_lengths() {
        assert_eq!(Pt::parse_css("2em"), None);
        assert_eq!(Pt::parse_css("wide"), None);
        assert!(parse_length("pageSize.width", "50%").is_err());
    }
}
