use std::path::Path;

use kuchiki::NodeRef;
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::dom;
use crate::error::{Result, ThesisError};
use crate::types::{Margins, PageGeometry, Size, parse_length};

pub const BASE_FONT_SIZE_PROPERTY: &str = "--base-font-size";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Print,
    Preview,
    Flipbook,
}

impl View {
    /// Unknown names fall back to print.
    pub fn from_name(name: &str) -> View {
        match name.trim().to_ascii_lowercase().as_str() {
            "preview" => View::Preview,
            "flipbook" => View::Flipbook,
            _ => View::Print,
        }
    }
}

impl<'de> Deserialize<'de> for View {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(View::from_name).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitlePage {
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub institution_extra: Option<String>,
    #[serde(default)]
    pub thesis_kind: Option<String>,
    #[serde(default)]
    pub thesis_title: Option<String>,
    #[serde(default)]
    pub thesis_author: Option<String>,
    #[serde(default)]
    pub thesis_date: Option<String>,
    #[serde(default)]
    pub reviewers: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: String,
    pub height: String,
}

impl Default for PageSize {
    fn default() -> Self {
        Self {
            width: "21cm".to_string(),
            height: "29.7cm".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMargins {
    pub top: String,
    pub inner: String,
    pub outer: String,
    pub bottom: String,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            top: "2.5cm".to_string(),
            inner: "3.5cm".to_string(),
            outer: "2.5cm".to_string(),
            bottom: "2.5cm".to_string(),
        }
    }
}

/// Resolved thesis configuration. Keys mirror the JSON options object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThesisOptions {
    pub view: View,
    pub title_page: Option<TitlePage>,
    pub font_size: f32,
    pub page_size: PageSize,
    pub page_margins: PageMargins,
    pub extra_bindery_rules: Vec<Value>,
    /// Template with `{number}` and `{side}` placeholders.
    pub running_header: String,
    pub markdeep_diagram_scale: f64,
    pub math_jax: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ThesisOptions {
    fn default() -> Self {
        Self {
            view: View::Print,
            title_page: None,
            font_size: 10.5,
            page_size: PageSize::default(),
            page_margins: PageMargins::default(),
            extra_bindery_rules: Vec::new(),
            running_header: "{number}".to_string(),
            markdeep_diagram_scale: 1.0,
            math_jax: vec!["TeX".to_string()],
            extra: Map::new(),
        }
    }
}

impl ThesisOptions {
    /// Shallow merge of `overrides` over the defaults: every top-level key
    /// present in the override replaces the default wholesale.
    pub fn resolve(overrides: Option<Value>) -> Result<Self> {
        let mut merged = match serde_json::to_value(ThesisOptions::default())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        match overrides {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    debug!("option override: {key}");
                    merged.insert(key, value);
                }
            }
            Some(other) => {
                return Err(ThesisError::InvalidConfiguration(format!(
                    "options must be a JSON object, got {other}"
                )));
            }
        }
        let options: ThesisOptions = serde_json::from_value(Value::Object(merged))
            .map_err(|err| ThesisError::InvalidConfiguration(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::resolve(Some(value))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(ThesisError::InvalidConfiguration(format!(
                "fontSize must be a positive number, got {}",
                self.font_size
            )));
        }
        if !self.markdeep_diagram_scale.is_finite() || self.markdeep_diagram_scale <= 0.0 {
            return Err(ThesisError::InvalidConfiguration(format!(
                "markdeepDiagramScale must be a positive number, got {}",
                self.markdeep_diagram_scale
            )));
        }
        self.page_geometry().map(|_| ())
    }

    pub fn page_geometry(&self) -> Result<PageGeometry> {
        Ok(PageGeometry {
            size: Size {
                width: parse_length("pageSize.width", &self.page_size.width)?,
                height: parse_length("pageSize.height", &self.page_size.height)?,
            },
            margins: Margins {
                top: parse_length("pageMargins.top", &self.page_margins.top)?,
                inner: parse_length("pageMargins.inner", &self.page_margins.inner)?,
                outer: parse_length("pageMargins.outer", &self.page_margins.outer)?,
                bottom: parse_length("pageMargins.bottom", &self.page_margins.bottom)?,
            },
        })
    }

    pub fn font_size_css(&self) -> String {
        format!("{}pt", self.font_size)
    }

    /// Writes the base font size onto the root element, where the stylesheet
    /// picks it up as a custom property.
    pub fn apply_font_size(&self, document: &NodeRef) -> Result<()> {
        let root = document
            .select_first("html")
            .map_err(|_| ThesisError::MissingElement("html".to_string()))?;
        dom::set_style_property(root.as_node(), BASE_FONT_SIZE_PROPERTY, &self.font_size_css());
        Ok(())
    }
}
