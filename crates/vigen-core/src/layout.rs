//! Exam page layout: items, shared passages and their bounding boxes.
//!
//! A layout response looks like:
//!
//! ```json
//! {
//!   "layout": {"columns": 2, "width": 1654, "height": 2339, "item_number_pattern": "N."},
//!   "items": [
//!     {"item_number": "37", "bbox": [100, 220, 800, 900], "item_type": "passage_group", "passage_ref": "37-38"}
//!   ],
//!   "passages": [
//!     {"passage_id": "37-38", "bbox": {"x1": 90, "y1": 120, "x2": 810, "y2": 210}, "item_range": "37~38"}
//!   ]
//! }
//! ```
//!
//! Boxes may be given as `[x1, y1, x2, y2]` or as an object. Entries are
//! converted one at a time: an entry that does not fit the model (unknown
//! `item_type`, short box, missing number) or whose box is degenerate
//! (`x2 <= x1` or `y2 <= y1`) is dropped and the rest of the page is kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::extract_json_object;

/// Errors from layout parsing.
#[derive(Error, Debug)]
pub enum LayoutParseError {
    #[error("No JSON object found in layout response")]
    NoJson,

    #[error("Failed to deserialize layout: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Axis-aligned box in page pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }
}

/// Whether an item stands alone or shares a passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemLayoutKind {
    #[default]
    Standalone,
    PassageGroup,
}

/// One item located on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub item_number: String,
    pub page_number: u32,
    pub bbox: BoundingBox,
    #[serde(rename = "item_type")]
    pub kind: ItemLayoutKind,
    pub passage_ref: Option<String>,
    pub confidence: f64,
    pub image_path: Option<String>,
}

/// Page-level layout facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_number: u32,
    pub columns: u32,
    pub width: f64,
    pub height: f64,
    pub item_number_pattern: String,
}

/// A passage shared by several items. `bbox_list` holds extra boxes when
/// the passage continues into another column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageInfo {
    pub passage_id: String,
    pub page_number: u32,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub bbox_list: Vec<BoundingBox>,
    pub item_range: String,
    pub image_path: Option<String>,
}

/// One step of an extraction call, mirrored from the vision phase log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgenticStep {
    pub step_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-page extraction audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgenticLog {
    pub page_number: u32,
    #[serde(default)]
    pub steps: Vec<AgenticStep>,
    pub total_iterations: u32,
    pub success: bool,
}

/// Everything extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub source_pdf: String,
    pub total_pages: u32,
    pub processed_pages: u32,
    #[serde(default)]
    pub items: Vec<ExtractedItem>,
    #[serde(default)]
    pub passages: Vec<PassageInfo>,
    #[serde(default)]
    pub layouts: Vec<PageLayout>,
    pub extracted_at: DateTime<Utc>,
    pub model_version: String,
}

impl ExtractionResult {
    pub fn new(source: impl Into<String>, total_pages: u32, model_version: impl Into<String>) -> Self {
        Self {
            source_pdf: source.into(),
            total_pages,
            processed_pages: 0,
            items: Vec::new(),
            passages: Vec::new(),
            layouts: Vec::new(),
            extracted_at: Utc::now(),
            model_version: model_version.into(),
        }
    }

    /// Append one successfully parsed page.
    pub fn push_page(&mut self, page: PageExtraction) {
        self.processed_pages += 1;
        self.layouts.push(page.layout);
        self.items.extend(page.items);
        self.passages.extend(page.passages);
    }
}

/// Parsed content of a single page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageExtraction {
    pub layout: PageLayout,
    pub items: Vec<ExtractedItem>,
    pub passages: Vec<PassageInfo>,
    /// Entries discarded as malformed or for degenerate boxes
    pub dropped: usize,
}

impl PageExtraction {
    /// Drop items whose confidence is below `min_confidence`.
    /// Returns how many were removed.
    pub fn retain_confident(&mut self, min_confidence: f64) -> usize {
        let before = self.items.len();
        self.items.retain(|i| i.confidence >= min_confidence);
        before - self.items.len()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBox {
    Array([f64; 4]),
    Object { x1: f64, y1: f64, x2: f64, y2: f64 },
}

impl From<RawBox> for BoundingBox {
    fn from(raw: RawBox) -> Self {
        match raw {
            RawBox::Array([x1, y1, x2, y2]) => BoundingBox::new(x1, y1, x2, y2),
            RawBox::Object { x1, y1, x2, y2 } => BoundingBox::new(x1, y1, x2, y2),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawLayout {
    #[serde(default)]
    columns: Option<u32>,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
    #[serde(default)]
    item_number_pattern: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(deserialize_with = "string_or_number")]
    item_number: String,
    bbox: RawBox,
    #[serde(default, alias = "type", alias = "kind")]
    item_type: Option<ItemLayoutKind>,
    #[serde(default)]
    passage_ref: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPassage {
    #[serde(deserialize_with = "string_or_number")]
    passage_id: String,
    bbox: RawBox,
    #[serde(default)]
    bbox_list: Vec<serde_json::Value>,
    #[serde(default)]
    item_range: String,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    layout: Option<RawLayout>,
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    passages: Vec<serde_json::Value>,
}

/// Convert one list entry, `None` when it does not fit `T`.
fn convert_entry<T: serde::de::DeserializeOwned>(value: serde_json::Value, what: &str, page_number: u32) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::debug!(page_number, entry = what, error = %e, "Dropping malformed layout entry");
            None
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Default page size used when the response omits it.
#[derive(Debug, Clone, Copy)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Parse a layout response for page `page_number`.
pub fn parse_page(text: &str, page_number: u32, fallback: PageSize) -> Result<PageExtraction, LayoutParseError> {
    let object = extract_json_object(text).ok_or(LayoutParseError::NoJson)?;
    let raw: RawPage = serde_json::from_value(serde_json::Value::Object(object))?;

    let raw_layout = raw.layout.unwrap_or_default();
    let layout = PageLayout {
        page_number,
        columns: raw_layout.columns.unwrap_or(2),
        width: raw_layout.width.unwrap_or(fallback.width),
        height: raw_layout.height.unwrap_or(fallback.height),
        item_number_pattern: raw_layout.item_number_pattern.unwrap_or_default(),
    };

    let mut dropped = 0;

    let mut items = Vec::with_capacity(raw.items.len());
    for value in raw.items {
        let Some(item) = convert_entry::<RawItem>(value, "item", page_number) else {
            dropped += 1;
            continue;
        };
        let bbox = BoundingBox::from(item.bbox);
        if !bbox.is_valid() {
            dropped += 1;
            continue;
        }
        let kind = item.item_type.unwrap_or(if item.passage_ref.is_some() {
            ItemLayoutKind::PassageGroup
        } else {
            ItemLayoutKind::Standalone
        });
        items.push(ExtractedItem {
            item_number: item.item_number,
            page_number,
            bbox,
            kind,
            passage_ref: item.passage_ref,
            confidence: item.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            image_path: None,
        });
    }

    let mut passages = Vec::with_capacity(raw.passages.len());
    for value in raw.passages {
        let Some(passage) = convert_entry::<RawPassage>(value, "passage", page_number) else {
            dropped += 1;
            continue;
        };
        let bbox = BoundingBox::from(passage.bbox);
        if !bbox.is_valid() {
            dropped += 1;
            continue;
        }
        let bbox_list = passage
            .bbox_list
            .into_iter()
            .filter_map(|v| convert_entry::<RawBox>(v, "passage box", page_number))
            .map(BoundingBox::from)
            .filter(BoundingBox::is_valid)
            .collect();
        passages.push(PassageInfo {
            passage_id: passage.passage_id,
            page_number,
            bbox,
            bbox_list,
            item_range: passage.item_range,
            image_path: None,
        });
    }

    Ok(PageExtraction {
        layout,
        items,
        passages,
        dropped,
    })
}
