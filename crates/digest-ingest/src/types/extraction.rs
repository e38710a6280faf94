//! Extraction results returned by the remote pipeline

use serde::{Deserialize, Serialize};

/// Layout role the backend assigned to a text segment
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Headline,
    Body,
    /// Masthead or page header
    Header,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Pixel-space bounding box on the source page
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// A block of OCR text on a page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TextSegment {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: SegmentKind,
    pub text: String,
    #[serde(default, rename = "box")]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub page_number: u32,
}

/// One article assembled from page segments
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticleResult {
    pub headline: String,
    #[serde(default)]
    pub body: String,
    /// Source segments the article was built from
    #[serde(default)]
    pub segments: Vec<TextSegment>,
    /// Layout confidence (0.0 - 1.0)
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_confidence: Option<f32>,
    /// Cluster id of the form `cluster_<n>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_cluster_id: Option<String>,
}

impl ArticleResult {
    pub fn department_or_default(&self) -> &str {
        self.department.as_deref().unwrap_or("General")
    }

    pub fn sentiment_or_default(&self) -> &str {
        self.sentiment_label.as_deref().unwrap_or("Neutral")
    }

    /// Short cluster label: the part after the first `_`, or "None"
    pub fn cluster_label(&self) -> &str {
        self.topic_cluster_id
            .as_deref()
            .and_then(|id| id.split('_').nth(1))
            .filter(|s| !s.is_empty())
            .unwrap_or("None")
    }
}

/// Pipeline output for one document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    #[serde(default)]
    pub articles: Vec<ArticleResult>,
    /// Segments the layout pass could not attach to any article
    #[serde(default)]
    pub unassigned_segments: Vec<TextSegment>,
}

impl ExtractionResult {
    /// Unassigned segment texts joined into one string
    pub fn unassigned_text(&self) -> String {
        self.unassigned_segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
