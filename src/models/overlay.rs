use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    Caption,
    Timestamp,
    SuccessIndicator,
    ProgressBar,
}

/// Screen anchor the renderer should place an overlay at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    /// Lower third, standard caption placement
    Bottom,
    TopLeft,
    TopRight,
    /// Full-width strip along the bottom edge
    BottomEdge,
}

impl OverlayPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayPosition::Bottom => "bottom",
            OverlayPosition::TopLeft => "top-left",
            OverlayPosition::TopRight => "top-right",
            OverlayPosition::BottomEdge => "bottom-edge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRecord {
    pub kind: OverlayKind,
    pub text: Option<String>,
    pub start_time: f64,
    pub duration: f64,
    pub position: OverlayPosition,
    /// Index of the annotated segment; `None` for composition-wide overlays.
    pub segment_index: Option<usize>,
}

impl OverlayRecord {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}
