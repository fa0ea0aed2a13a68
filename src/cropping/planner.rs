use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{Frame, WindowBounds};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Margin kept around the window for its shadow and chrome
    pub padding_px: f64,
    /// Windows narrower or shorter than this are shown uncropped
    pub min_window_px: f64,
    /// Pixel crops running at once
    pub max_concurrency: usize,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            padding_px: 20.0,
            min_window_px: 100.0,
            max_concurrency: 4,
        }
    }
}

impl CropConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.padding_px.is_finite() || self.padding_px < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "padding_px must be a non-negative number, got {}",
                self.padding_px
            )));
        }
        if !self.min_window_px.is_finite() || self.min_window_px < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "min_window_px must be a non-negative number, got {}",
                self.min_window_px
            )));
        }
        if self.max_concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Integer crop rectangle in screen points, with the screen it lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl CropRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn fits_screen(&self) -> bool {
        self.right() <= self.screen_width && self.bottom() <= self.screen_height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropReason {
    Cropped,
    Fullscreen,
    NoBounds,
    TooSmall,
    /// Screen size rounds down to nothing
    InvalidScreen,
}

impl CropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CropReason::Cropped => "cropped",
            CropReason::Fullscreen => "fullscreen",
            CropReason::NoBounds => "no-bounds",
            CropReason::TooSmall => "too-small",
            CropReason::InvalidScreen => "invalid-screen",
        }
    }
}

/// Whether and where to crop one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropPlan {
    pub rect: Option<CropRect>,
    pub reason: CropReason,
}

impl CropPlan {
    fn passthrough(reason: CropReason) -> Self {
        Self { rect: None, reason }
    }

    pub fn is_passthrough(&self) -> bool {
        self.rect.is_none()
    }
}

/// Window area that lies on screen, before padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleWindow {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Shifts the window origin onto the screen and trims its size to what fits.
pub fn clamp_to_screen(bounds: &WindowBounds, screen_width: f64, screen_height: f64) -> VisibleWindow {
    let x = bounds.x.clamp(0.0, (screen_width - bounds.width).max(0.0));
    let y = bounds.y.clamp(0.0, (screen_height - bounds.height).max(0.0));
    VisibleWindow {
        x,
        y,
        width: bounds.width.min(screen_width - x),
        height: bounds.height.min(screen_height - y),
    }
}

/// Decides how to crop `frame` to its window.
///
/// Fullscreen frames, frames without bounds and tiny windows pass through.
/// Otherwise the visible window area is padded on every side and rounded
/// to whole pixels; the result always lies within the screen.
pub fn plan_crop(frame: &Frame, config: &CropConfig) -> CropPlan {
    let Some(bounds) = frame.window_bounds.as_ref() else {
        return CropPlan::passthrough(CropReason::NoBounds);
    };
    if bounds.is_fullscreen {
        return CropPlan::passthrough(CropReason::Fullscreen);
    }
    if bounds.width < config.min_window_px || bounds.height < config.min_window_px {
        return CropPlan::passthrough(CropReason::TooSmall);
    }

    let screen_width = bounds.screen_width.floor();
    let screen_height = bounds.screen_height.floor();
    if !(screen_width >= 1.0 && screen_height >= 1.0) {
        return CropPlan::passthrough(CropReason::InvalidScreen);
    }

    let visible = clamp_to_screen(bounds, screen_width, screen_height);
    let (x, width) = pad_axis(visible.x, visible.width, config.padding_px, screen_width);
    let (y, height) = pad_axis(visible.y, visible.height, config.padding_px, screen_height);

    CropPlan {
        rect: Some(CropRect {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
            screen_width: screen_width as u32,
            screen_height: screen_height as u32,
        }),
        reason: CropReason::Cropped,
    }
}

/// Pads one axis and rounds it to whole pixels inside `[0, extent]`.
fn pad_axis(start: f64, length: f64, padding: f64, extent: f64) -> (f64, f64) {
    let padded_start = (start - padding).max(0.0);
    let padded_length = (length + 2.0 * padding).min(extent - padded_start);

    let start = padded_start.round().clamp(0.0, extent);
    let length = padded_length.round().clamp(0.0, extent - start);
    (start, length)
}
