use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{sorted_by_time, Frame};

/// Relevance tier used to pick frames for a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    /// Every analyzed frame
    #[default]
    All,
    Hero,
    SuperHero,
    /// Caller-supplied threshold
    Custom,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::All => "all",
            SelectionMode::Hero => "hero",
            SelectionMode::SuperHero => "super-hero",
            SelectionMode::Custom => "custom",
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionMode {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SelectionMode::All),
            "hero" => Ok(SelectionMode::Hero),
            "super-hero" | "superhero" | "super_hero" => Ok(SelectionMode::SuperHero),
            "custom" => Ok(SelectionMode::Custom),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown selection mode '{other}'"
            ))),
        }
    }
}

/// Thresholds behind the named selection tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub hero_threshold: f64,
    pub super_hero_threshold: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            hero_threshold: 0.7,
            super_hero_threshold: 0.8,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<()> {
        check_threshold("hero_threshold", self.hero_threshold)?;
        check_threshold("super_hero_threshold", self.super_hero_threshold)
    }

    /// Relevance a frame needs under `mode`.
    pub fn threshold_for(&self, mode: SelectionMode, custom: Option<f64>) -> Result<f64> {
        match mode {
            SelectionMode::All => Ok(0.0),
            SelectionMode::Hero => Ok(self.hero_threshold),
            SelectionMode::SuperHero => Ok(self.super_hero_threshold),
            SelectionMode::Custom => {
                let threshold = custom.ok_or_else(|| {
                    PipelineError::InvalidConfig("custom selection requires a threshold".into())
                })?;
                check_threshold("custom threshold", threshold)?;
                Ok(threshold)
            }
        }
    }
}

fn check_threshold(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// Analyzed frames whose relevance reaches `threshold`, oldest first.
///
/// Unscored frames count as [`crate::models::DEFAULT_RELEVANCE`]. Input
/// order is not trusted.
pub fn select_frames(frames: &[Frame], threshold: f64) -> Vec<Frame> {
    let eligible: Vec<Frame> = frames
        .iter()
        .filter(|frame| frame.analyzed && frame.effective_relevance() >= threshold)
        .cloned()
        .collect();
    sorted_by_time(&eligible)
}

/// Resolves the threshold for `mode` and selects frames with it.
pub fn select(
    frames: &[Frame],
    mode: SelectionMode,
    custom_threshold: Option<f64>,
    config: &SelectionConfig,
) -> Result<Vec<Frame>> {
    let threshold = config.threshold_for(mode, custom_threshold)?;
    Ok(select_frames(frames, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn scored(scores: &[f64]) -> Vec<Frame> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| Frame::new("s", i as u64, at(i as i64 * 10), "App").with_relevance(*score))
            .collect()
    }

    #[test]
    fn hero_mode_keeps_frames_at_or_above_point_seven() {
        let frames = scored(&[0.5, 0.72, 0.95, 0.3]);
        let picked = select(&frames, SelectionMode::Hero, None, &SelectionConfig::default()).unwrap();
        let numbers: Vec<u64> = picked.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn all_mode_keeps_every_analyzed_frame_even_at_zero() {
        let mut frames = scored(&[0.0, 1.0, 0.3]);
        frames.push(Frame::new("s", 9, at(100), "App").with_analyzed(true));
        let picked = select(&frames, SelectionMode::All, None, &SelectionConfig::default()).unwrap();
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn unanalyzed_frames_are_always_excluded() {
        let frames = vec![
            Frame::new("s", 1, at(0), "App"),
            Frame::new("s", 2, at(10), "App").with_relevance(0.9).with_analyzed(false),
        ];
        let picked = select(&frames, SelectionMode::All, None, &SelectionConfig::default()).unwrap();
        assert!(picked.is_empty());
    }

    #[test]
    fn output_is_sorted_by_timestamp() {
        let mut frames = scored(&[0.9, 0.8, 0.95]);
        frames.reverse();
        let picked = select_frames(&frames, 0.0);
        assert!(picked.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn super_hero_and_custom_thresholds() {
        let frames = scored(&[0.79, 0.8, 0.55]);
        let config = SelectionConfig::default();
        assert_eq!(select(&frames, SelectionMode::SuperHero, None, &config).unwrap().len(), 1);
        assert_eq!(select(&frames, SelectionMode::Custom, Some(0.55), &config).unwrap().len(), 3);
    }

    #[test]
    fn custom_mode_requires_valid_threshold() {
        let config = SelectionConfig::default();
        assert!(config.threshold_for(SelectionMode::Custom, None).is_err());
        assert!(config.threshold_for(SelectionMode::Custom, Some(1.5)).is_err());
        assert!(config.threshold_for(SelectionMode::Custom, Some(f64::NAN)).is_err());
    }

    #[test]
    fn unscored_frames_use_default_relevance() {
        let frames = vec![Frame::new("s", 1, at(0), "App").with_analyzed(true)];
        assert_eq!(select_frames(&frames, 0.5).len(), 1);
        assert!(select_frames(&frames, 0.51).is_empty());
    }

    #[test]
    fn modes_parse_from_strings() {
        assert_eq!("super-hero".parse::<SelectionMode>().unwrap(), SelectionMode::SuperHero);
        assert_eq!("Hero".parse::<SelectionMode>().unwrap(), SelectionMode::Hero);
        assert!("legendary".parse::<SelectionMode>().is_err());
    }
}
