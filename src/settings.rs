use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::cropping::CropConfig;
use crate::segmentation::{ProximityConfig, SegmentationConfig};
use crate::selection::{PacingConfig, SelectionConfig};
use crate::timeline::OverlayConfig;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Every pipeline tunable, stored as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub segmentation: SegmentationConfig,
    pub proximity: ProximityConfig,
    pub selection: SelectionConfig,
    pub pacing: PacingConfig,
    pub crop: CropConfig,
    pub overlay: OverlayConfig,
}

impl PipelineSettings {
    pub fn validate(&self) -> crate::error::Result<()> {
        self.segmentation.validate()?;
        self.proximity.validate()?;
        self.selection.validate()?;
        self.pacing.validate()?;
        self.crop.validate()?;
        self.overlay.validate()
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PipelineSettings>,
}

impl SettingsStore {
    /// Loads settings from `path`, or defaults when the file does not exist.
    ///
    /// An unreadable or invalid file falls back to defaults with a warning;
    /// the file is left untouched until the next [`SettingsStore::update`].
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            match read_settings(&path) {
                Ok(settings) => settings,
                Err(err) => {
                    log_warn!("ignoring settings at {}: {err:#}", path.display());
                    PipelineSettings::default()
                }
            }
        } else {
            PipelineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Store that never touched disk; `update` still persists to `path`.
    pub fn with_settings(path: PathBuf, settings: PipelineSettings) -> Self {
        Self {
            path,
            data: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> PipelineSettings {
        self.read().clone()
    }

    /// Validates and persists `settings`, then makes them current.
    pub fn update(&self, settings: PipelineSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &PipelineSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    /// Re-reads the file. On error the current settings stay in place.
    pub fn reload(&self) -> Result<()> {
        let data = read_settings(&self.path)?;
        *self.write() = data;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, PipelineSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PipelineSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_settings(path: &Path) -> Result<PipelineSettings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let settings: PipelineSettings = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
    settings
        .validate()
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("demoreel-settings-{}", Uuid::new_v4()))
            .join("settings.json")
    }

    #[test]
    fn missing_file_gives_defaults() {
        let store = SettingsStore::new(scratch_path()).unwrap();
        assert_eq!(store.current(), PipelineSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{ "selection": { "hero_threshold": 0.65 } }"#).unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        let settings = store.current();
        assert_eq!(settings.selection.hero_threshold, 0.65);
        assert_eq!(settings.selection.super_hero_threshold, 0.8);
        assert_eq!(settings.segmentation, SegmentationConfig::default());

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn update_persists_and_reload_reads_back() {
        let path = scratch_path();
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.current();
        settings.pacing.max_duration_secs = 5.0;
        settings.overlay.success_min_relevance = 0.9;
        store.update(settings.clone()).unwrap();

        let other = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(other.current(), settings);
        other.reload().unwrap();
        assert_eq!(other.current().pacing.max_duration_secs, 5.0);

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn invalid_update_is_rejected_and_not_applied() {
        let store = SettingsStore::new(scratch_path()).unwrap();
        let mut settings = store.current();
        settings.pacing.min_duration_secs = 10.0;

        assert!(store.update(settings).is_err());
        assert_eq!(store.current().pacing, PacingConfig::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.current(), PipelineSettings::default());
        assert!(store.reload().is_err());

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
