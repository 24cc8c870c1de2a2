use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::alquran::DEFAULT_API_BASE;
use crate::backend::annotation::DEFAULT_TAFSIR_EDITION;
use crate::backend::audio::{DEFAULT_AUDIO_BASE, DEFAULT_BITRATE};
use crate::backend::gesture::{DEFAULT_SWIPE_THRESHOLD, ReadingDirection};
use crate::backend::model::{Narrator, TOTAL_PAGES};
use crate::backend::page_store::DEFAULT_CACHED_PAGES;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub narrator: Narrator,
    pub reading_direction: ReadingDirection,
    pub swipe_threshold: f32,
    pub api_base: String,
    pub audio_base: String,
    pub bitrate: u32,
    pub tafsir_edition: String,
    pub cached_pages: usize,
    pub start_page: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            narrator: Narrator::default(),
            reading_direction: ReadingDirection::default(),
            swipe_threshold: DEFAULT_SWIPE_THRESHOLD,
            api_base: DEFAULT_API_BASE.to_string(),
            audio_base: DEFAULT_AUDIO_BASE.to_string(),
            bitrate: DEFAULT_BITRATE,
            tafsir_edition: DEFAULT_TAFSIR_EDITION.to_string(),
            cached_pages: DEFAULT_CACHED_PAGES,
            start_page: 1,
        }
    }
}

pub fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taha-tui")
}

pub fn settings_path() -> PathBuf {
    app_dir().join("settings.json")
}

impl Settings {
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    /// Missing file means defaults; an unreadable one is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Settings::default();
        }

        let settings = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<Settings>(&content).map_err(|e| e.to_string())
            });

        match settings {
            Ok(settings) => settings.clamped(),
            Err(e) => {
                log::warn!("ignoring settings at {}: {}", path.display(), e);
                Settings::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }

    fn clamped(mut self) -> Self {
        self.start_page = self.start_page.clamp(1, TOTAL_PAGES);
        if !self.swipe_threshold.is_finite() || self.swipe_threshold <= 0.0 {
            self.swipe_threshold = DEFAULT_SWIPE_THRESHOLD;
        }
        if self.bitrate == 0 {
            self.bitrate = DEFAULT_BITRATE;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"narrator":"ar.husary","reading_direction":"ltr","start_page":9000}"#)
            .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.narrator, Narrator::Husary);
        assert_eq!(settings.reading_direction, ReadingDirection::Ltr);
        assert_eq!(settings.start_page, TOTAL_PAGES);
        assert_eq!(settings.bitrate, DEFAULT_BITRATE);
    }

    #[test]
    fn test_unknown_narrator_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"narrator":"ar.nobody"}"#).unwrap();

        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("settings.json");
        let settings = Settings {
            narrator: Narrator::Sudais,
            start_page: 50,
            ..Settings::default()
        };

        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }
}
