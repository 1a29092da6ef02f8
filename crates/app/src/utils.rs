//! Settings persistence.
//!
//! One JSON file under the platform config directory, no schema
//! versioning: unknown fields are dropped, missing fields take their
//! defaults (see `shared::settings`).

use shared::settings::AppSettings;
use std::path::{Path, PathBuf};

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("multicloud_chat");
        p.push("settings.json");
        p
    })
}

pub fn load_settings_or_default() -> AppSettings {
    config_path()
        .map(|path| load_settings_from(&path))
        .unwrap_or_default()
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    if let Ok(contents) = std::fs::read_to_string(path) {
        if let Ok(settings) = serde_json::from_str(&contents) {
            return settings;
        }
        tracing::warn!(path = %path.display(), "ignoring unreadable settings file");
    }
    AppSettings::default()
}

pub fn save_settings(settings: &AppSettings) {
    if let Some(path) = config_path() {
        save_settings_to(&path, settings);
    }
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(json) = serde_json::to_string_pretty(settings) {
        if let Err(err) = std::fs::write(path, json) {
            tracing::warn!(%err, "failed to write settings");
        }
    }
}
