//! Settings file handling and small formatting helpers for the UI.

use chrono::{DateTime, Local, Utc};
use shared::settings::ChatSettings;
use std::path::{Path, PathBuf};

const BASE_URL_ENV: &str = "CHAT_API_BASE_URL";

pub fn config_path() -> Option<PathBuf> {
    shared::settings::config_dir().map(|p| p.join("settings.json"))
}

/// Where the loaded settings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSource {
    Loaded,
    Missing,
    /// Present but not parseable; left untouched on disk.
    Unreadable,
}

/// Settings for this run.
///
/// Writes defaults only when no settings file exists. The `CHAT_API_BASE_URL`
/// override is applied afterwards and never written back.
pub fn load_settings_or_default() -> ChatSettings {
    match config_path() {
        Some(path) => prepare_settings(&path, std::env::var(BASE_URL_ENV).ok()),
        None => {
            let mut settings = ChatSettings::default();
            apply_base_url_override(&mut settings, std::env::var(BASE_URL_ENV).ok());
            settings
        }
    }
}

fn prepare_settings(path: &Path, base_url_override: Option<String>) -> ChatSettings {
    let (mut settings, source) = load_settings_from(path);
    if source == SettingsSource::Missing {
        // First run: write defaults so they can be edited.
        save_settings_to(path, &settings);
    }
    apply_base_url_override(&mut settings, base_url_override);
    settings
}

/// Blank values count as unset.
pub fn apply_base_url_override(settings: &mut ChatSettings, value: Option<String>) {
    if let Some(base) = value {
        if !base.trim().is_empty() {
            settings.api_base_url = base.trim().to_string();
        }
    }
}

fn load_settings_from(path: &Path) -> (ChatSettings, SettingsSource) {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (ChatSettings::default(), SettingsSource::Missing)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "could not read settings: {}", e);
            return (ChatSettings::default(), SettingsSource::Unreadable);
        }
    };
    match serde_json::from_str::<ChatSettings>(&contents) {
        Ok(settings) => (settings, SettingsSource::Loaded),
        Err(e) => {
            tracing::warn!(path = %path.display(), "settings file is invalid, using defaults for this run: {}", e);
            (ChatSettings::default(), SettingsSource::Unreadable)
        }
    }
}

fn save_settings_to(path: &Path, settings: &ChatSettings) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(json) = serde_json::to_string_pretty(settings) {
        if let Err(e) = std::fs::write(path, json) {
            tracing::warn!(path = %path.display(), "could not write settings: {}", e);
        }
    }
}

/// "just now", "5 min ago", "3 h ago", then the local date and time.
pub fn relative_time(timestamp_ms: i64, now: DateTime<Utc>) -> String {
    let Some(then) = DateTime::<Utc>::from_timestamp_millis(timestamp_ms) else {
        return String::new();
    };

    let elapsed = now.signed_duration_since(then);
    if elapsed.num_seconds() < 60 {
        "just now".to_string()
    } else if elapsed.num_minutes() < 60 {
        format!("{} min ago", elapsed.num_minutes())
    } else if elapsed.num_hours() < 24 {
        format!("{} h ago", elapsed.num_hours())
    } else {
        then.with_timezone(&Local).format("%b %-d, %H:%M").to_string()
    }
}
