use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::theme::{AccentColor, ThemeVariant};

/// Discrete chart window choices, in seconds.
pub const TIME_RANGES: &[(u64, &str)] = &[
    (60, "1m"),
    (300, "5m"),
    (600, "10m"),
    (1800, "30m"),
    (3600, "1h"),
    (10800, "3h"),
    (21600, "6h"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub theme: ThemeVariant,
    pub accent: AccentColor,
    /// Base URL of the license server.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Chart window applied on startup, in seconds.
    #[serde(default = "default_time_range_secs")]
    pub time_range_secs: u64,
    /// Pre-filled user name for the borrow form.
    #[serde(default)]
    pub default_user: String,
    /// Desktop notifications on connection failure / critical overage.
    #[serde(default = "default_notifications")]
    pub notifications: bool,
    /// Auto-detect system dark/light theme.
    #[serde(default)]
    pub auto_theme: bool,
}

fn default_server_url() -> String {
    String::from("http://localhost:8000")
}
fn default_time_range_secs() -> u64 {
    1800
}
fn default_notifications() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: ThemeVariant::CatppuccinMocha,
            accent: AccentColor::Blue,
            server_url: default_server_url(),
            time_range_secs: default_time_range_secs(),
            default_user: String::new(),
            notifications: default_notifications(),
            auto_theme: false,
        }
    }
}

impl Preferences {
    fn config_dir() -> PathBuf {
        dirs::config_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("seatwatch")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("preferences.json")
    }

    pub fn load() -> Self {
        let path = Self::config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let mut prefs: Self = serde_json::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!(%e, "invalid preferences file, using defaults");
                    Self::default()
                });
                prefs.sanitize();
                prefs
            }
            Err(_) => Self::default(),
        }
    }

    /// Snap persisted values back into valid ranges.
    fn sanitize(&mut self) {
        if !TIME_RANGES.iter().any(|(s, _)| *s == self.time_range_secs) {
            self.time_range_secs = default_time_range_secs();
        }
        let trimmed = self.server_url.trim();
        self.server_url = if trimmed.is_empty() {
            default_server_url()
        } else {
            trimmed.trim_end_matches('/').to_string()
        };
    }

    pub fn save(&self) {
        let dir = Self::config_dir();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!(%e, "failed to create config directory");
            return;
        }

        // Set restrictive permissions on config directory (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700));
        }

        let path = Self::config_path();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, &json) {
                    tracing::warn!(%e, "failed to save preferences");
                    return;
                }
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o600));
                }
            }
            Err(e) => {
                tracing::warn!(%e, "failed to serialize preferences");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let prefs = Preferences::default();
        assert_eq!(prefs.server_url, "http://localhost:8000");
        assert_eq!(prefs.time_range_secs, 1800);
        assert!(prefs.notifications);
        assert!(prefs.default_user.is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let prefs = Preferences::default();
        let json = serde_json::to_string(&prefs).unwrap();
        let loaded: Preferences = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.server_url, prefs.server_url);
        assert_eq!(loaded.theme, prefs.theme);
    }

    #[test]
    fn test_backwards_compat_missing_fields() {
        // Simulate an old config without the newer fields
        let old_json = r#"{"theme":"CatppuccinMocha","accent":"Blue"}"#;
        let mut prefs: Preferences = serde_json::from_str(old_json).unwrap();
        prefs.sanitize();
        assert_eq!(prefs.server_url, "http://localhost:8000");
        assert_eq!(prefs.time_range_secs, 1800);
        assert!(prefs.notifications);
    }

    #[test]
    fn test_sanitize_snaps_bad_values() {
        let json = r#"{"theme":"GruvboxDark","accent":"Green",
                       "server_url":"http://example.test/ ",
                       "time_range_secs": 1234}"#;
        let mut prefs: Preferences = serde_json::from_str(json).unwrap();
        prefs.sanitize();
        assert_eq!(prefs.time_range_secs, 1800);
        assert_eq!(prefs.server_url, "http://example.test");
    }
}
