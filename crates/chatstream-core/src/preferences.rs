use crate::app::domain::window::MAX_WINDOW_MESSAGES;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Preferences {
    #[serde(default)]
    pub history: HistoryPreferences,

    #[serde(default)]
    pub model: ModelPreferences,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPreferences {
    #[serde(default = "default_max_window_messages")]
    pub max_window_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelPreferences {
    pub default_model: Option<String>,
}

fn default_max_window_messages() -> usize {
    MAX_WINDOW_MESSAGES
}

impl Default for HistoryPreferences {
    fn default() -> Self {
        Self {
            max_window_messages: default_max_window_messages(),
        }
    }
}

impl Preferences {
    /// Get the path to the preferences file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            Error::Configuration("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("chatstream").join("preferences.toml"))
    }

    /// Load preferences from disk, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        match toml::from_str(&contents) {
            Ok(prefs) => Ok(prefs),
            Err(e) => {
                tracing::warn!(
                    target: "chatstream::preferences",
                    "Failed to parse preferences file at {:?}: {}. Using defaults.",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Save preferences to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Window size to use, never below one message.
    pub fn max_window_messages(&self) -> usize {
        self.history.max_window_messages.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let prefs = Preferences::load_from(&dir.path().join("preferences.toml")).unwrap();
        assert_eq!(prefs, Preferences::default());
        assert_eq!(prefs.max_window_messages(), 800);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("preferences.toml");
        let prefs = Preferences {
            history: HistoryPreferences {
                max_window_messages: 50,
            },
            model: ModelPreferences {
                default_model: Some("gemini-2.5-pro".to_string()),
            },
        };

        prefs.save_to(&path).unwrap();
        assert_eq!(Preferences::load_from(&path).unwrap(), prefs);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "[model]\ndefault_model = \"m\"\n").unwrap();

        let prefs = Preferences::load_from(&path).unwrap();
        assert_eq!(prefs.history.max_window_messages, 800);
        assert_eq!(prefs.model.default_model.as_deref(), Some("m"));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "history = [not toml").unwrap();

        assert_eq!(Preferences::load_from(&path).unwrap(), Preferences::default());
    }

    #[test]
    fn zero_window_is_clamped() {
        let mut prefs = Preferences::default();
        prefs.history.max_window_messages = 0;
        assert_eq!(prefs.max_window_messages(), 1);
    }
}
