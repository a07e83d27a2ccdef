//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Default session shape (study length, break cadence, page goal)
//! - Presence detection tuning (confidence floor, grace period)
//! - Notification preferences
//!
//! Configuration is stored at `~/.config/studyroom/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::data_dir;
use crate::session::SessionConfig;

/// Default session shape, in minutes (matching how users think about
/// study blocks; the session layer works in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default = "default_study_minutes")]
    pub study_minutes: u64,
    #[serde(default = "default_break_interval_minutes")]
    pub break_interval_minutes: u64,
    #[serde(default = "default_break_minutes")]
    pub break_minutes: u64,
    #[serde(default = "default_page_goal")]
    pub page_goal: u32,
}

/// Presence detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Detections below this confidence count as absent.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,
    /// Seconds of confirmed absence before the session pauses.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_50")]
    pub volume: u32,
    /// Path to a custom notification sound file (optional).
    #[serde(default)]
    pub custom_sound: Option<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/studyroom/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionDefaults,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Show the presence-detection debug overlay.
    #[serde(default)]
    pub debug_overlay: bool,
}

// Default functions
fn default_study_minutes() -> u64 {
    25
}
fn default_break_interval_minutes() -> u64 {
    25
}
fn default_break_minutes() -> u64 {
    5
}
fn default_page_goal() -> u32 {
    10
}
fn default_confidence_floor() -> f32 {
    0.5
}
fn default_grace_secs() -> u64 {
    3
}
fn default_true() -> bool {
    true
}
fn default_50() -> u32 {
    50
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            study_minutes: default_study_minutes(),
            break_interval_minutes: default_break_interval_minutes(),
            break_minutes: default_break_minutes(),
            page_goal: default_page_goal(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_floor: default_confidence_floor(),
            grace_secs: default_grace_secs(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 50,
            custom_sound: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionDefaults::default(),
            presence: PresenceConfig::default(),
            notifications: NotificationsConfig::default(),
            debug_overlay: false,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err("config key is empty".into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| format!("unknown config key: {key}"))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| format!("unknown config key: {key}"))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(value.parse::<bool>()?),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| format!("cannot parse '{value}' as number"))?
                        } else {
                            return Err(format!("cannot parse '{value}' as number").into());
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value)?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| format!("unknown config key: {key}"))?;
        }

        Err(format!("unknown config key: {key}").into())
    }

    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        self.save()?;
        Ok(())
    }

    /// Session configuration from the configured defaults.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(
            self.session.study_minutes * 60,
            self.session.break_interval_minutes * 60,
            self.session.break_minutes * 60,
        )
        .with_page_goal(self.session.page_goal)
    }

    /// Absence grace period.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.presence.grace_secs)
    }
}
