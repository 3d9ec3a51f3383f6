// Tab Groups Settings Engine
// Manages the extension settings: loading, saving, updating individual values, and resetting to defaults.
// Settings are stored as a JSON file; the live values are shared with the group store so the
// storage scope is read at every write.

use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::types::errors::SettingsError;
use crate::types::settings::{ExtensionSettings, SETTINGS_PREFIX};

/// Settings shared between the engine and the components that read them.
pub type SharedSettings = Arc<RwLock<ExtensionSettings>>;

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<ExtensionSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> ExtensionSettings;
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &str;
}

/// Settings engine implementation that persists settings as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    settings: SharedSettings,
}

impl SettingsEngine {
    /// Creates a new SettingsEngine backed by the JSON file at `config_path`.
    ///
    /// Nothing is read until [`SettingsEngineTrait::load`] is called.
    pub fn new(config_path: &str) -> Self {
        Self {
            config_path: config_path.to_string(),
            settings: Arc::new(RwLock::new(ExtensionSettings::default())),
        }
    }

    /// Handle to the live settings. Updates through the engine are visible through it.
    pub fn shared(&self) -> SharedSettings {
        Arc::clone(&self.settings)
    }

    fn replace(&self, settings: ExtensionSettings) {
        match self.settings.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    /// Strips the editor's `tab-groups.` prefix if present.
    fn normalize_key(key: &str) -> &str {
        key.strip_prefix(SETTINGS_PREFIX).unwrap_or(key)
    }
}

/// Reads the current settings, tolerating a poisoned lock.
pub fn read_settings(settings: &SharedSettings) -> ExtensionSettings {
    match settings.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from the JSON config file.
    ///
    /// If the file does not exist, returns default settings.
    /// If the file exists but is malformed, returns a serialization error.
    fn load(&mut self) -> Result<ExtensionSettings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            debug!("No settings file at {}, using defaults", self.config_path);
            self.replace(ExtensionSettings::default());
            return Ok(ExtensionSettings::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;

        let settings: ExtensionSettings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;

        self.replace(settings.clone());
        Ok(settings)
    }

    /// Saves the current settings to the JSON config file.
    ///
    /// Creates parent directories if they don't exist.
    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.get_settings()).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn get_settings(&self) -> ExtensionSettings {
        read_settings(&self.settings)
    }

    /// Updates one setting by its editor key.
    ///
    /// Accepts both `"saveGlobally"` and `"tab-groups.saveGlobally"`. The value is
    /// validated by deserializing the updated settings, then saved to disk.
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError> {
        let field = Self::normalize_key(key);
        if field.is_empty() {
            return Err(SettingsError::InvalidKey("Key cannot be empty".to_string()));
        }

        let mut json_value = serde_json::to_value(self.get_settings()).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        match &mut json_value {
            serde_json::Value::Object(map) => {
                if !map.contains_key(field) {
                    return Err(SettingsError::InvalidKey(format!(
                        "Key '{}' not found in settings",
                        key
                    )));
                }
                map.insert(field.to_string(), value);
            }
            _ => {
                return Err(SettingsError::SerializationError(
                    "Settings did not serialize to an object".to_string(),
                ));
            }
        }

        let new_settings: ExtensionSettings = serde_json::from_value(json_value).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;

        self.replace(new_settings);
        self.save()?;

        Ok(())
    }

    /// Resets all settings to defaults and saves to disk.
    fn reset(&mut self) -> Result<(), SettingsError> {
        self.replace(ExtensionSettings::default());
        self.save()?;
        Ok(())
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
