//! Named server profiles saved between runs.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use photosync_core::util::normalize_text_option;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const APP_DIR_NAME: &str = "photosync";
const CONFIG_FILE_NAME: &str = "cli-config.json";
const DEFAULT_PROFILE: &str = "default";
const PROFILE_ENV: &str = "PHOTOSYNC_PROFILE";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

/// One server account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

const fn current_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    let dir = dirs::config_dir()
        .ok_or_else(|| CliError::Config("cannot locate the user config directory".to_string()))?;
    Ok(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Where a profile keeps its record database and keys.
pub fn default_data_dir(profile_name: &str) -> Result<PathBuf, CliError> {
    let dir = dirs::data_dir()
        .ok_or_else(|| CliError::Config("cannot locate the user data directory".to_string()))?;
    Ok(dir.join(APP_DIR_NAME).join(profile_name))
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    normalize_text_option(value.map(str::to_string))
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, CliError> {
        Self::load_from_path(&default_config_path()?)
    }

    /// A missing file is an empty config.
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(error) => {
                return Err(CliError::Config(format!(
                    "cannot read {}: {error}",
                    path.display()
                )))
            }
        };

        let config: Self = serde_json::from_str(&raw).map_err(|error| {
            CliError::Config(format!("cannot parse {}: {error}", path.display()))
        })?;
        Ok(config.normalized())
    }

    pub fn save(&self) -> Result<PathBuf, CliError> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&self.clone().normalized())?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// `explicit`, then `PHOTOSYNC_PROFILE`, then the active profile.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(std::env::var(PROFILE_ENV).ok().as_deref()))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalized(mut self) -> Self {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        self.profiles = self
            .profiles
            .into_iter()
            .map(|(name, profile)| (name, profile.normalized()))
            .collect();
        self
    }
}

impl CliProfile {
    fn normalized(self) -> Self {
        Self {
            server_url: normalize_text_option(self.server_url)
                .map(|url| url.trim_end_matches('/').to_string()),
            username: normalize_text_option(self.username),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_names_are_trimmed() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
        assert_eq!(normalize_profile_name(Some(" work ")), Some("work".to_string()));
    }

    #[test]
    fn saved_profiles_load_back_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" home ".to_string()),
            profiles: BTreeMap::new(),
        };
        *config.profile_mut_or_default("home") = CliProfile {
            server_url: Some(" https://photos.example.com/api/ ".to_string()),
            username: Some(" alice ".to_string()),
        };

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("home"));
        assert_eq!(
            loaded.profile("home"),
            Some(&CliProfile {
                server_url: Some("https://photos.example.com/api".to_string()),
                username: Some("alice".to_string()),
            })
        );
    }

    #[test]
    fn missing_file_is_an_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CliProfilesConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, CliProfilesConfig::default());
    }

    #[test]
    fn unparsable_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CliProfilesConfig::load_from_path(&path),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn explicit_profile_wins_over_active_profile() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(config.resolve_profile_name(Some("phone")), "phone");
        if std::env::var(PROFILE_ENV).is_err() {
            assert_eq!(config.resolve_profile_name(None), "work");
            assert_eq!(
                CliProfilesConfig::default().resolve_profile_name(None),
                DEFAULT_PROFILE
            );
        }
    }
}
