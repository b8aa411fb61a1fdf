// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Where the manager keeps its journal and downloads.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_DIR: &str = "podcatcher";
const CONFIG_FILENAME: &str = "config.toml";
const JOURNAL_FILENAME: &str = "episodes.xml";

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Directory holding the metadata journal
    pub data_dir: PathBuf,

    /// Root of all episode downloads (`<podcast>/<episode>.<ext>` below it)
    pub download_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    download_dir: Option<PathBuf>,
}

impl Config {
    /// Configuration rooted at explicit directories
    pub fn new(data_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            download_dir: download_dir.into(),
        }
    }

    /// Platform default locations
    ///
    /// Journal under the local data directory, downloads in a `Podcasts`
    /// folder below the user's audio directory (or the data directory if the
    /// platform has none).
    pub fn platform_default() -> Result<Self, ConfigError> {
        let data_dir = dirs::data_local_dir()
            .ok_or(ConfigError::NoPlatformDirectory("data"))?
            .join(APP_DIR);
        let download_dir = dirs::audio_dir()
            .map(|dir| dir.join("Podcasts"))
            .unwrap_or_else(|| data_dir.join("downloads"));

        Ok(Self::new(data_dir, download_dir))
    }

    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(dirs::config_dir()
            .ok_or(ConfigError::NoPlatformDirectory("config"))?
            .join(APP_DIR)
            .join(CONFIG_FILENAME))
    }

    /// Load configuration
    ///
    /// Reads the given file, or the default config file if none is given and
    /// it exists. Values missing from the file fall back to the platform
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::platform_default()?;

        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::default_path()?;
                if !path.exists() {
                    return Ok(defaults);
                }
                path
            }
        };

        Self::read_file(&path, defaults)
    }

    fn read_file(path: &Path, defaults: Self) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml(&content, defaults).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn from_toml(content: &str, defaults: Self) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;

        Ok(Self {
            data_dir: file.data_dir.unwrap_or(defaults.data_dir),
            download_dir: file.download_dir.unwrap_or(defaults.download_dir),
        })
    }

    /// Location of the metadata journal
    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join(JOURNAL_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn defaults() -> Config {
        Config::new("/default/data", "/default/downloads")
    }

    #[test]
    fn journal_lives_in_data_dir() {
        let config = Config::new("/data", "/downloads");
        assert_eq!(config.journal_path(), PathBuf::from("/data/episodes.xml"));
    }

    #[test]
    fn from_toml_overrides_given_values() {
        let config = Config::from_toml("download_dir = \"/music/pods\"\n", defaults()).unwrap();

        assert_eq!(config.download_dir, PathBuf::from("/music/pods"));
        assert_eq!(config.data_dir, PathBuf::from("/default/data"));
    }

    #[test]
    fn from_toml_empty_file_keeps_defaults() {
        assert_eq!(Config::from_toml("", defaults()).unwrap(), defaults());
    }

    #[test]
    fn from_toml_rejects_wrong_types() {
        assert!(Config::from_toml("data_dir = 3\n", defaults()).is_err());
    }

    #[test]
    fn read_file_reports_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::read_file(&dir.path().join("missing.toml"), defaults());
        assert!(matches!(result, Err(ConfigError::ReadFailed { .. })));
    }

    #[test]
    fn read_file_reports_parse_errors_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "download_dir = [").unwrap();

        match Config::read_file(&path, defaults()) {
            Err(ConfigError::ParseFailed { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("Expected ParseFailed, got {other:?}"),
        }
    }

    #[test]
    fn read_file_applies_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "data_dir = \"/srv/pods\"\ndownload_dir = \"/srv/media\"\n").unwrap();

        let config = Config::read_file(&path, defaults()).unwrap();
        assert_eq!(config, Config::new("/srv/pods", "/srv/media"));
    }
}
