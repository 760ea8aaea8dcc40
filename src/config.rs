//! Settings file for the `stixgraph` binary.
//!
//! ```toml
//! [mapping]
//! dir = "/etc/stixgraph/mapping"
//!
//! [transform]
//! strict = false
//!
//! [load]
//! batch_size = 200
//!
//! [log]
//! filter = "stixgraph=debug"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MappingError;
use crate::load::LoaderOptions;
use crate::mapping::Mapping;
use crate::transform::TransformOptions;

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "STIXGRAPH_CONFIG";

/// All settings; every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where the mapping documents come from.
    pub mapping: MappingSection,
    /// Transform switches.
    pub transform: TransformOptions,
    /// Loader tuning.
    pub load: LoaderOptions,
    /// Log filter.
    pub log: LogSection,
}

/// `[mapping]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingSection {
    /// Directory holding the mapping documents; the built-in mapping is used
    /// when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// `[log]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// `tracing` filter directive, e.g. `stixgraph=debug`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Settings {
    /// Reads settings from `path`; a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) if path.exists() => read_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Writes the settings to `path`, creating parent directories.
    pub fn persist(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SettingsError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized =
            toml::to_string_pretty(self).map_err(|source| SettingsError::Serialize { source })?;
        fs::write(path, serialized).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the configured mapping, or the built-in one.
    pub fn load_mapping(&self) -> Result<Mapping, MappingError> {
        match &self.mapping.dir {
            Some(dir) => Mapping::from_dir(dir),
            None => Mapping::builtin(),
        }
    }
}

/// Settings file location: `explicit`, then `STIXGRAPH_CONFIG`, then the
/// per-user default.
pub fn resolve_settings_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| env::var_os(SETTINGS_ENV).map(PathBuf::from))
        .or_else(default_settings_path)
}

/// `<config dir>/stixgraph/config.toml`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("stixgraph").join("config.toml"))
}

fn read_file(path: &Path) -> Result<Settings, SettingsError> {
    let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Settings file failures.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("failed to read settings {path}: {source}")]
    Read {
        /// Settings path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML or has unknown keys.
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        /// Settings path.
        path: PathBuf,
        /// Decoder error.
        source: toml::de::Error,
    },
    /// Settings could not be encoded.
    #[error("failed to serialize settings: {source}")]
    Serialize {
        /// Encoder error.
        source: toml::ser::Error,
    },
    /// The file could not be written.
    #[error("failed to write settings {path}: {source}")]
    Write {
        /// Settings path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The parent directory could not be created.
    #[error("failed to create settings directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// No settings path could be determined.
    #[error("no config directory found; pass --config or set STIXGRAPH_CONFIG")]
    NoSettingsPath,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let settings = Settings::load(Some(dir.path().join("absent.toml").as_path())).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.load.batch_size, 200);
        assert!(!settings.transform.strict);
    }

    #[test]
    fn reads_sections() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[transform]\nstrict = true\n\n[load]\nbatch_size = 25\n\n[log]\nfilter = \"debug\"\n",
        )
        .expect("write");
        let settings = Settings::load(Some(path.as_path())).expect("load");
        assert!(settings.transform.strict);
        assert_eq!(settings.load.batch_size, 25);
        assert_eq!(settings.log.filter.as_deref(), Some("debug"));
        assert_eq!(settings.mapping.dir, None);
    }

    #[test]
    fn rejects_unknown_keys() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[load]\nbatch = 3\n").expect("write");
        assert!(matches!(
            Settings::load(Some(path.as_path())),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn persist_round_trips() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let mut settings = Settings::default();
        settings.load.batch_size = 10;
        settings.mapping.dir = Some(PathBuf::from("/tmp/mapping"));
        settings.persist(&path).expect("persist");
        assert_eq!(Settings::load(Some(path.as_path())).expect("load"), settings);
    }

    #[test]
    fn explicit_path_wins() {
        let explicit = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(
            resolve_settings_path(Some(explicit.clone())),
            Some(explicit)
        );
    }
}
