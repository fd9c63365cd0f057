//! Configuration loading and data folder resolution
//!
//! Each setting is resolved in priority order:
//! 1. Command-line flag (or its environment variable, via clap)
//! 2. TOML config file
//! 3. OS-dependent default under the local data directory

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "household-registry";
pub const CONFIG_ENV: &str = "HOUSEHOLD_CONFIG";

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub database: Option<PathBuf>,
    pub uploads_dir: Option<PathBuf>,
    pub exports_dir: Option<PathBuf>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

/// Values given on the command line (already merged with env by clap)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub uploads_dir: Option<PathBuf>,
    pub exports_dir: Option<PathBuf>,
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub uploads_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub admin_username: String,
    pub admin_password: String,
}

impl AppConfig {
    /// Defaults rooted at `data_dir`
    pub fn rooted_at(data_dir: &Path) -> Self {
        AppConfig {
            data_dir: data_dir.to_path_buf(),
            database: data_dir.join("households.db"),
            uploads_dir: data_dir.join("uploads"),
            exports_dir: data_dir.join("exports"),
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join(format!("{}.log", APP_DIR))
    }

    /// Layer the file and the command line over the defaults
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let file = match locate_config_file(overrides.config.as_deref())? {
            Some(path) => load_file(&path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(default_data_dir(), file, overrides))
    }

    pub fn merge(data_dir: PathBuf, file: FileConfig, overrides: &Overrides) -> Self {
        let defaults = Self::rooted_at(&data_dir);

        AppConfig {
            database: overrides
                .database
                .clone()
                .or(file.database)
                .unwrap_or(defaults.database),
            uploads_dir: overrides
                .uploads_dir
                .clone()
                .or(file.uploads_dir)
                .unwrap_or(defaults.uploads_dir),
            exports_dir: overrides
                .exports_dir
                .clone()
                .or(file.exports_dir)
                .unwrap_or(defaults.exports_dir),
            admin_username: file.admin_username.unwrap_or(defaults.admin_username),
            admin_password: file.admin_password.unwrap_or(defaults.admin_password),
            data_dir,
        }
    }
}

pub fn load_file(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Explicit path (must exist), then `$HOUSEHOLD_CONFIG`, then the per-user
/// config directory if a file is there
fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(Some(PathBuf::from(path)));
    }

    Ok(dirs::config_dir()
        .map(|d| d.join(APP_DIR).join("config.toml"))
        .filter(|p| p.exists()))
}

/// `~/.local/share/household-registry` on Linux, platform equivalents elsewhere
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!("./{}_data", APP_DIR.replace('-', "_"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_rooted_in_data_dir() {
        let config = AppConfig::merge(PathBuf::from("/data"), FileConfig::default(), &Overrides::default());

        assert_eq!(config.database, PathBuf::from("/data/households.db"));
        assert_eq!(config.uploads_dir, PathBuf::from("/data/uploads"));
        assert_eq!(config.exports_dir, PathBuf::from("/data/exports"));
        assert_eq!(config.admin_username, "admin");
        assert_eq!(config.log_file(), PathBuf::from("/data/household-registry.log"));
    }

    #[test]
    fn test_command_line_beats_file_beats_default() {
        let file = FileConfig {
            database: Some(PathBuf::from("/file/db.sqlite")),
            uploads_dir: Some(PathBuf::from("/file/uploads")),
            admin_password: Some("rahasia".to_string()),
            ..FileConfig::default()
        };
        let overrides = Overrides {
            database: Some(PathBuf::from("/cli/db.sqlite")),
            ..Overrides::default()
        };

        let config = AppConfig::merge(PathBuf::from("/data"), file, &overrides);
        assert_eq!(config.database, PathBuf::from("/cli/db.sqlite"));
        assert_eq!(config.uploads_dir, PathBuf::from("/file/uploads"));
        assert_eq!(config.exports_dir, PathBuf::from("/data/exports"));
        assert_eq!(config.admin_password, "rahasia");
    }

    #[test]
    fn test_load_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "database = \"/srv/households.db\"\nadmin_username = \"kepala_desa\"\n",
        )
        .unwrap();

        let file = load_file(&path).unwrap();
        assert_eq!(file.database, Some(PathBuf::from("/srv/households.db")));
        assert_eq!(file.admin_username.as_deref(), Some("kepala_desa"));
        assert_eq!(file.exports_dir, None);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "databse = \"typo.db\"\n").unwrap();

        assert!(matches!(load_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let overrides = Overrides {
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            ..Overrides::default()
        };
        assert!(matches!(AppConfig::resolve(&overrides), Err(Error::Config(_))));
    }
}
