//! Core configuration object.
//!
//! # Responsibility
//! - Describe where metadata is stored and where repositories are hosted.
//! - Load that description from TOML and validate it before wiring.
//!
//! # Invariants
//! - A validated config has non-empty `storage_location` and
//!   `hosting_root_path`.
//! - Paths loaded from a file are resolved against the file's directory.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage location selecting a transient in-memory database.
pub const IN_MEMORY_STORAGE: &str = ":memory:";

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config syntax: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Startup configuration for the repository manager.
///
/// Keys are snake_case; the camelCase spellings `storageLocation`,
/// `hostingRootPath`, `hostingTimeoutMs`, `logLevel` and `logDir` are
/// accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// SQLite database file, or `:memory:`.
    #[serde(alias = "storageLocation")]
    pub storage_location: PathBuf,
    /// Directory holding one bare repository per identifier.
    #[serde(alias = "hostingRootPath")]
    pub hosting_root_path: PathBuf,
    /// Upper bound for each hosting call. `0` or absent means unbounded.
    #[serde(default, alias = "hostingTimeoutMs")]
    pub hosting_timeout_ms: Option<u64>,
    #[serde(default, alias = "logLevel")]
    pub log_level: Option<String>,
    #[serde(default, alias = "logDir")]
    pub log_dir: Option<PathBuf>,
}

impl CoreConfig {
    pub fn new(storage_location: impl Into<PathBuf>, hosting_root_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_location: storage_location.into(),
            hosting_root_path: hosting_root_path.into(),
            hosting_timeout_ms: None,
            log_level: None,
            log_dir: None,
        }
    }

    /// Parses and validates a TOML document. Relative paths are kept as-is.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file and resolves relative paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Self = toml::from_str(&source)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if !config.is_in_memory() {
            config.storage_location = resolve(base, &config.storage_location);
        }
        config.hosting_root_path = resolve(base, &config.hosting_root_path);
        config.log_dir = config.log_dir.as_deref().map(|dir| resolve(base, dir));

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_location.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "storage_location cannot be empty".to_string(),
            ));
        }
        if self.hosting_root_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "hosting_root_path cannot be empty".to_string(),
            ));
        }
        if !self.is_in_memory() && self.storage_location.starts_with(&self.hosting_root_path) {
            return Err(ConfigError::Invalid(format!(
                "storage_location `{}` must not live inside hosting_root_path `{}`",
                self.storage_location.display(),
                self.hosting_root_path.display()
            )));
        }
        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.storage_location.as_os_str() == IN_MEMORY_STORAGE
    }

    pub fn hosting_timeout(&self) -> Option<Duration> {
        self.hosting_timeout_ms
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }

    /// Configured log level, or the build-mode default.
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or_else(|| default_log_level())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn parses_snake_case_keys() {
        let config = CoreConfig::from_toml_str(
            r#"
            storage_location = "/var/lib/gitory/gitory.db"
            hosting_root_path = "/srv/git"
            hosting_timeout_ms = 1500
            "#,
        )
        .expect("config should parse");

        assert_eq!(
            config.storage_location,
            PathBuf::from("/var/lib/gitory/gitory.db")
        );
        assert_eq!(config.hosting_root_path, PathBuf::from("/srv/git"));
        assert_eq!(config.hosting_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn accepts_camel_case_aliases() {
        let config = CoreConfig::from_toml_str(
            r#"
            storageLocation = ":memory:"
            hostingRootPath = "/srv/git"
            "#,
        )
        .expect("aliases should parse");

        assert!(config.is_in_memory());
        assert_eq!(config.hosting_timeout(), None);
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let mut config = CoreConfig::new(":memory:", "/srv/git");
        config.hosting_timeout_ms = Some(0);
        assert_eq!(config.hosting_timeout(), None);
    }

    #[test]
    fn log_level_falls_back_to_build_default() {
        let mut config = CoreConfig::new(":memory:", "/srv/git");
        assert_eq!(config.log_level(), crate::logging::default_log_level());

        config.log_level = Some("debug".to_string());
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn rejects_unknown_and_missing_keys() {
        let unknown = CoreConfig::from_toml_str(
            r#"
            storage_location = ":memory:"
            hosting_root_path = "/srv/git"
            debug = true
            "#,
        );
        assert!(matches!(unknown, Err(ConfigError::Parse(_))));

        let missing = CoreConfig::from_toml_str(r#"storage_location = ":memory:""#);
        assert!(matches!(missing, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_empty_paths_and_nested_storage() {
        let empty = CoreConfig::new("", "/srv/git").validate();
        assert!(matches!(empty, Err(ConfigError::Invalid(_))));

        let nested = CoreConfig::new("/srv/git/gitory.db", "/srv/git").validate();
        assert!(matches!(nested, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_resolves_relative_paths_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("gitory.toml");
        std::fs::write(
            &config_path,
            "storage_location = \"data/gitory.db\"\nhosting_root_path = \"repos\"\nlog_dir = \"logs\"\n",
        )
        .unwrap();

        let config = CoreConfig::load(&config_path).expect("config should load");
        assert_eq!(config.storage_location, dir.path().join("data/gitory.db"));
        assert_eq!(config.hosting_root_path, dir.path().join("repos"));
        assert_eq!(config.log_dir, Some(dir.path().join("logs")));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CoreConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
