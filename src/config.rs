use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::github::DEFAULT_BASE_URL;
use crate::render::HeaderStyle;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub github: GithubConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Local username to remote username.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GithubConfig {
    pub token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_closed_states")]
    pub closed_states: Vec<String>,
    #[serde(default = "default_profile_base_url")]
    pub profile_base_url: String,
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            closed_states: default_closed_states(),
            profile_base_url: default_profile_base_url(),
            source_label: default_source_label(),
        }
    }
}

impl ImportConfig {
    pub fn header_style(&self) -> HeaderStyle {
        HeaderStyle {
            profile_base_url: self.profile_base_url.clone(),
            source_label: self.source_label.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,
}

/// One `[projects."<key>"]` table as written on disk.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProjectEntry {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub milestones: BTreeMap<String, u64>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

/// Per-project run state: remote coordinates, the milestone and label
/// caches, and the user alias map. Owned by a single project run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectConfig {
    pub key: String,
    pub account: String,
    pub project: String,
    pub milestones: BTreeMap<String, u64>,
    pub labels: BTreeMap<String, String>,
    pub users: BTreeMap<String, String>,
}

/// Durable write-back of the reference caches.
pub trait ConfigStore {
    fn persist(&mut self, project: &ProjectConfig) -> Result<(), ConfigError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found at {path}. expected at $XDG_CONFIG_HOME/ticket-migrate/config.toml or ~/.config/ticket-migrate/config.toml")]
    MissingConfigFile { path: PathBuf },
    #[error("failed to resolve config path: HOME is not set and XDG_CONFIG_HOME is unset")]
    MissingHomeDirectory,
    #[error("failed to read config file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TOML config at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = read_raw(path)?;
    let cfg = toml::from_str::<AppConfig>(&raw).map_err(|source| ConfigError::ParseFailed {
        path: path.to_path_buf(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

fn read_raw(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::MissingConfigFile {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

pub fn resolve_config_path() -> Result<PathBuf, ConfigError> {
    let xdg_config_home = std::env::var_os("XDG_CONFIG_HOME");
    let home = std::env::var_os("HOME");
    resolve_config_path_from_env(xdg_config_home, home)
}

fn resolve_config_path_from_env(
    xdg_config_home: Option<OsString>,
    home: Option<OsString>,
) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = xdg_config_home.filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir).join("ticket-migrate").join("config.toml"));
    }

    let home = home
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingHomeDirectory)?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("ticket-migrate")
        .join("config.toml"))
}

impl AppConfig {
    /// Builds the run state for `key`. Per-project user aliases override the
    /// global ones.
    pub fn project_config(&self, key: &str) -> Option<ProjectConfig> {
        let entry = self.projects.get(key)?;
        let mut users = self.users.clone();
        users.extend(entry.users.clone());
        Some(ProjectConfig {
            key: key.to_string(),
            account: entry.account.trim().to_string(),
            project: entry.project.trim().to_string(),
            milestones: entry.milestones.clone(),
            labels: entry.labels.clone(),
            users,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.github.token.trim().is_empty() {
            return Err(ConfigError::Invalid("github.token must not be empty".into()));
        }
        if self.store.db_path.trim().is_empty() {
            return Err(ConfigError::Invalid("store.db_path must not be empty".into()));
        }
        if self.import.closed_states.is_empty() {
            return Err(ConfigError::Invalid(
                "import.closed_states must list at least one state".into(),
            ));
        }
        for name in self.projects.keys() {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "projects must not include empty project keys".into(),
                ));
            }
        }

        Ok(())
    }
}

impl ProjectConfig {
    /// Remote coordinates are required before anything can be imported.
    pub fn is_configured(&self) -> bool {
        !self.account.is_empty() && !self.project.is_empty()
    }
}

/// Writes cache tables back into the TOML file they were loaded from.
///
/// Every other setting keeps its value, but the file is re-rendered from
/// the parsed document: comments and formatting are not preserved.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for TomlConfigStore {
    fn persist(&mut self, project: &ProjectConfig) -> Result<(), ConfigError> {
        let raw = read_raw(&self.path)?;
        let mut doc: toml::Table = raw.parse().map_err(|source| ConfigError::ParseFailed {
            path: self.path.clone(),
            source,
        })?;

        let projects = child_table(&mut doc, "projects")?;
        let entry = child_table(projects, &project.key)?;

        let mut milestones = toml::Table::new();
        for (title, number) in &project.milestones {
            let number = i64::try_from(*number).map_err(|_| {
                ConfigError::Invalid(format!("milestone number {number} does not fit in TOML"))
            })?;
            milestones.insert(title.clone(), toml::Value::Integer(number));
        }
        let labels: toml::Table = project
            .labels
            .iter()
            .map(|(name, canonical)| (name.clone(), toml::Value::String(canonical.clone())))
            .collect();

        entry.insert("milestones".to_string(), toml::Value::Table(milestones));
        entry.insert("labels".to_string(), toml::Value::Table(labels));

        let rendered = toml::to_string(&doc)?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, rendered).map_err(|source| ConfigError::WriteFailed {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| ConfigError::WriteFailed {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(project = %project.key, path = %self.path.display(), "persisted reference caches");
        Ok(())
    }
}

fn child_table<'a>(table: &'a mut toml::Table, key: &str) -> Result<&'a mut toml::Table, ConfigError> {
    table
        .entry(key.to_string())
        .or_insert_with(|| toml::Value::Table(toml::Table::new()))
        .as_table_mut()
        .ok_or_else(|| ConfigError::Invalid(format!("{key} must be a table")))
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_closed_states() -> Vec<String> {
    vec!["closed".to_string()]
}

fn default_profile_base_url() -> String {
    "https://github.com".to_string()
}

fn default_source_label() -> String {
    "Lighthouse ticket".to_string()
}
