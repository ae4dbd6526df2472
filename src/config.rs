use crate::ai_sql::cache::DEFAULT_MAX_AGE_HOURS;
use crate::ai_sql::prompt::GenerationMode;
use crate::database::DatabaseDescriptor;
use crate::llm::config::{DEFAULT_TIMEOUT_SECONDS, ProviderDescriptor};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "daibai.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine the home directory")]
    NoHomeDirectory,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    #[serde(rename = "trace")]
    Trace,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Warn
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default = "default_console_output")]
    pub console_output: bool,
    #[serde(default = "default_file_output")]
    pub file_output: bool,
    #[serde(default = "default_log_file_path")]
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::default(),
            console_output: default_console_output(),
            file_output: default_file_output(),
            file_path: default_log_file_path(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchemaCacheConfig {
    /// Records older than this are refetched (default: 24)
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Train the startup database when the agent opens (default: true)
    #[serde(default = "default_auto_train")]
    pub auto_train: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            auto_train: default_auto_train(),
        }
    }
}

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub databases: BTreeMap<String, DatabaseDescriptor>,
    pub default_database: Option<String>,
    pub llm_providers: BTreeMap<String, ProviderDescriptor>,
    pub default_llm: Option<String>,
    pub memory_dir: PathBuf,
    /// Where CSV exports of query results are written
    pub exports_dir: PathBuf,
    pub clipboard: bool,
    pub schema_cache: SchemaCacheConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
    /// File this configuration was read from
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            databases: BTreeMap::new(),
            default_database: None,
            llm_providers: BTreeMap::new(),
            default_llm: None,
            memory_dir: default_memory_dir(),
            exports_dir: default_exports_dir(),
            clipboard: default_clipboard(),
            schema_cache: SchemaCacheConfig::default(),
            agent: AgentConfig::default(),
            logging: LoggingConfig::default(),
            source: None,
        }
    }
}

fn default_console_output() -> bool {
    true
}

fn default_file_output() -> bool {
    false
}

fn default_log_file_path() -> String {
    match Config::get_config_directory() {
        Ok(dir) => dir.join("logs").join("daibai.log").to_string_lossy().to_string(),
        Err(_) => "daibai.log".to_string(),
    }
}

fn default_max_age_hours() -> u64 {
    DEFAULT_MAX_AGE_HOURS
}

fn default_auto_train() -> bool {
    true
}

fn default_clipboard() -> bool {
    true
}

fn default_memory_dir() -> PathBuf {
    match Config::get_config_directory() {
        Ok(dir) => dir.join("memory"),
        Err(_) => PathBuf::from(".daibai").join("memory"),
    }
}

pub fn default_exports_dir() -> PathBuf {
    match Config::get_config_directory() {
        Ok(dir) => dir.join("exports"),
        Err(_) => PathBuf::from(".daibai").join("exports"),
    }
}

/// `port` may arrive as a string once `${VAR}` placeholders are substituted
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

#[derive(Deserialize, Debug, Default)]
struct DatabaseEntry {
    host: Option<String>,
    port: Option<PortValue>,
    name: Option<String>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    ssl: Option<bool>,
}

impl DatabaseEntry {
    fn into_descriptor(self, key: &str) -> Result<DatabaseDescriptor, ConfigError> {
        let defaults = DatabaseDescriptor::new(key);
        let port = match self.port {
            None => defaults.port,
            Some(PortValue::Number(port)) => port,
            Some(PortValue::Text(text)) => text.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("databases.{key}.port: '{text}' is not a port number"))
            })?,
        };
        Ok(DatabaseDescriptor {
            name: key.to_string(),
            host: self.host.unwrap_or(defaults.host),
            port,
            database: self.name.or(self.database).unwrap_or(defaults.database),
            user: self.user.unwrap_or(defaults.user),
            password: self.password.unwrap_or_default(),
            ssl: self.ssl.unwrap_or(false),
        })
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct LlmSection {
    default: Option<String>,
    timeout_seconds: Option<u64>,
    providers: BTreeMap<String, ProviderDescriptor>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct ConfigFile {
    databases: toml::Table,
    llm: LlmSection,
    memory_dir: Option<String>,
    exports_dir: Option<String>,
    clipboard: Option<bool>,
    schema_cache: SchemaCacheConfig,
    agent: AgentConfig,
    logging: LoggingConfig,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"))
}

/// Replace `${VAR}` in every string of `value`; unknown variables stay as written
pub fn substitute_placeholders(value: &mut toml::Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        toml::Value::String(text) => {
            if text.contains("${") {
                *text = placeholder_regex()
                    .replace_all(text, |caps: &regex::Captures| {
                        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
                    })
                    .into_owned();
            }
        }
        toml::Value::Array(items) => {
            for item in items {
                substitute_placeholders(item, lookup);
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                substitute_placeholders(item, lookup);
            }
        }
        _ => {}
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// `~/.daibai`, the home of the cache, history, preferences and logs
    pub fn get_config_directory() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".daibai"))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    /// Places searched for a config file, in order
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join(CONFIG_FILE_NAME));
            paths.push(cwd.join(format!(".{CONFIG_FILE_NAME}")));
        }
        if let Ok(dir) = Self::get_config_directory() {
            paths.push(dir.join(CONFIG_FILE_NAME));
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("daibai").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Load `.env` files, then the explicit or discovered config file.
    /// No file at all yields an empty configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::candidate_paths().into_iter().find(|p| p.is_file()),
        };
        load_env_files(path.as_deref());

        let Some(path) = path else {
            debug!("[Config::load] No config file found, using defaults");
            return Ok(Self::default());
        };

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        debug!(
            "[Config::load] Loaded {} databases and {} providers from {}",
            config.databases.len(),
            config.llm_providers.len(),
            path.display()
        );
        config.source = Some(path);
        Ok(config)
    }

    /// Parse with `${VAR}` resolved from the process environment
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_toml_str_with(text, &|name| env::var(name).ok())
    }

    pub fn from_toml_str_with(
        text: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut value = toml::Value::Table(toml::from_str::<toml::Table>(text)?);
        substitute_placeholders(&mut value, lookup);
        let file: ConfigFile = value.try_into()?;

        let mut databases = BTreeMap::new();
        let mut default_database = None;
        for (key, entry) in file.databases {
            match entry {
                toml::Value::String(name) if key == "default" => default_database = Some(name),
                toml::Value::Table(table) => {
                    let entry: DatabaseEntry = toml::Value::Table(table).try_into()?;
                    databases.insert(key.clone(), entry.into_descriptor(&key)?);
                }
                other => {
                    warn!("Ignoring databases.{} ({})", key, other.type_str());
                }
            }
        }
        let default_database = default_database.or_else(|| databases.keys().next().cloned());

        let timeout_seconds = file.llm.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let llm_providers: BTreeMap<String, ProviderDescriptor> = file
            .llm
            .providers
            .into_iter()
            .map(|(name, mut descriptor)| {
                descriptor.name = name.clone();
                descriptor.timeout_seconds = timeout_seconds;
                (name, descriptor)
            })
            .collect();
        let default_llm = file
            .llm
            .default
            .or_else(|| llm_providers.keys().next().cloned());

        Ok(Self {
            databases,
            default_database,
            llm_providers,
            default_llm,
            memory_dir: file
                .memory_dir
                .as_deref()
                .map(expand_home)
                .unwrap_or_else(default_memory_dir),
            exports_dir: file
                .exports_dir
                .as_deref()
                .map(expand_home)
                .unwrap_or_else(default_exports_dir),
            clipboard: file.clipboard.unwrap_or_else(default_clipboard),
            schema_cache: file.schema_cache,
            agent: file.agent,
            logging: file.logging,
            source: None,
        })
    }

    pub fn list_databases(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    pub fn list_llm_providers(&self) -> Vec<String> {
        self.llm_providers.keys().cloned().collect()
    }
}

/// First existing `.env` next to the config file, in the working directory,
/// or in `~/.daibai`. Variables already set in the process win.
pub fn load_env_files(config_path: Option<&Path>) {
    let mut candidates = Vec::new();
    if let Some(dir) = config_path.and_then(Path::parent) {
        candidates.push(dir.join(".env"));
    }
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join(".env"));
    }
    if let Ok(dir) = Config::get_config_directory() {
        candidates.push(dir.join(".env"));
    }

    if let Some(path) = candidates.into_iter().find(|p| p.is_file()) {
        match dotenvy::from_path(&path) {
            Ok(()) => debug!("[config::load_env_files] Loaded {}", path.display()),
            Err(e) => warn!("Could not load {}: {}", path.display(), e),
        }
    }
}

/// Session choices remembered between runs
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Preferences {
    pub database: Option<String>,
    pub llm: Option<String>,
    pub mode: GenerationMode,
    pub auto_execute: bool,
    pub clipboard: Option<bool>,
}

impl Preferences {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Config::get_config_directory()?.join("preferences.toml"))
    }

    /// Missing or unreadable files yield defaults
    pub fn load_from(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::default();
        };
        toml::from_str(&text).unwrap_or_else(|e| {
            warn!("Ignoring unreadable preferences {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = toml::to_string(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
