use crate::domain::error::TmError;
use crate::infrastructure::corpus::MatcherOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub display: Display,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    #[serde(default = "default_enable")]
    pub enable: bool,
    pub path: Option<String>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Display {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_enable")]
    pub enable_emoji: bool,
}

// 当前文件翻译记忆
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LocalConfig {
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: u8,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

// 远程 tmserver
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            enable: true,
            path: None,
            level: default_log_level(),
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            enable_emoji: true,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enable: true,
            max_candidates: default_max_candidates(),
            min_similarity: default_min_similarity(),
            max_length: default_max_length(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enable: false,
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Logging {
    /// `tracing` filter directive for the configured level, WARN when unknown.
    pub fn filter_directive(&self) -> &'static str {
        match self.level.to_uppercase().as_str() {
            "DEBUG" => "debug",
            "INFO" => "info",
            "WARN" => "warn",
            "ERROR" => "error",
            _ => "warn",
        }
    }
}

impl LocalConfig {
    pub fn matcher_options(&self) -> MatcherOptions {
        MatcherOptions {
            max_candidates: self.max_candidates,
            min_similarity: self.min_similarity.min(100),
            max_length: self.max_length,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, TmError> {
        Ok(toml::from_str::<Config>(content)?)
    }
}

// Defaults
fn default_enable() -> bool {
    true
}
fn default_log_level() -> String {
    "WARN".to_string()
}
fn default_theme() -> String {
    "temp".to_string()
}
fn default_max_candidates() -> usize {
    10
}
fn default_min_similarity() -> u8 {
    75
}
fn default_max_length() -> usize {
    70
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout_secs() -> u64 {
    5
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tmq").join("config.toml"))
}

pub fn load_config() -> Result<Config, TmError> {
    let config_path = get_config_path();

    if let Some(path) = config_path {
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            match Config::from_toml_str(&content) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to parse config file: {}. Using defaults.",
                        e
                    );
                }
            }
        }
    }

    Ok(Config::default())
}

pub fn generate_config_sample() -> Result<(), TmError> {
    let config_path = get_config_path();

    if let Some(path) = config_path {
        if path.exists() {
            eprintln!("Config file already exists at: {}", path.display());
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let sample = Config::default();
        let toml_content = toml::to_string_pretty(&sample)
            .map_err(|e| TmError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(&path, toml_content)
            .map_err(|e| TmError::Config(format!("Failed to write config file: {}", e)))?;
        println!("Generated config file at: {}", path.display());
    } else {
        return Err(TmError::Config(
            "Cannot determine config directory".to_string(),
        ));
    }

    Ok(())
}
