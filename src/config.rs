//! Configuration loader and validator for the news store mailer.
use crate::model::SenderIdentity;
use crate::renderer::{RendererOptions, DEFAULT_VARIANT};
use crate::sender;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub civicrm: Civicrm,
    #[serde(default)]
    pub mailer: Mailer,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    /// Holds the run ledger database unless `DATABASE_URL` is set.
    pub data_dir: String,
}

/// CiviCRM REST connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Civicrm {
    pub base_url: String,
    pub api_key: String,
    pub site_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Mailing defaults; CLI flags override these per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mailer {
    #[serde(default = "default_renderer")]
    pub renderer: String,
    #[serde(default)]
    pub renderer_options: RendererOptions,
    /// `"Name" <email>`; when unset the CRM's default sender is used.
    #[serde(default)]
    pub from: Option<String>,
}

impl Default for Mailer {
    fn default() -> Self {
        Self {
            renderer: default_renderer(),
            renderer_options: RendererOptions::new(),
            from: None,
        }
    }
}

impl Mailer {
    pub fn sender(&self) -> Option<SenderIdentity> {
        self.from.as_deref().and_then(sender::parse_from_label)
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_renderer() -> String {
    DEFAULT_VARIANT.to_string()
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Default ledger location inside `app.data_dir`.
    pub fn ledger_url(&self) -> String {
        format!(
            "sqlite://{}/mailer.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.civicrm.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("civicrm.base_url must be non-empty"));
    }
    if Url::parse(cfg.civicrm.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("civicrm.base_url must be an absolute URL"));
    }
    if cfg.civicrm.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("civicrm.api_key must be non-empty"));
    }
    if cfg.civicrm.site_key.trim().is_empty() {
        return Err(ConfigError::Invalid("civicrm.site_key must be non-empty"));
    }
    if cfg.civicrm.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("civicrm.timeout_seconds must be > 0"));
    }

    if cfg.mailer.renderer.trim().is_empty() {
        return Err(ConfigError::Invalid("mailer.renderer must be non-empty"));
    }
    if cfg.mailer.from.is_some() && cfg.mailer.sender().is_none() {
        return Err(ConfigError::Invalid(
            "mailer.from must have the form \"Name\" <email>",
        ));
    }

    Ok(())
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

civicrm:
  base_url: "https://crm.example.org/"
  api_key: "YOUR_CIVICRM_API_KEY"
  site_key: "YOUR_CIVICRM_SITE_KEY"
  timeout_seconds: 30

mailer:
  renderer: "baseline"
  renderer_options:
    link_text: "Read Full Story"
  # from: '"Newsroom" <news@example.org>'
"#
}
