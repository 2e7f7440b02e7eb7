use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::home_dir::resolve_home_dir;

/// Main application configuration: strongly-typed runtime sections plus the
/// free-form per-environment bags consumed by the package runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Host process settings.
    pub server: ServerConfig,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Configuration environments and provider overrides.
    #[serde(default)]
    pub package: PackageSection,
    /// Theme catalog and switch timings.
    #[serde(default)]
    pub themes: ThemesSection,
    /// Raw i18n options; fields override the runtime defaults one by one.
    #[serde(default)]
    pub i18n: Option<serde_json::Value>,
    /// Server-context fetch settings.
    #[serde(default)]
    pub context: ContextSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub home_dir: String, // will be normalized to absolute path
    /// "browser" or "server".
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "browser".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    /// Active configuration environment; overlays `environments.default`.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// environment name → JSON object. Provider configs are keyed by provider name.
    #[serde(default)]
    pub environments: HashMap<String, serde_json::Value>,
    /// module id → (provider name → runtime provider name).
    #[serde(default)]
    pub provider_overrides: HashMap<String, HashMap<String, String>>,
    /// Log every dispatched action at debug level.
    #[serde(default)]
    pub dev_tools: bool,
}

fn default_environment() -> String {
    "default".to_string()
}

impl Default for PackageSection {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            environments: HashMap::new(),
            provider_overrides: HashMap::new(),
            dev_tools: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ThemeEntry {
    pub id: String,
    pub url: String,
    /// "light" or "dark".
    #[serde(rename = "type", default = "default_theme_type")]
    pub kind: String,
}

fn default_theme_type() -> String {
    "light".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ThemesSection {
    #[serde(default)]
    pub catalog: Vec<ThemeEntry>,
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_load_timeout")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_settle_delay")]
    pub settle_delay: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_load_timeout() -> Duration {
    Duration::from_millis(7000)
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(1000)
}

impl Default for ThemesSection {
    fn default() -> Self {
        Self {
            catalog: Vec::new(),
            poll_interval: default_poll_interval(),
            timeout: default_load_timeout(),
            settle_delay: default_settle_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextSection {
    #[serde(default = "default_context_path")]
    pub path: String,
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub retry_delay: Duration,
}

fn default_context_path() -> String {
    "/__context".to_string()
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(100)
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            path: default_context_path(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// Logging configuration - maps target names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit targets.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/ark.log"; only honoured on the "default" section
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_backups: Option<usize>, // How many files to keep
    #[serde(default)]
    pub max_size_mb: Option<u64>, // Max size of the file in MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // Empty => $HOME/.ark
            home_dir: String::new(),
            mode: default_mode(),
        }
    }
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/ark.log".to_string(),
            file_level: "debug".to_string(),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: Some(default_logging_config()),
            package: PackageSection::default(),
            themes: ThemesSection::default(),
            i18n: None,
            context: ContextSection::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    /// Also normalizes `server.home_dir` into an absolute path and creates the directory.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Logging stays None unless the file or env provides it.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // Example: ARK__SERVER__MODE=server maps to server.mode
            .merge(Env::prefixed("ARK__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| "Failed to extract config from figment".to_string())?;

        normalize_home_dir_inplace(&mut config.server)
            .context("Failed to resolve server.home_dir")?;

        Ok(config)
    }

    /// Load configuration from file or create with default values.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                normalize_home_dir_inplace(&mut c.server)
                    .context("Failed to resolve server.home_dir (defaults)")?;
                Ok(c)
            }
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(mode) = &args.mode {
            self.server.mode = mode.clone();
        }

        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from(&self.server.home_dir)
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub mode: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

const fn default_subdir() -> &'static str {
    ".ark"
}

/// Normalize `server.home_dir` and store the absolute path back.
fn normalize_home_dir_inplace(server: &mut ServerConfig) -> Result<()> {
    let opt = if server.home_dir.trim().is_empty() {
        None
    } else {
        Some(server.home_dir.clone())
    };

    let resolved: PathBuf = resolve_home_dir(opt, default_subdir(), /*create*/ true)
        .context("home_dir normalization failed")?;

    server.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_structure() {
        let config = AppConfig::default();

        assert_eq!(config.server.home_dir, "");
        assert_eq!(config.server.mode, "browser");
        assert_eq!(config.package.environment, "default");
        assert!(config.package.environments.is_empty());

        assert!(config.themes.catalog.is_empty());
        assert_eq!(config.themes.poll_interval, Duration::from_millis(10));
        assert_eq!(config.themes.timeout, Duration::from_secs(7));
        assert_eq!(config.themes.settle_delay, Duration::from_secs(1));

        assert_eq!(config.context.path, "/__context");
        assert_eq!(config.context.retry_delay, Duration::from_millis(100));

        let logging = config.logging.as_ref().unwrap();
        assert_eq!(logging["default"].console_level, "info");
        assert_eq!(logging["default"].file, "logs/ark.log");
    }

    #[test]
    fn test_load_layered_reads_all_sections() {
        let tmp = tempdir().unwrap();
        let home = tmp.path().join("home");
        let cfg_path = tmp.path().join("ark.yaml");

        let yaml = format!(
            r#"
server:
  home_dir: "{}"
  mode: server

package:
  environment: development
  environments:
    default:
      Main:
        base_url: "http://localhost:8080"
    development:
      Main:
        base_url: "http://dev.local"
  provider_overrides:
    notes:
      Main: Notes

themes:
  catalog:
    - id: dark1
      url: "/themes/dark1.css"
      type: dark
    - id: paper
      url: "/themes/paper.css"
  timeout: 2s
  settle_delay: 250ms

context:
  retry_delay: 50ms

logging:
  default:
    console_level: debug
"#,
            home.to_string_lossy()
        );
        fs::write(&cfg_path, yaml).unwrap();

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert_eq!(config.home_dir(), home);
        assert!(home.is_dir());
        assert_eq!(config.server.mode, "server");

        assert_eq!(config.package.environment, "development");
        assert_eq!(
            config.package.environments["development"]["Main"]["base_url"],
            "http://dev.local"
        );
        assert_eq!(config.package.provider_overrides["notes"]["Main"], "Notes");

        assert_eq!(config.themes.catalog.len(), 2);
        assert_eq!(config.themes.catalog[0].kind, "dark");
        assert_eq!(config.themes.catalog[1].kind, "light");
        assert_eq!(config.themes.timeout, Duration::from_secs(2));
        assert_eq!(config.themes.settle_delay, Duration::from_millis(250));
        assert_eq!(config.themes.poll_interval, Duration::from_millis(10));

        assert_eq!(config.context.retry_delay, Duration::from_millis(50));
        assert_eq!(config.context.path, "/__context");

        let logging = config.logging.as_ref().unwrap();
        assert_eq!(logging["default"].console_level, "debug");
        assert_eq!(logging["default"].file, "");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("ark.yaml");
        let yaml = format!(
            "server:\n  home_dir: \"{}\"\n  port: 8080\n",
            tmp.path().to_string_lossy()
        );
        fs::write(&cfg_path, yaml).unwrap();

        assert!(AppConfig::load_layered(&cfg_path).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            mode: Some("server".into()),
            verbose: 2,
            ..CliArgs::default()
        };

        config.apply_cli_overrides(&args);

        assert_eq!(config.server.mode, "server");
        assert_eq!(
            config.logging.as_ref().unwrap()["default"].console_level,
            "trace"
        );
    }

    #[test]
    fn test_yaml_roundtrip_keeps_durations_readable() {
        let yaml = AppConfig::default().to_yaml().unwrap();
        assert!(yaml.contains("timeout: 7s"));
        assert!(yaml.contains("retry_delay: 100ms"));
    }
}
