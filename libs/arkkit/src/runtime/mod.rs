mod lifecycle;
mod package;


pub use package::{Package, PackageBuilder};

use arkkit_bootstrap::AppConfig;
use std::time::Duration;

use crate::client_hub::MAIN_PROVIDER;
use crate::error::{ArkError, ArkResult};
use crate::theme::ThemeTimings;

/// Where the runtime runs. Server mode has no persisted client-side theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Browser,
    Server,
}

impl RuntimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeMode::Browser => "browser",
            RuntimeMode::Server => "server",
        }
    }
}

impl std::fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = ArkError;

    fn from_str(s: &str) -> ArkResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "browser" => Ok(RuntimeMode::Browser),
            "server" => Ok(RuntimeMode::Server),
            _ => Err(ArkError::InvalidMode {
                value: s.to_string(),
            }),
        }
    }
}

/// Server-context fetch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFetchOptions {
    /// Provider the context is fetched through.
    pub provider: String,
    pub path: String,
    /// Fixed delay between attempts. There is no cap on attempts.
    pub retry_delay: Duration,
}

impl Default for ContextFetchOptions {
    fn default() -> Self {
        Self {
            provider: MAIN_PROVIDER.to_string(),
            path: "/__context".to_string(),
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Construction-time options of a [`Package`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageOptions {
    pub theme_timings: ThemeTimings,
    pub context: ContextFetchOptions,
    /// Log every dispatched action.
    pub dev_tools: bool,
}

impl PackageOptions {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            theme_timings: ThemeTimings {
                poll_interval: cfg.themes.poll_interval,
                timeout: cfg.themes.timeout,
                settle_delay: cfg.themes.settle_delay,
            },
            context: ContextFetchOptions {
                provider: MAIN_PROVIDER.to_string(),
                path: cfg.context.path.clone(),
                retry_delay: cfg.context.retry_delay,
            },
            dev_tools: cfg.package.dev_tools,
        }
    }
}

#[cfg(test)]
mod mode_tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Browser".parse::<RuntimeMode>().unwrap(), RuntimeMode::Browser);
        assert_eq!("server".parse::<RuntimeMode>().unwrap(), RuntimeMode::Server);
        assert!("desktop".parse::<RuntimeMode>().is_err());
    }

    #[test]
    fn options_follow_app_config() {
        let mut cfg = AppConfig::default();
        cfg.themes.timeout = Duration::from_secs(2);
        cfg.context.retry_delay = Duration::from_millis(5);
        cfg.package.dev_tools = true;

        let opts = PackageOptions::from_app_config(&cfg);
        assert_eq!(opts.theme_timings.timeout, Duration::from_secs(2));
        assert_eq!(opts.theme_timings.poll_interval, Duration::from_millis(10));
        assert_eq!(opts.context.retry_delay, Duration::from_millis(5));
        assert_eq!(opts.context.path, "/__context");
        assert!(opts.dev_tools);
    }
}
