use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::render::RenderTiming;
use crate::Viewport;

pub const DEFAULT_PORT: u16 = 8000;

/// Quiet period after the last subresource completes.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Hard ceiling on the render wait, measured from page open.
pub const DEFAULT_RENDER_CEILING: Duration = Duration::from_millis(2000);

/// Engine-level request timeout; guards navigations that never complete.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle window after which the browser is torn down and the server exits.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(50);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub viewport: Viewport,
    pub timeouts: Timeouts,
    pub browser: BrowserSettings,
    pub require_html: bool,
    pub exit_on_invalid_request: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub quiet_period: Duration,
    #[serde(with = "humantime_serde")]
    pub ceiling: Duration,
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            ceiling: DEFAULT_RENDER_CEILING,
            navigation: DEFAULT_NAVIGATION_TIMEOUT,
            idle: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl Timeouts {
    pub fn render_timing(&self) -> RenderTiming {
        RenderTiming {
            quiet_period: self.quiet_period,
            ceiling: self.ceiling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSettings {
    pub chrome_path: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    pub no_sandbox: bool,
    pub ignore_certificate_errors: bool,
    pub disable_web_security: bool,
    pub user_agent_suffix: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            user_data_dir: None,
            headless: true,
            no_sandbox: false,
            ignore_certificate_errors: true,
            disable_web_security: true,
            user_agent_suffix: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            viewport: Viewport::default(),
            timeouts: Timeouts::default(),
            browser: BrowserSettings::default(),
            require_html: true,
            exit_on_invalid_request: false,
        }
    }
}

impl Config {
    /// `~/.config/pms/config.toml` (platform config dir), if one can be determined.
    pub fn central_config_path() -> Option<PathBuf> {
        let dir = dirs::config_dir()?;
        Some(dir.join("pms").join("config.toml"))
    }

    /// Load from an explicit path, else the central config file when it exists,
    /// else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::central_config_path() {
            Some(central) if central.is_file() => Self::from_file(&central),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(format!(
                "viewport must have positive dimensions, got {}",
                self.viewport
            ));
        }
        let durations = [
            ("timeouts.quiet_period", self.timeouts.quiet_period),
            ("timeouts.ceiling", self.timeouts.ceiling),
            ("timeouts.navigation", self.timeouts.navigation),
            ("timeouts.idle", self.timeouts.idle),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(format!("{name} must be greater than zero"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();

        assert_eq!(cfg.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.viewport, Viewport::default());
        assert_eq!(cfg.timeouts.quiet_period, Duration::from_millis(500));
        assert_eq!(cfg.timeouts.ceiling, Duration::from_millis(2000));
        assert_eq!(cfg.timeouts.idle, Duration::from_secs(50));
        assert!(cfg.browser.headless);
        assert!(cfg.browser.ignore_certificate_errors);
        assert!(cfg.require_html);
        assert!(!cfg.exit_on_invalid_request);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml_with_humantime_durations() {
        let cfg = Config::from_toml(
            r#"
port = 9123

[timeouts]
quiet_period = "250ms"
idle = "2m"

[browser]
chrome_path = "/opt/chrome/chrome"
user_agent_suffix = " - WPSS_Tool"
"#,
        )
        .unwrap();

        assert_eq!(cfg.port, 9123);
        assert_eq!(cfg.timeouts.quiet_period, Duration::from_millis(250));
        assert_eq!(cfg.timeouts.ceiling, DEFAULT_RENDER_CEILING);
        assert_eq!(cfg.timeouts.idle, Duration::from_secs(120));
        assert_eq!(
            cfg.browser.chrome_path.as_deref(),
            Some(Path::new("/opt/chrome/chrome"))
        );
        assert_eq!(cfg.browser.user_agent_suffix.as_deref(), Some(" - WPSS_Tool"));
        assert!(cfg.browser.headless);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Config::from_toml("threshold = 0.9\n").is_err());
    }

    #[test]
    fn validate_rejects_zero_durations() {
        let cfg = Config::from_toml("[timeouts]\nceiling = \"0s\"\n").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("timeouts.ceiling"), "got: {err}");
    }

    #[test]
    fn load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pms.toml");
        fs::write(&path, "require_html = false\n").unwrap();

        let cfg = Config::load(Some(&path)).unwrap();
        assert!(!cfg.require_html);
    }

    #[test]
    fn load_fails_for_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn render_timing_comes_from_timeouts() {
        let timing = Timeouts::default().render_timing();
        assert_eq!(timing.quiet_period, DEFAULT_QUIET_PERIOD);
        assert_eq!(timing.ceiling, DEFAULT_RENDER_CEILING);
    }
}
