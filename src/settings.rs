use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pms_lib::{Config, PmsError, SessionOptions, Viewport};
use tracing::info;

/// Flags given on the `serve` command line. `None` keeps the config value.
#[derive(Debug, Default, Clone)]
pub struct ServeOverrides {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub chrome_path: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub quiet_period_ms: Option<u64>,
    pub max_render_wait_ms: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub viewport: Option<Viewport>,
}

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/pms/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, PmsError> {
    Config::load(path).map_err(|e| {
        let loc = path
            .map(Path::to_path_buf)
            .or_else(Config::central_config_path)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());
        PmsError::config(format!("Failed to read config {}: {}", loc, e))
    })
}

/// Apply command-line flags on top of `config` and validate the result.
pub fn resolve_serve_config(
    mut config: Config,
    overrides: &ServeOverrides,
    config_path: Option<&Path>,
) -> Result<Config, PmsError> {
    if let Some(host) = overrides.host {
        config.host = host;
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if let Some(path) = &overrides.chrome_path {
        config.browser.chrome_path = Some(path.clone());
    }
    if let Some(dir) = &overrides.user_data_dir {
        config.browser.user_data_dir = Some(dir.clone());
    }
    if let Some(ms) = overrides.quiet_period_ms {
        config.timeouts.quiet_period = Duration::from_millis(ms);
    }
    if let Some(ms) = overrides.max_render_wait_ms {
        config.timeouts.ceiling = Duration::from_millis(ms);
    }
    if let Some(secs) = overrides.idle_timeout_secs {
        config.timeouts.idle = Duration::from_secs(secs);
    }
    if let Some(viewport) = overrides.viewport {
        config.viewport = viewport;
    }
    validate(config, config_path)
}

pub fn validate(config: Config, config_path: Option<&Path>) -> Result<Config, PmsError> {
    config.validate().map_err(|e| {
        let message = config_path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        PmsError::config(message)
    })?;
    Ok(config)
}

pub fn session_options(config: &Config) -> SessionOptions {
    SessionOptions {
        viewport: config.viewport,
        timing: config.timeouts.render_timing(),
        require_html: config.require_html,
        user_agent_suffix: config.browser.user_agent_suffix.clone(),
    }
}

/// Log the effective config (debug mode shows it at startup).
pub fn log_effective_config(config: &Config, config_path: Option<&Path>) {
    info!(
        source = %format_config_source(config_path),
        listen = %format!("{}:{}", config.host, config.port),
        viewport = %config.viewport,
        quiet_ms = config.timeouts.quiet_period.as_millis() as u64,
        ceiling_ms = config.timeouts.ceiling.as_millis() as u64,
        navigation_secs = config.timeouts.navigation.as_secs(),
        idle_secs = config.timeouts.idle.as_secs(),
        chrome = ?config.browser.chrome_path,
        user_data_dir = ?config.browser.user_data_dir,
        headless = config.browser.headless,
        require_html = config.require_html,
        "effective config"
    );
}

fn format_config_source(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .or_else(|| {
            Config::central_config_path()
                .filter(|p| p.is_file())
                .map(|p| p.display().to_string())
        })
        .unwrap_or_else(|| "defaults/built-in".to_string())
}
