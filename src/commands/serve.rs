use std::path::PathBuf;
use std::process::ExitCode;

use pms_lib::server::{self, AppState};
use pms_lib::{BrowserManager, ChromeBrowser, ChromeOptions};
use tracing::{debug, info};

use crate::formatting::render_error;
use crate::settings::{
    load_config, log_effective_config, resolve_serve_config, session_options, ServeOverrides,
};

/// Run the HTTP server until `/EXIT` or idle expiry.
pub async fn run_serve(
    config_path: Option<PathBuf>,
    debug: bool,
    overrides: ServeOverrides,
) -> ExitCode {
    let config = match load_config(config_path.as_deref())
        .and_then(|cfg| resolve_serve_config(cfg, &overrides, config_path.as_deref()))
    {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err),
    };
    if debug {
        log_effective_config(&config, config_path.as_deref());
    }

    let listener = match server::bind(config.host, config.port) {
        Ok(listener) => listener,
        Err(err) => return render_error(err),
    };

    let manager = BrowserManager::new(
        ChromeBrowser::new(ChromeOptions::from(&config)),
        session_options(&config),
    );
    debug!("browser launches on the first request");
    let state = AppState::new(manager, config.exit_on_invalid_request);

    match server::serve(listener, state, config.timeouts.idle).await {
        Ok(()) => {
            info!("exiting");
            ExitCode::SUCCESS
        }
        Err(err) => render_error(err),
    }
}
