use std::path::PathBuf;
use std::process::ExitCode;

use pms_lib::output::render_body;
use pms_lib::request::validate_url;
use pms_lib::{
    BrowserManager, ChromeBrowser, ChromeOptions, Credentials, PageRequest, PageResult, PmsError,
};
use tracing::{info, warn};

use crate::formatting::{exit_code_for, render_error, write_body};
use crate::settings::{load_config, log_effective_config, session_options, validate};

/// Options of the one-shot `render` command.
#[derive(Debug, Default)]
pub struct RenderArgs {
    pub url: String,
    pub page_image: Option<PathBuf>,
    pub computed_styles: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub chrome_path: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
}

impl RenderArgs {
    fn page_request(&self) -> PageRequest {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
            _ => None,
        };
        let mut request = PageRequest::new(self.url.trim())
            .with_computed_styles(self.computed_styles)
            .with_credentials(credentials);
        if let Some(path) = &self.page_image {
            request = request.with_screenshot(path.clone());
        }
        request
    }
}

/// Render one URL through a fresh browser and print the framed body.
pub async fn run_render(config_path: Option<PathBuf>, debug: bool, args: RenderArgs) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err),
    };
    if let Some(path) = &args.chrome_path {
        config.browser.chrome_path = Some(path.clone());
    }
    if let Some(dir) = &args.user_data_dir {
        config.browser.user_data_dir = Some(dir.clone());
    }
    let config = match validate(config, config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err),
    };
    if debug {
        log_effective_config(&config, config_path.as_deref());
    }

    if let Err(err) = validate_url(args.url.trim()) {
        return render_error(PmsError::InvalidRequest(err.to_string()));
    }

    let manager = BrowserManager::new(
        ChromeBrowser::new(ChromeOptions::from(&config)),
        session_options(&config),
    );
    let result = manager.fetch(&args.page_request()).await;
    manager.shutdown().await;

    match &result {
        PageResult::Success(page) => info!(
            url = %page.url,
            fired_by = ?page.fired_by,
            elapsed_ms = page.elapsed.as_millis() as u64,
            "rendered"
        ),
        PageResult::Skipped { url, reason } => info!(%url, %reason, "skipped"),
        PageResult::NotFound { url } => info!(%url, "not found"),
        PageResult::ServerError { url, message } => warn!(%url, %message, "render failed"),
    }

    let body = match render_body(&result) {
        Ok(body) => body,
        Err(err) => return render_error(err),
    };
    if let Err(err) = write_body(&body) {
        return render_error(PmsError::Io(err));
    }
    ExitCode::from(exit_code_for(&result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_credentials_only_when_both_given() {
        let args = RenderArgs {
            url: " https://example.com/ ".into(),
            username: Some("ann".into()),
            password: Some("secret".into()),
            computed_styles: true,
            page_image: Some(PathBuf::from("/tmp/shot.png")),
            ..RenderArgs::default()
        };
        let request = args.page_request();
        assert_eq!(request.url, "https://example.com/");
        assert!(request.computed_styles);
        assert!(request.wants_screenshot());
        let credentials = request.credentials.unwrap();
        assert_eq!(credentials.username, "ann");

        let anonymous = RenderArgs {
            url: "https://example.com/".into(),
            username: Some("ann".into()),
            ..RenderArgs::default()
        };
        assert!(anonymous.page_request().credentials.is_none());
    }
}
