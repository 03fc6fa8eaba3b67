//! One page fetch on one browser tab.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::browser::{
    ComputedStyles, DriverError, ImageFormat, NavigationResponse, PageDriver, PageSetup,
    COMPUTED_STYLES_SCRIPT,
};
use crate::render::{FireReason, RenderOutcome, RenderTiming, RenderWatch};
use crate::request::PageRequest;
use crate::{Result, Viewport};

/// Settings shared by every session of one server.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub viewport: Viewport,
    pub timing: RenderTiming,
    /// Skip responses whose content type is missing or not HTML.
    pub require_html: bool,
    pub user_agent_suffix: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            timing: RenderTiming::default(),
            require_html: true,
            user_agent_suffix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BinaryUrl(&'static str),
    NotHtml(Option<String>),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BinaryUrl(ext) => write!(f, "binary resource (.{ext})"),
            SkipReason::NotHtml(Some(content_type)) => write!(f, "not HTML ({content_type})"),
            SkipReason::NotHtml(None) => write!(f, "missing content type"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub url: String,
    pub markup: String,
    pub screenshot: Option<PathBuf>,
    pub styles: Option<ComputedStyles>,
    pub fired_by: FireReason,
    /// Time from page open to the render firing.
    pub render_wait: Duration,
    /// Time from session start to the end of the harvest.
    pub elapsed: Duration,
    pub script_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    Success(RenderedPage),
    NotFound { url: String },
    Skipped { url: String, reason: SkipReason },
    ServerError { url: String, message: String },
}

impl PageResult {
    pub fn status_code(&self) -> u16 {
        match self {
            PageResult::Success(_) | PageResult::Skipped { .. } => 200,
            PageResult::NotFound { .. } => 404,
            PageResult::ServerError { .. } => 500,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            PageResult::Success(page) => &page.url,
            PageResult::NotFound { url }
            | PageResult::Skipped { url, .. }
            | PageResult::ServerError { url, .. } => url,
        }
    }
}

/// Owns one tab for the length of one request. The tab is closed when the
/// session ends, whatever the outcome.
pub struct PageSession<P: PageDriver> {
    page: P,
    options: SessionOptions,
}

impl<P: PageDriver> PageSession<P> {
    pub fn new(page: P, options: SessionOptions) -> Self {
        Self { page, options }
    }

    pub async fn open(mut self, request: &PageRequest) -> Result<PageResult> {
        let result = self.load(request).await;
        if let Err(err) = self.page.close().await {
            warn!(url = %request.url, error = %err, "failed to close page");
        }
        result
    }

    async fn load(&mut self, request: &PageRequest) -> Result<PageResult> {
        let started = Instant::now();
        self.page
            .configure(&PageSetup {
                viewport: self.options.viewport,
                user_agent_suffix: self.options.user_agent_suffix.clone(),
            })
            .await?;

        // Subscribe before navigating so no request of the load is missed.
        let mut events = self.page.events().await?;

        let Some(response) = self.navigate(request).await? else {
            return Ok(PageResult::NotFound {
                url: request.url.clone(),
            });
        };
        if !response.is_success() {
            info!(
                url = %request.url,
                status = ?response.status,
                "navigation returned failure status"
            );
            return Ok(PageResult::NotFound {
                url: request.url.clone(),
            });
        }
        if self.options.require_html && !response.is_html() {
            let reason = SkipReason::NotHtml(response.content_type.clone());
            debug!(url = %request.url, %reason, "skipping response");
            return Ok(PageResult::Skipped {
                url: request.url.clone(),
                reason,
            });
        }

        let opened_at = Instant::now();
        let mut watch = RenderWatch::new(request.url.as_str(), self.options.timing);
        watch.start(opened_at);
        let fired_by = match watch.run(&mut events).await {
            RenderOutcome::Fired(reason) => reason,
            RenderOutcome::DocumentFailed { error } => {
                info!(url = %request.url, %error, "main document failed during render");
                return Ok(PageResult::NotFound {
                    url: request.url.clone(),
                });
            }
        };
        let render_wait = opened_at.elapsed();
        // The snapshot is taken under the latch; later events are never read.
        drop(events);
        debug!(
            url = %request.url,
            ?fired_by,
            wait_ms = render_wait.as_millis() as u64,
            "harvesting page"
        );

        let markup = strip_noscript(&self.page.content().await?);
        let screenshot = match &request.screenshot {
            Some(path) => {
                let format = ImageFormat::from_path(path);
                let bytes = self.page.screenshot(format).await?;
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, bytes).await?;
                debug!(path = %path.display(), "page image saved");
                Some(path.clone())
            }
            None => None,
        };
        let styles = if request.computed_styles {
            let value = self.page.evaluate(COMPUTED_STYLES_SCRIPT).await?;
            Some(ComputedStyles::from_value(value)?)
        } else {
            None
        };

        Ok(PageResult::Success(RenderedPage {
            url: request.url.clone(),
            markup,
            screenshot,
            styles,
            fired_by,
            render_wait,
            elapsed: started.elapsed(),
            script_errors: watch.into_script_errors(),
        }))
    }

    /// `None` when the navigation itself failed (unreachable host, aborted load).
    /// A 401 is retried once with credentials when the request carries them.
    async fn navigate(&mut self, request: &PageRequest) -> Result<Option<NavigationResponse>> {
        let mut response = match self.page.navigate(&request.url).await {
            Ok(response) => response,
            Err(DriverError::Navigation(message)) => {
                info!(url = %request.url, %message, "navigation failed");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if response.is_unauthorized() {
            if let Some(credentials) = &request.credentials {
                debug!(
                    url = %request.url,
                    user = %credentials.username,
                    "retrying with credentials"
                );
                self.page.authenticate(credentials).await?;
                response = match self.page.navigate(&request.url).await {
                    Ok(response) => response,
                    Err(DriverError::Navigation(message)) => {
                        info!(
                            url = %request.url,
                            %message,
                            "navigation failed after authentication"
                        );
                        return Ok(None);
                    }
                    Err(err) => return Err(err.into()),
                };
            }
        }
        Ok(Some(response))
    }
}

fn noscript_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)<\s*noscript\s*>[^<]*<\s*/\s*noscript\s*>").ok())
        .as_ref()
}

/// Remove `<noscript>` elements whose content the engine serialized as text.
pub fn strip_noscript(markup: &str) -> String {
    match noscript_pattern() {
        Some(pattern) => pattern.replace_all(markup, "").into_owned(),
        None => markup.to_string(),
    }
}
