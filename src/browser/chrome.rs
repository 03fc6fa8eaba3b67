//! Headless Chrome backend over the DevTools protocol.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, HeaderEntry, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    Headers, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, SetBypassCspParams};
use chromiumoxide::cdp::js_protocol::runtime::{self, EvaluateParams, EventExceptionThrown};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::{Origin, Url};

use super::driver::{
    BrowserDriver, DriverError, ImageFormat, NavigationResponse, PageDriver, PageEvent,
    PageEventStream, PageSetup, ResponseStage,
};
use crate::config::{Config, DEFAULT_NAVIGATION_TIMEOUT};
use crate::request::Credentials;
use crate::Viewport;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Launch settings for the Chrome process.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromeOptions {
    pub executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    pub no_sandbox: bool,
    pub ignore_certificate_errors: bool,
    pub disable_web_security: bool,
    pub window: Viewport,
    /// Per-command timeout; bounds navigations that never finish.
    pub navigation_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            executable: None,
            user_data_dir: None,
            headless: true,
            no_sandbox: false,
            ignore_certificate_errors: true,
            disable_web_security: true,
            window: Viewport::default(),
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
        }
    }
}

impl From<&Config> for ChromeOptions {
    fn from(config: &Config) -> Self {
        Self {
            executable: config.browser.chrome_path.clone(),
            user_data_dir: config.browser.user_data_dir.clone(),
            headless: config.browser.headless,
            no_sandbox: config.browser.no_sandbox,
            ignore_certificate_errors: config.browser.ignore_certificate_errors,
            disable_web_security: config.browser.disable_web_security,
            window: config.viewport,
            navigation_timeout: config.timeouts.navigation,
        }
    }
}

impl ChromeOptions {
    fn browser_config(&self) -> Result<BrowserConfig, DriverError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.window.width, self.window.height)
            .request_timeout(self.navigation_timeout);
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(dir) = &self.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        if self.ignore_certificate_errors {
            builder = builder.arg("--ignore-certificate-errors");
        }
        if self.disable_web_security {
            builder = builder
                .arg("--disable-web-security")
                .arg("--disable-site-isolation-trials");
        }
        builder.build().map_err(DriverError::Launch)
    }
}

/// One Chrome process, launched lazily and shared by all pages.
pub struct ChromeBrowser {
    options: ChromeOptions,
    /// The process this driver launched. Dropping it kills Chrome.
    process: Option<Browser>,
    /// A later connection to `process`, made after the first event handler died.
    reconnected: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    endpoint: Option<String>,
    user_agent: Option<String>,
}

/// How to obtain a usable connection before opening a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connection {
    Live,
    Reconnect,
    Launch,
}

fn connection_plan(handler_alive: bool, process_running: bool, has_endpoint: bool) -> Connection {
    match (handler_alive, process_running, has_endpoint) {
        (true, true, _) => Connection::Live,
        (false, true, true) => Connection::Reconnect,
        _ => Connection::Launch,
    }
}

fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                debug!(error = %err, "devtools handler error");
            }
        }
        debug!("devtools connection closed");
    })
}

impl ChromeBrowser {
    pub fn new(options: ChromeOptions) -> Self {
        Self {
            options,
            process: None,
            reconnected: None,
            handler: None,
            endpoint: None,
            user_agent: None,
        }
    }

    fn client(&self) -> Option<&Browser> {
        self.reconnected.as_ref().or(self.process.as_ref())
    }

    async fn launch(&mut self) -> Result<(), DriverError> {
        let config = self.options.browser_config()?;
        info!(
            executable = ?self.options.executable,
            user_data_dir = ?self.options.user_data_dir,
            "launching chrome"
        );
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        self.endpoint = Some(browser.websocket_address().clone());
        self.process = Some(browser);
        self.handler = Some(spawn_handler(handler));
        Ok(())
    }

    /// The connection is live while its handler task runs. A dead handler on a
    /// still-running process is replaced by a fresh connection to the same
    /// endpoint; the launched `Browser` stays owned so the process survives.
    async fn ensure_browser(&mut self) -> Result<(), DriverError> {
        let handler_alive = self
            .handler
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        let process_running = self
            .process
            .as_mut()
            .is_some_and(|process| matches!(process.try_wait(), Ok(None)));

        match connection_plan(handler_alive, process_running, self.endpoint.is_some()) {
            Connection::Live => return Ok(()),
            Connection::Reconnect => {
                self.user_agent = None;
                self.reconnected = None;
                if let Some(endpoint) = self.endpoint.clone() {
                    debug!(%endpoint, "reconnecting to chrome");
                    match Browser::connect(endpoint.as_str()).await {
                        Ok((browser, handler)) => {
                            self.reconnected = Some(browser);
                            self.handler = Some(spawn_handler(handler));
                            info!("reconnected to chrome");
                            return Ok(());
                        }
                        Err(err) => warn!(error = %err, "reconnect failed, relaunching chrome"),
                    }
                }
            }
            Connection::Launch => {}
        }
        self.reset().await;
        self.launch().await
    }
}

fn channel_or(err: CdpError, other: fn(String) -> DriverError) -> DriverError {
    match err {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            DriverError::Channel(err.to_string())
        }
        err => other(err.to_string()),
    }
}

fn page_error(err: CdpError) -> DriverError {
    channel_or(err, DriverError::Page)
}

#[async_trait]
impl BrowserDriver for ChromeBrowser {
    type Page = ChromePage;

    async fn new_page(&mut self) -> Result<ChromePage, DriverError> {
        self.ensure_browser().await?;
        let browser = self
            .client()
            .ok_or_else(|| DriverError::Launch("browser unavailable after launch".into()))?;
        let page = browser.new_page("about:blank").await.map_err(page_error)?;
        let user_agent = match &self.user_agent {
            Some(agent) => agent.clone(),
            None => {
                let agent = browser.version().await.map_err(page_error)?.user_agent;
                self.user_agent = Some(agent.clone());
                agent
            }
        };
        Ok(ChromePage {
            page,
            user_agent,
            navigation_timeout: self.options.navigation_timeout,
            document_origin: None,
            auth_task: None,
        })
    }

    async fn reset(&mut self) {
        let mut reconnected = self.reconnected.take();
        let mut process = self.process.take();
        if let Some(browser) = reconnected.as_mut().or(process.as_mut()) {
            match tokio::time::timeout(CLOSE_TIMEOUT, browser.close()).await {
                Ok(Ok(_)) => debug!("chrome closed"),
                Ok(Err(err)) => warn!(error = %err, "failed to close chrome"),
                Err(_) => warn!("timed out closing chrome"),
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Some(mut process) = process {
            if tokio::time::timeout(CLOSE_TIMEOUT, process.wait()).await.is_err() {
                warn!("chrome did not exit, killing it");
                if let Some(Err(err)) = process.kill().await {
                    warn!(error = %err, "failed to kill chrome");
                }
            }
        }
        drop(reconnected);
        self.endpoint = None;
        self.user_agent = None;
    }

    async fn shutdown(&mut self) {
        if self.process.is_some() {
            info!("closing chrome");
        }
        self.reset().await;
    }
}

pub struct ChromePage {
    page: Page,
    user_agent: String,
    navigation_timeout: Duration,
    document_origin: Option<Origin>,
    /// Continues intercepted requests once credentials are installed.
    auth_task: Option<JoinHandle<()>>,
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if let Some(task) = self.auth_task.take() {
            task.abort();
        }
    }
}

fn request_event(event: &EventRequestWillBeSent) -> Option<PageEvent> {
    // A redirect hop reuses the request id of the original request.
    if event.redirect_response.is_some() {
        return None;
    }
    Some(PageEvent::RequestStarted {
        id: event.request_id.inner().clone(),
        url: event.request.url.clone(),
    })
}

fn response_event(event: &EventResponseReceived) -> PageEvent {
    PageEvent::ResponseReceived {
        id: event.request_id.inner().clone(),
        stage: ResponseStage::Start,
    }
}

fn finished_event(event: &EventLoadingFinished) -> PageEvent {
    PageEvent::ResponseReceived {
        id: event.request_id.inner().clone(),
        stage: ResponseStage::End,
    }
}

fn failed_event(event: &EventLoadingFailed) -> PageEvent {
    PageEvent::RequestFailed {
        id: event.request_id.inner().clone(),
        error: event.error_text.clone(),
    }
}

fn basic_authorization(credentials: &Credentials) -> String {
    let token = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", credentials.username, credentials.password));
    format!("Basic {token}")
}

/// Opaque origins (`data:`, `blob:` and the like) never match.
fn same_origin(url: &str, origin: &Origin) -> bool {
    Url::parse(url).is_ok_and(|url| url.origin() == *origin)
}

/// The request's own headers with `authorization` replacing any existing one.
fn with_authorization(headers: &Headers, authorization: &str) -> Vec<HeaderEntry> {
    let mut entries: Vec<HeaderEntry> = headers
        .inner()
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("authorization"))
                .filter_map(|(name, value)| {
                    value.as_str().map(|value| HeaderEntry::new(name.clone(), value))
                })
                .collect()
        })
        .unwrap_or_default();
    entries.push(HeaderEntry::new("Authorization", authorization));
    entries
}

fn exception_message(event: &EventExceptionThrown) -> String {
    let details = &event.exception_details;
    details
        .exception
        .as_ref()
        .and_then(|exception| exception.description.clone())
        .unwrap_or_else(|| details.text.clone())
}

fn header_value(headers: &Headers, name: &str) -> Option<String> {
    headers
        .inner()
        .as_object()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.as_str().map(str::to_string))
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn configure(&mut self, setup: &PageSetup) -> Result<(), DriverError> {
        self.page
            .execute(network::EnableParams::default())
            .await
            .map_err(page_error)?;
        self.page
            .execute(runtime::EnableParams::default())
            .await
            .map_err(page_error)?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(setup.viewport.width))
            .height(i64::from(setup.viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(DriverError::Page)?;
        self.page.execute(metrics).await.map_err(page_error)?;
        self.page
            .execute(SetBypassCspParams::new(true))
            .await
            .map_err(page_error)?;

        if let Some(suffix) = &setup.user_agent_suffix {
            let agent = format!("{}{}", self.user_agent, suffix);
            debug!(user_agent = %agent, "user agent override");
            self.page
                .execute(SetUserAgentOverrideParams::new(agent))
                .await
                .map_err(page_error)?;
        }
        Ok(())
    }

    async fn events(&mut self) -> Result<PageEventStream, DriverError> {
        let requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(page_error)?
            .filter_map(|event| async move { request_event(&event) });
        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(page_error)?
            .map(|event| response_event(&event));
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(page_error)?
            .map(|event| finished_event(&event));
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(page_error)?
            .map(|event| failed_event(&event));
        let exceptions = self
            .page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(page_error)?
            .map(|event| PageEvent::ScriptError {
                message: exception_message(&event),
            });

        Ok(stream::select_all(vec![
            requests.boxed(),
            responses.boxed(),
            finished.boxed(),
            failed.boxed(),
            exceptions.boxed(),
        ])
        .boxed())
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResponse, DriverError> {
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(page_error)?;
        self.document_origin = Url::parse(url).ok().map(|url| url.origin());

        let navigation = tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await;
        match navigation {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(channel_or(err, DriverError::Navigation)),
            Err(_) => {
                return Err(DriverError::Navigation(format!(
                    "timed out after {:?}",
                    self.navigation_timeout
                )))
            }
        }

        // The main document response was delivered before the load completed.
        let mut document = None;
        while let Some(Some(event)) = responses.next().now_or_never() {
            if document.is_none() && event.r#type == ResourceType::Document {
                document = Some(event);
            }
        }
        Ok(match document {
            Some(event) => NavigationResponse {
                status: u16::try_from(event.response.status).ok(),
                content_type: header_value(&event.response.headers, "content-type"),
            },
            None => NavigationResponse::default(),
        })
    }

    /// Sends the credentials with every later request to the document's
    /// origin. Requests to other origins continue untouched.
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), DriverError> {
        let origin = self
            .document_origin
            .clone()
            .ok_or_else(|| DriverError::Page("authenticate called before navigation".into()))?;
        let authorization = basic_authorization(credentials);
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(page_error)?;

        let page = self.page.clone();
        if let Some(task) = self.auth_task.take() {
            task.abort();
        }
        self.auth_task = Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let mut params = ContinueRequestParams::new(event.request_id.clone());
                if same_origin(&event.request.url, &origin) {
                    params.headers =
                        Some(with_authorization(&event.request.headers, &authorization));
                }
                if let Err(err) = page.execute(params).await {
                    debug!(error = %err, url = %event.request.url, "failed to continue request");
                }
            }
        }));

        let intercept_all = fetch::EnableParams::builder()
            .pattern(RequestPattern::builder().url_pattern("*").build())
            .build();
        self.page.execute(intercept_all).await.map_err(page_error)?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        self.page.content().await.map_err(page_error)
    }

    async fn screenshot(&mut self, format: ImageFormat) -> Result<Vec<u8>, DriverError> {
        let format = match format {
            ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
            ImageFormat::Png => CaptureScreenshotFormat::Png,
            ImageFormat::Webp => CaptureScreenshotFormat::Webp,
        };
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(format)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(page_error)
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, DriverError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(DriverError::Page)?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(page_error)?
            .into_value::<serde_json::Value>()
            .map_err(|e| DriverError::Page(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if let Some(task) = self.auth_task.take() {
            task.abort();
        }
        self.page.clone().close().await.map_err(page_error)
    }
}
