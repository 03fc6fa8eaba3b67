//! Scripted driver used by unit tests: replays timed page events without a browser.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::json;
use tokio::time::{sleep_until, Instant};

use super::driver::{
    BrowserDriver, DriverError, ImageFormat, NavigationResponse, PageDriver, PageEvent,
    PageEventStream, PageSetup, ResponseStage,
};
use crate::request::Credentials;

/// Ordered log of driver calls, shared between a browser and its pages.
#[derive(Debug, Clone, Default)]
pub(crate) struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn record(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|entry| entry.contains(needle))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }
}

/// What one page does when navigated. Event offsets are relative to the end of
/// the navigation.
#[derive(Debug, Clone)]
pub(crate) struct PageScript {
    pub navigation: Result<NavigationResponse, DriverError>,
    pub after_auth: Option<NavigationResponse>,
    pub events: Vec<(Duration, PageEvent)>,
    pub content: String,
    pub content_error: Option<DriverError>,
    pub navigation_delay: Duration,
}

impl PageScript {
    pub const SCREENSHOT_BYTES: &'static [u8] = &[0xff, 0xd8, 0xff, 0xd9];

    pub fn html(content: &str) -> Self {
        Self {
            navigation: Ok(NavigationResponse::new(200, "text/html; charset=utf-8")),
            after_auth: None,
            events: Vec::new(),
            content: content.to_string(),
            content_error: None,
            navigation_delay: Duration::ZERO,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        if let Ok(response) = &mut self.navigation {
            response.status = Some(status);
        }
        self
    }

    pub fn with_status_after_auth(mut self, status: u16) -> Self {
        self.after_auth = Some(NavigationResponse::new(status, "text/html"));
        self
    }

    pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
        if let Ok(response) = &mut self.navigation {
            response.content_type = content_type.map(str::to_string);
        }
        self
    }

    pub fn with_navigation_error(mut self, message: &str) -> Self {
        self.navigation = Err(DriverError::Navigation(message.to_string()));
        self
    }

    pub fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    pub fn with_content_error(mut self, error: DriverError) -> Self {
        self.content_error = Some(error);
        self
    }

    pub fn with_event(mut self, at: Duration, event: PageEvent) -> Self {
        self.events.push((at, event));
        self
    }

    /// A subresource requested at `start` and fully received at `end`.
    pub fn with_resource(self, id: &str, url: &str, start: Duration, end: Duration) -> Self {
        self.with_event(
            start,
            PageEvent::RequestStarted {
                id: id.to_string(),
                url: url.to_string(),
            },
        )
        .with_event(
            end,
            PageEvent::ResponseReceived {
                id: id.to_string(),
                stage: ResponseStage::End,
            },
        )
    }
}

pub(crate) struct ScriptedPage {
    script: Option<PageScript>,
    routes: HashMap<String, PageScript>,
    trace: Trace,
    url: String,
    sender: Option<mpsc::UnboundedSender<PageEvent>>,
    authenticated: bool,
}

impl ScriptedPage {
    pub fn new(script: PageScript, trace: Trace) -> Self {
        Self {
            script: Some(script),
            routes: HashMap::new(),
            trace,
            url: String::new(),
            sender: None,
            authenticated: false,
        }
    }

    /// A page that picks its script by the navigated URL.
    pub fn routed(routes: HashMap<String, PageScript>, trace: Trace) -> Self {
        Self {
            script: None,
            routes,
            trace,
            url: String::new(),
            sender: None,
            authenticated: false,
        }
    }

    fn script(&self) -> Result<&PageScript, DriverError> {
        self.script
            .as_ref()
            .ok_or_else(|| DriverError::Page("page used before navigation".into()))
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn configure(&mut self, setup: &PageSetup) -> Result<(), DriverError> {
        self.trace.record(format!("configure {}", setup.viewport));
        Ok(())
    }

    async fn events(&mut self) -> Result<PageEventStream, DriverError> {
        let (sender, receiver) = mpsc::unbounded();
        self.sender = Some(sender);
        Ok(receiver.boxed())
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResponse, DriverError> {
        self.trace.record(format!("navigate {url}"));
        self.url = url.to_string();
        if let Some(route) = self.routes.get(url) {
            self.script = Some(route.clone());
        } else if self.script.is_none() {
            self.script =
                Some(PageScript::html("").with_navigation_error("net::ERR_NAME_NOT_RESOLVED"));
        }
        let script = self.script()?.clone();

        if !script.navigation_delay.is_zero() {
            tokio::time::sleep(script.navigation_delay).await;
        }
        let response = match (script.navigation, script.after_auth) {
            (Ok(_), Some(after_auth)) if self.authenticated => after_auth,
            (navigation, _) => navigation?,
        };

        if let Some(sender) = self.sender.clone() {
            let base = Instant::now();
            tokio::spawn(async move {
                for (at, event) in script.events {
                    sleep_until(base + at).await;
                    if sender.unbounded_send(event).is_err() {
                        break;
                    }
                }
            });
        }
        Ok(response)
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), DriverError> {
        self.trace
            .record(format!("authenticate {}", credentials.username));
        self.authenticated = true;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        self.trace.record(format!("content {}", self.url));
        let script = self.script()?;
        match &script.content_error {
            Some(err) => Err(err.clone()),
            None => Ok(script.content.clone()),
        }
    }

    async fn screenshot(&mut self, format: ImageFormat) -> Result<Vec<u8>, DriverError> {
        self.trace.record(format!("screenshot {format:?}"));
        Ok(PageScript::SCREENSHOT_BYTES.to_vec())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, DriverError> {
        self.trace.record("evaluate");
        Ok(json!({
            "url": self.url,
            "elements": [{
                "id": "",
                "className": "",
                "tagName": "P",
                "childNodes": 1,
                "innerHTML": "x",
                "element_text": "x",
                "offsetHeight": 18,
                "offsetWidth": 1264,
                "offsetTop": 16,
                "offsetLeft": 8,
                "computedStyle": {"display": "block"},
                "parentTagName": "BODY"
            }]
        }))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.trace.record(format!("close {}", self.url));
        self.sender = None;
        Ok(())
    }
}

/// Hands out pages routed by URL; unknown URLs fail navigation.
#[derive(Clone, Default)]
pub(crate) struct ScriptedBrowser {
    routes: HashMap<String, PageScript>,
    launch_errors: Arc<Mutex<Vec<DriverError>>>,
    pub trace: Trace,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, script: PageScript) -> Self {
        self.routes.insert(url.to_string(), script);
        self
    }

    /// The next `new_page` call fails with `error`.
    pub fn fail_next_launch(self, error: DriverError) -> Self {
        self.launch_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
        self
    }
}

#[async_trait]
impl BrowserDriver for ScriptedBrowser {
    type Page = ScriptedPage;

    async fn new_page(&mut self) -> Result<Self::Page, DriverError> {
        let pending = self
            .launch_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        if let Some(err) = pending {
            self.trace.record("new_page failed");
            return Err(err);
        }
        self.trace.record("new_page");
        Ok(ScriptedPage::routed(self.routes.clone(), self.trace.clone()))
    }

    async fn reset(&mut self) {
        self.trace.record("reset");
    }

    async fn shutdown(&mut self) {
        self.trace.record("shutdown");
    }
}
