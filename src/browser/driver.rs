//! The seam between page sessions and a concrete browser engine.
//!
//! A backend implements [`BrowserDriver`] (the long-lived engine connection) and
//! [`PageDriver`] (one tab). Everything above this module only sees these traits,
//! so a new engine requires nothing else.

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::request::Credentials;
use crate::Viewport;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("failed to launch or connect to the browser: {0}")]
    Launch(String),
    #[error("browser connection failed: {0}")]
    Channel(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("page operation failed: {0}")]
    Page(String),
}

impl DriverError {
    /// Launch and channel failures leave the engine in an unknown state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Launch(_) | DriverError::Channel(_))
    }
}

/// Stage of a resource response. Engines may report a response in several
/// steps; only [`ResponseStage::End`] means the body is fully received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStage {
    Start,
    End,
}

/// Network and script activity of one page, in engine-reported order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    RequestStarted { id: String, url: String },
    ResponseReceived { id: String, stage: ResponseStage },
    RequestFailed { id: String, error: String },
    ScriptError { message: String },
}

pub type PageEventStream = BoxStream<'static, PageEvent>;

/// Final response of a navigation (after redirects).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationResponse {
    pub status: Option<u16>,
    pub content_type: Option<String>,
}

impl NavigationResponse {
    pub fn new(status: u16, content_type: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            content_type: Some(content_type.into()),
        }
    }

    /// Non-HTTP documents (`file:`, `about:`) carry no status and count as success.
    pub fn is_success(&self) -> bool {
        self.status
            .map_or(true, |status| (200..400).contains(&status))
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|value| value.to_ascii_lowercase().contains("html"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    /// JPEG unless the file extension asks for something else.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => ImageFormat::Png,
            Some("webp") => ImageFormat::Webp,
            _ => ImageFormat::Jpeg,
        }
    }
}

/// Per-tab settings applied before navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSetup {
    pub viewport: Viewport,
    pub user_agent_suffix: Option<String>,
}

#[async_trait]
pub trait BrowserDriver: Send + 'static {
    type Page: PageDriver;

    /// Open a fresh tab, launching or reconnecting the engine first if needed.
    async fn new_page(&mut self) -> Result<Self::Page, DriverError>;

    /// Discard the engine connection after a fatal error.
    async fn reset(&mut self);

    /// Close the engine for good.
    async fn shutdown(&mut self);
}

#[async_trait]
pub trait PageDriver: Send {
    async fn configure(&mut self, setup: &PageSetup) -> Result<(), DriverError>;

    /// Subscribe to page events. Must be called before [`PageDriver::navigate`]
    /// so no request of the navigation is missed.
    async fn events(&mut self) -> Result<PageEventStream, DriverError>;

    async fn navigate(&mut self, url: &str) -> Result<NavigationResponse, DriverError>;

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), DriverError>;

    async fn content(&mut self) -> Result<String, DriverError>;

    async fn screenshot(&mut self, format: ImageFormat) -> Result<Vec<u8>, DriverError>;

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}
