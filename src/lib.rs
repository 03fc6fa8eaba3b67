//! Page Markup Server (PMS) Library
//!
//! Fetches a URL in headless Chrome, waits until the page and its subresources
//! have settled, and returns the rendered markup, optionally with a full-page
//! screenshot and per-element computed styles. The HTTP front door serves one
//! fetch at a time on a shared browser and exits after an idle period.
//!
//! # Module Overview
//!
//! - [`render`] - Resource tracking and the quiet/ceiling render scheduler
//! - [`session`] - One page fetch on one tab
//! - [`browser`] - Driver traits, the Chrome backend, and the fetch serializer
//! - [`watchdog`] - Idle teardown
//! - [`server`] - HTTP routes and graceful shutdown
//! - [`config`] - Configuration file support
//! - [`output`] - Framed response bodies
//!
//! # Example
//!
//! ```no_run
//! use pms_lib::{AppState, BrowserManager, ChromeBrowser, ChromeOptions, Config, SessionOptions};
//!
//! # async fn example() -> pms_lib::Result<()> {
//! let config = Config::default();
//! let manager = BrowserManager::new(
//!     ChromeBrowser::new(ChromeOptions::from(&config)),
//!     SessionOptions::default(),
//! );
//! let listener = pms_lib::server::bind(config.host, config.port)?;
//! pms_lib::server::serve(listener, AppState::new(manager, false), config.timeouts.idle).await?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod output;
pub mod render;
pub mod request;
pub mod server;
pub mod session;
pub mod viewport;
pub mod watchdog;

pub use browser::{
    BrowserDriver, BrowserManager, ChromeBrowser, ChromeOptions, ComputedStyles, DriverError,
    ElementStyle, NavigationResponse, PageDriver, PageEvent, ResponseStage,
};
pub use config::Config;
pub use error::{ErrorCategory, ErrorPayload, PmsError, Result};
pub use render::{
    FireReason, RenderOutcome, RenderScheduler, RenderTiming, RenderWatch, ResourceTracker,
};
pub use request::{Credentials, PageRequest, RequestError};
pub use server::AppState;
pub use session::{PageResult, PageSession, RenderedPage, SessionOptions, SkipReason};
pub use viewport::Viewport;
pub use watchdog::{IdleState, IdleWatchdog, TickOutcome};
