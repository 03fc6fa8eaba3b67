//! Browser automation for rendering pages.
//!
//! # Module Structure
//!
//! - [`driver`] - the engine-independent driver traits and page events
//! - [`chrome`] - headless Chrome over the DevTools protocol
//! - [`manager`] - serializes page fetches onto one engine
//! - `styles` - the in-page computed style capture
//!
//! # Example
//!
//! ```no_run
//! use pms_lib::{BrowserManager, ChromeBrowser, ChromeOptions, PageRequest, SessionOptions};
//!
//! # async fn example() {
//! let manager = BrowserManager::new(
//!     ChromeBrowser::new(ChromeOptions::default()),
//!     SessionOptions::default(),
//! );
//! let result = manager.fetch(&PageRequest::new("https://example.com")).await;
//! println!("status {}", result.status_code());
//! manager.shutdown().await;
//! # }
//! ```

pub mod chrome;
pub mod driver;
mod manager;
mod styles;

#[cfg(test)]
pub(crate) mod testing;

pub use chrome::{ChromeBrowser, ChromeOptions};
pub use driver::{
    BrowserDriver, DriverError, ImageFormat, NavigationResponse, PageDriver, PageEvent,
    PageEventStream, PageSetup, ResponseStage,
};
pub use manager::BrowserManager;
pub use styles::{ComputedStyles, ElementStyle};
pub(crate) use styles::COMPUTED_STYLES_SCRIPT;
