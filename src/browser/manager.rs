//! Browser manager for serializing page fetches onto one engine.
//!
//! The engine connection is the only shared mutable state of the server. It
//! sits behind an async mutex: a fetch holds the lock from tab creation until
//! its result is built, so concurrent requests queue in arrival order.

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::request::PageRequest;
use crate::session::{PageResult, PageSession, SessionOptions, SkipReason};
use crate::PmsError;

use super::driver::BrowserDriver;

pub struct BrowserManager<D: BrowserDriver> {
    driver: Mutex<D>,
    options: SessionOptions,
}

impl<D: BrowserDriver> BrowserManager<D> {
    pub fn new(driver: D, options: SessionOptions) -> Self {
        Self {
            driver: Mutex::new(driver),
            options,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Fetch one page. Never fails: errors become [`PageResult::ServerError`],
    /// and a fatal engine error discards the engine so the next fetch starts clean.
    pub async fn fetch(&self, request: &PageRequest) -> PageResult {
        if let Some(ext) = request.binary_extension() {
            debug!(url = %request.url, ext, "ignoring binary resource");
            return PageResult::Skipped {
                url: request.url.clone(),
                reason: SkipReason::BinaryUrl(ext),
            };
        }

        let queued_at = Instant::now();
        let mut driver = self.driver.lock().await;
        debug!(
            url = %request.url,
            queued_ms = queued_at.elapsed().as_millis() as u64,
            "fetch admitted"
        );

        let outcome = match driver.new_page().await {
            Ok(page) => {
                PageSession::new(page, self.options.clone())
                    .open(request)
                    .await
            }
            Err(err) => Err(PmsError::from(err)),
        };

        match outcome {
            Ok(result) => {
                info!(
                    url = %request.url,
                    status = result.status_code(),
                    elapsed_ms = queued_at.elapsed().as_millis() as u64,
                    "fetch complete"
                );
                result
            }
            Err(err) => {
                warn!(url = %request.url, error = %err, "fetch failed");
                if err.is_fatal() {
                    info!("discarding browser connection after engine failure");
                    driver.reset().await;
                }
                PageResult::ServerError {
                    url: request.url.clone(),
                    message: err.to_string(),
                }
            }
        }
    }

    /// Close the engine. Waits for an in-flight fetch to finish first.
    pub async fn shutdown(&self) {
        let mut driver = self.driver.lock().await;
        driver.shutdown().await;
    }
}
