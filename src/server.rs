//! HTTP front door: `/GET`, `/EXIT` and `/favicon.ico`.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::{BrowserDriver, BrowserManager};
use crate::output::{self, CONTENT_TYPE};
use crate::request::PageRequest;
use crate::watchdog::{self, run_idle_watchdog, SharedWatchdog};
use crate::{PmsError, Result};

pub struct AppState<D: BrowserDriver> {
    pub manager: Arc<BrowserManager<D>>,
    pub watchdog: SharedWatchdog,
    pub shutdown: CancellationToken,
    /// Stop the server when an unknown path is requested.
    pub exit_on_invalid_request: bool,
}

impl<D: BrowserDriver> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            watchdog: Arc::clone(&self.watchdog),
            shutdown: self.shutdown.clone(),
            exit_on_invalid_request: self.exit_on_invalid_request,
        }
    }
}

impl<D: BrowserDriver> AppState<D> {
    pub fn new(manager: BrowserManager<D>, exit_on_invalid_request: bool) -> Self {
        Self {
            manager: Arc::new(manager),
            watchdog: watchdog::shared(Instant::now()),
            shutdown: CancellationToken::new(),
            exit_on_invalid_request,
        }
    }

    /// Mark a request as received; it stays in flight until the guard drops.
    pub fn begin_request(&self) -> ActivityGuard {
        self.watchdog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .request_received(Instant::now());
        ActivityGuard {
            watchdog: Arc::clone(&self.watchdog),
        }
    }
}

pub struct ActivityGuard {
    watchdog: SharedWatchdog,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.watchdog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .request_completed(Instant::now());
    }
}

pub fn router<D: BrowserDriver>(state: AppState<D>) -> Router {
    Router::new()
        .route("/GET", get(get_page::<D>))
        .route("/EXIT", get(exit::<D>))
        .route("/favicon.ico", get(favicon::<D>))
        .fallback(invalid_request::<D>)
        .with_state(state)
}

fn text_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn get_page<D: BrowserDriver>(
    State(state): State<AppState<D>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let activity = state.begin_request();
    let request = match PageRequest::from_query(&params) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "rejecting GET request");
            return text_response(StatusCode::BAD_REQUEST, format!("{err}\n"));
        }
    };
    debug!(
        url = %request.url,
        screenshot = request.wants_screenshot(),
        styles = request.computed_styles,
        "GET"
    );

    // The fetch runs on its own task so a client that hangs up does not drop
    // it halfway: the tab still closes before the next fetch is admitted.
    let manager = Arc::clone(&state.manager);
    let url = request.url.clone();
    let fetch = tokio::spawn(async move {
        let _activity = activity;
        let result = manager.fetch(&request).await;
        (request, result)
    });
    let (request, result) = match fetch.await {
        Ok(done) => done,
        Err(err) => {
            warn!(%url, error = %err, "fetch task failed");
            return text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                output::error_body(&url, &err.to_string()),
            );
        }
    };
    let status = StatusCode::from_u16(result.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match output::render_body(&result) {
        Ok(body) => text_response(status, body),
        Err(err) => text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            output::error_body(&request.url, &err.to_string()),
        ),
    }
}

async fn exit<D: BrowserDriver>(State(state): State<AppState<D>>) -> StatusCode {
    info!("exit requested");
    state.shutdown.cancel();
    StatusCode::OK
}

async fn favicon<D: BrowserDriver>(State(state): State<AppState<D>>) -> StatusCode {
    let _activity = state.begin_request();
    StatusCode::NO_CONTENT
}

async fn invalid_request<D: BrowserDriver>(State(state): State<AppState<D>>) -> Response {
    let _activity = state.begin_request();
    warn!("unknown request path");
    if state.exit_on_invalid_request {
        info!("stopping after invalid request");
        state.shutdown.cancel();
    }
    text_response(StatusCode::INTERNAL_SERVER_ERROR, String::new())
}

pub fn bind(host: IpAddr, port: u16) -> Result<TcpListener> {
    TcpListener::bind(SocketAddr::new(host, port))
        .map_err(|e| PmsError::Server(format!("failed to bind {host}:{port}: {e}")))
}

/// Serve until `/EXIT`, idle expiry, or external cancellation of
/// `state.shutdown`. In-flight requests are drained and the browser is
/// closed before returning.
pub async fn serve<D: BrowserDriver>(
    listener: TcpListener,
    state: AppState<D>,
    idle_timeout: Duration,
) -> Result<()> {
    let local = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let shutdown = state.shutdown.clone();
    let manager = Arc::clone(&state.manager);
    let idle = tokio::spawn(run_idle_watchdog(
        Arc::clone(&state.watchdog),
        idle_timeout,
        shutdown.clone(),
    ));

    info!(%local, idle_secs = idle_timeout.as_secs(), "page markup server listening");
    let graceful = shutdown.clone();
    let served = axum::Server::from_tcp(listener)
        .map_err(|e| PmsError::Server(e.to_string()))?
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .await
        .map_err(|e| PmsError::Server(e.to_string()));

    shutdown.cancel();
    if let Err(err) = idle.await {
        warn!(error = %err, "idle watchdog task failed");
    }
    info!("closing browser");
    manager.shutdown().await;
    info!("server stopped");
    served
}
