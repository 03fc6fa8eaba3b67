use crate::browser::DriverError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum PmsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Browser error: {0}")]
    Driver(#[from] DriverError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl PmsError {
    pub fn config(message: impl Into<String>) -> Self {
        PmsError::Config(message.into())
    }

    /// Whether the browser connection can no longer be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PmsError::Driver(err) if err.is_fatal())
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            PmsError::Io(e) => ErrorPayload::new(
                ErrorCategory::Io,
                e.to_string(),
                "Check file paths/permissions (e.g., the page_image directory).",
            ),
            PmsError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Request,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            PmsError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Engine,
                e.to_string(),
                "The page returned unexpected script output; rerun with --debug for details.",
            ),
            PmsError::Driver(DriverError::Launch(msg)) => ErrorPayload::new(
                ErrorCategory::Engine,
                msg.to_string(),
                "Pass the Chrome executable path explicitly (CHROME_PATH or --chrome-path) and make sure the user data directory is writable.",
            ),
            PmsError::Driver(DriverError::Channel(msg)) => ErrorPayload::new(
                ErrorCategory::Engine,
                msg.to_string(),
                "The browser connection was lost; the next request relaunches Chrome.",
            ),
            PmsError::Driver(DriverError::Navigation(msg)) => ErrorPayload::new(
                ErrorCategory::Navigation,
                msg.to_string(),
                "Check that the URL is reachable from this host; increase [timeouts] navigation for slow sites.",
            ),
            PmsError::Driver(DriverError::Page(msg)) => ErrorPayload::new(
                ErrorCategory::Engine,
                msg.to_string(),
                "Rerun with --debug to see page-level browser messages.",
            ),
            PmsError::InvalidRequest(msg) => ErrorPayload::new(
                ErrorCategory::Request,
                msg.to_string(),
                "Use /GET?url=<URL>[&page_image=<path>][&get_computed_styles=1].",
            ),
            PmsError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("timeout") || lower.contains("quiet_period") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Durations use humantime notation and must be positive (e.g., quiet_period = \"500ms\", idle = \"50s\").",
                    )
                } else if lower.contains("viewport") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Use a positive WIDTHxHEIGHT viewport (e.g., 1280x847).",
                    )
                } else if lower.contains("failed to read config") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check the --config path and TOML syntax.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check flags/paths (e.g., serve <PORT> <CHROME_PATH> <USER_DATA_DIR>).",
                    )
                }
            }
            PmsError::Server(msg) => ErrorPayload::new(
                ErrorCategory::Server,
                msg.to_string(),
                "Check that the port is free and the host address is local to this machine.",
            ),
            PmsError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --debug; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, PmsError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Io,
    Request,
    Navigation,
    Engine,
    Server,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_payload_mentions_chrome_path() {
        let err = PmsError::Driver(DriverError::Launch("No such file or directory".into()));
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Engine);
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.contains("--chrome-path"),
            "expected chrome path remediation, got: {remediation}"
        );
    }

    #[test]
    fn config_payload_uses_duration_hint_for_timeouts() {
        let err = PmsError::config("timeouts.ceiling must be greater than zero");
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("humantime"),
            "expected duration remediation, got: {remediation}"
        );
    }

    #[test]
    fn config_payload_uses_default_remediation_for_other_messages() {
        let err = PmsError::config("Some other config issue");
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(remediation.contains("Check flags/paths"));
    }

    #[test]
    fn only_channel_and_launch_failures_are_fatal() {
        assert!(PmsError::Driver(DriverError::Channel("ws closed".into())).is_fatal());
        assert!(PmsError::Driver(DriverError::Launch("missing".into())).is_fatal());
        assert!(!PmsError::Driver(DriverError::Page("eval".into())).is_fatal());
        assert!(!PmsError::Driver(DriverError::Navigation("dns".into())).is_fatal());
        assert!(!PmsError::config("x").is_fatal());
    }

    #[test]
    fn payload_serializes_camel_case_and_skips_missing_remediation() {
        let payload = ErrorPayload {
            category: ErrorCategory::Navigation,
            message: "net::ERR_NAME_NOT_RESOLVED".into(),
            remediation: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(
            json,
            r#"{"category":"navigation","message":"net::ERR_NAME_NOT_RESOLVED"}"#
        );
    }
}
