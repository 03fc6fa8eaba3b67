use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

/// Extensions that are never loaded into a page context.
const BINARY_EXTENSIONS: &[&str] = &["gif", "jpeg", "jpg", "png", "pdf"];

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Missing url query parameter. Hint: use /GET?url=<URL>.")]
    MissingUrl,
    #[error("Invalid URL '{value}': {message}. Hint: include the scheme, e.g. https://example.com.")]
    InvalidUrl { value: String, message: String },
}

/// HTTP basic-auth credentials, supplied after a 401 response.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One inbound page fetch. Built per request and dropped once answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub screenshot: Option<PathBuf>,
    pub computed_styles: bool,
    pub credentials: Option<Credentials>,
}

impl PageRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            screenshot: None,
            computed_styles: false,
            credentials: None,
        }
    }

    pub fn with_screenshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot = Some(path.into());
        self
    }

    pub fn with_computed_styles(mut self, enabled: bool) -> Self {
        self.computed_styles = enabled;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Build a request from `/GET` query parameters:
    /// `url`, `page_image`, `get_computed_styles`, `username`, `password`.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, RequestError> {
        let url = params
            .get("url")
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .ok_or(RequestError::MissingUrl)?;
        validate_url(url)?;

        let screenshot = params
            .get("page_image")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let computed_styles = params
            .get("get_computed_styles")
            .is_some_and(|value| value == "1");
        let credentials = match (params.get("username"), params.get("password")) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(Credentials::new(user.as_str(), pass.as_str()))
            }
            _ => None,
        };

        Ok(Self {
            url: url.to_string(),
            screenshot,
            computed_styles,
            credentials,
        })
    }

    pub fn wants_screenshot(&self) -> bool {
        self.screenshot.is_some()
    }

    /// The binary extension (image or PDF) of the URL path, if any.
    pub fn binary_extension(&self) -> Option<&'static str> {
        let path = Url::parse(&self.url)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| self.url.clone());
        let extension = Path::new(&path)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();
        BINARY_EXTENSIONS
            .iter()
            .copied()
            .find(|candidate| *candidate == extension)
    }
}

pub fn validate_url(value: &str) -> Result<Url, RequestError> {
    Url::parse(value).map_err(|e| RequestError::InvalidUrl {
        value: value.to_string(),
        message: e.to_string(),
    })
}

/// Compare URLs after normalization, ignoring the fragment.
pub fn same_document(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(mut a), Ok(mut b)) => {
            a.set_fragment(None);
            b.set_fragment(None);
            a == b
        }
        _ => a == b,
    }
}
