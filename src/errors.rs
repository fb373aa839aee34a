use thiserror::Error;

/// Errors raised by the WebDAV client.
///
/// Protocol failures carry the numeric HTTP status so callers can tell an
/// "already exists" (405/409) apart from a "not found" (404). Nothing in this
/// crate retries: the first failure is the one returned.
#[derive(Debug, Error)]
pub enum WebDAVError {
    /// The server answered with a non-success status
    #[error("{status} {status_text}")]
    Protocol { status: u16, status_text: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Response body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Expected {expected} response body, got {found}")]
    UnexpectedBody {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Multi-status response is missing <{0}>")]
    MissingElement(&'static str),

    #[error("Transfer aborted")]
    Aborted,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl WebDAVError {
    pub(crate) fn protocol(status: reqwest::StatusCode) -> Self {
        WebDAVError::Protocol {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
        }
    }

    /// Protocol error for a failed response, keeping the reason phrase the
    /// server sent when it differs from the standard one
    pub(crate) fn from_response(response: &reqwest::Response) -> Self {
        let status = response.status();
        match response.extensions().get::<hyper::ext::ReasonPhrase>() {
            Some(reason) => WebDAVError::Protocol {
                status: status.as_u16(),
                status_text: String::from_utf8_lossy(reason.as_bytes()).into_owned(),
            },
            None => Self::protocol(status),
        }
    }

    /// HTTP status of a protocol failure
    pub fn status(&self) -> Option<u16> {
        match self {
            WebDAVError::Protocol { status, .. } => Some(*status),
            WebDAVError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// True for the statuses servers use to refuse creating something that already exists
    pub fn is_conflict_or_not_allowed(&self) -> bool {
        matches!(self.status(), Some(405) | Some(409))
    }
}

impl From<quick_xml::Error> for WebDAVError {
    fn from(e: quick_xml::Error) -> Self {
        WebDAVError::Xml(e.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for WebDAVError {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        WebDAVError::InvalidHeader(e.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderName> for WebDAVError {
    fn from(e: reqwest::header::InvalidHeaderName) -> Self {
        WebDAVError::InvalidHeader(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WebDAVError>;
