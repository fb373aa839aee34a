use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

use crate::config::WebDAVConfig;
use crate::errors::{Result, WebDAVError};

use super::content::{ContentNegotiator, DecodedBody};

/// Authenticated request execution against one server.
///
/// Relative paths are resolved against the configured base URL, the Basic
/// `Authorization` header is injected on every request and any non-success
/// status becomes a [`WebDAVError::Protocol`]. Failed requests are not retried.
pub struct Transport {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
    auth_header: OnceLock<HeaderValue>,
}

impl Transport {
    pub fn new(config: &WebDAVConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url()?,
            username: config.username.clone(),
            password: config.password.clone(),
            auth_header: OnceLock::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying HTTP client, shared with progress transfers
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// `Basic base64(username:password)`, computed once per transport.
    /// Credentials never change after construction.
    pub fn auth_header(&self) -> Result<HeaderValue> {
        if let Some(value) = self.auth_header.get() {
            return Ok(value.clone());
        }

        let credentials = STANDARD.encode(format!("{}:{}", self.username, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {}", credentials))?;
        value.set_sensitive(true);

        let _ = self.auth_header.set(value.clone());
        Ok(value)
    }

    /// Default headers overlaid with the caller's; the caller wins on every name it sets
    pub fn build_headers(&self, headers: &[(&str, &str)]) -> Result<HeaderMap> {
        let mut merged = HeaderMap::new();
        merged.insert(AUTHORIZATION, self.auth_header()?);

        let mut overrides = HeaderMap::new();
        for (name, value) in headers {
            overrides.append(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        for name in overrides.keys() {
            merged.remove(name);
        }
        for (name, value) in overrides.iter() {
            merged.append(name.clone(), value.clone());
        }

        Ok(merged)
    }

    /// Sends a request and returns the response untouched, once its status is known to be a success
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<reqwest::Response> {
        let url = self.resolve(path)?;
        let headers = self.build_headers(headers)?;

        debug!("📤 Sending HTTP {} request to: {}", method, url);
        if let Some(ref body) = body {
            debug!("   Body length: {} bytes", body.len());
        }

        let mut request = self.client.request(method.clone(), url.clone()).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(
            "📥 HTTP Response: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );

        if !status.is_success() {
            warn!("❌ {} {} failed: {}", method, url, status);
            return Err(WebDAVError::from_response(&response));
        }

        Ok(response)
    }

    /// Sends a request and decodes the body by its declared content type.
    ///
    /// Responses without a `Content-Type` header carry no body worth decoding
    /// and yield their status code instead.
    pub async fn request(
        &self,
        negotiator: &ContentNegotiator,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<DecodedBody> {
        let response = self.send(method, path, headers, body).await?;

        let content_type = match response.headers().get(CONTENT_TYPE) {
            Some(value) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            None => return Ok(DecodedBody::Status(response.status().as_u16())),
        };

        let bytes = response.bytes().await?;
        negotiator.decode(&content_type, bytes)
    }
}
