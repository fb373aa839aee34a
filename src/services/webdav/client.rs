use bytes::Bytes;
use reqwest::Method;
use std::fmt;
use tracing::{debug, info};
use url::Url;

use crate::config::WebDAVConfig;
use crate::errors::{Result, WebDAVError};
use crate::models::{Entity, ProgressTermination};
use crate::webdav_xml_parser::XmlDocument;

use super::common::{Depth, PROPFIND_ALLPROP_BODY};
use super::content::{ContentNegotiator, DecodedBody};
use super::progress::{progress_stream, ProgressStream};
use super::transport::Transport;

/// Client for one WebDAV server.
///
/// Entities returned by [`list`](Self::list) and [`inspect`](Self::inspect)
/// borrow the client to run their own operations, so the client outlives
/// everything it hands out.
pub struct WebDAVClient {
    config: WebDAVConfig,
    transport: Transport,
    negotiator: ContentNegotiator,
}

impl WebDAVClient {
    pub fn new(config: WebDAVConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| WebDAVError::Config(e.to_string()))?;

        let transport = Transport::new(&config)?;
        info!("WebDAV client configured for {}", transport.base_url());

        Ok(Self {
            config,
            transport,
            negotiator: ContentNegotiator::new(),
        })
    }

    /// Shorthand for a client with default settings
    pub fn connect(server_url: &str, username: &str, password: &str) -> Result<Self> {
        Self::new(WebDAVConfig::new(server_url, username, password))
    }

    pub fn config(&self) -> &WebDAVConfig {
        &self.config
    }

    /// Server URL with trailing `/`; every relative address is resolved against it
    pub fn base_url(&self) -> &Url {
        self.transport.base_url()
    }

    /// Registers a decoder for responses whose content type contains `content_type`.
    ///
    /// Replaces an existing decoder for the same key. Applies to every
    /// response received afterwards by this client.
    pub fn add_type_parser<F>(&self, content_type: &str, parser: F)
    where
        F: Fn(Bytes) -> Result<DecodedBody> + Send + Sync + 'static,
    {
        debug!("Registering type parser for '{}'", content_type);
        self.negotiator.add_type_parser(content_type, parser);
    }

    pub fn negotiator(&self) -> &ContentNegotiator {
        &self.negotiator
    }

    /// Sends an authenticated request and decodes the response body
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<DecodedBody> {
        self.transport
            .request(&self.negotiator, method, path, headers, body)
            .await
    }

    /// Sends an authenticated request and returns the undecoded response
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<reqwest::Response> {
        self.transport.send(method, path, headers, body).await
    }

    async fn propfind(&self, href: &str, depth: Depth) -> Result<XmlDocument> {
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| WebDAVError::InvalidHeader(e.to_string()))?;
        let body = self
            .request(
                method,
                href,
                &[
                    ("Depth", depth.as_header_value()),
                    ("Content-Type", "application/xml; charset=utf-8"),
                ],
                Some(Bytes::from_static(PROPFIND_ALLPROP_BODY.as_bytes())),
            )
            .await?;
        body.into_xml()
    }

    /// Lists the members of a collection. The collection itself is not included.
    pub async fn list(&self, href: &str) -> Result<Vec<Entity<'_>>> {
        let url = self.transport.resolve(href)?;
        let doc = self.propfind(url.as_str(), Depth::One).await?;

        let mut entities = Vec::new();
        // The first response describes the collection being listed
        for response in doc.select_all("multistatus response").into_iter().skip(1) {
            let entity = Entity::from_response(self, &url, response)?;
            if same_address(entity.href(), &url) {
                continue;
            }
            entities.push(entity);
        }

        debug!("📂 Listed {} entries in {}", entities.len(), url);
        Ok(entities)
    }

    /// Fetches the properties of a single resource
    pub async fn inspect(&self, href: &str) -> Result<Entity<'_>> {
        let url = self.transport.resolve(href)?;
        let doc = self.propfind(url.as_str(), Depth::Zero).await?;
        let response = doc
            .select("multistatus response")
            .ok_or(WebDAVError::MissingElement("response"))?;
        Entity::from_response(self, &url, response)
    }

    /// The collection at the configured server URL
    pub async fn get_root(&self) -> Result<Entity<'_>> {
        self.inspect("./").await
    }

    pub async fn get(&self, href: &str) -> Result<DecodedBody> {
        self.request(Method::GET, href, &[], None).await
    }

    pub async fn put(&self, href: &str, data: impl Into<Bytes>) -> Result<DecodedBody> {
        self.request(Method::PUT, href, &[], Some(data.into())).await
    }

    /// Moves `href` to `destination`, which is resolved relative to `href`
    pub async fn move_to(&self, href: &str, destination: &str) -> Result<DecodedBody> {
        let source = self.transport.resolve(href)?;
        let destination = source.join(destination)?;
        debug!("🚚 Moving {} to {}", source, destination);

        let method = Method::from_bytes(b"MOVE")
            .map_err(|e| WebDAVError::InvalidHeader(e.to_string()))?;
        self.request(
            method,
            source.as_str(),
            &[("Destination", destination.as_str())],
            None,
        )
        .await
    }

    pub async fn delete(&self, href: &str) -> Result<DecodedBody> {
        self.request(Method::DELETE, href, &[], None).await
    }

    pub async fn mkdir(&self, href: &str) -> Result<DecodedBody> {
        let method = Method::from_bytes(b"MKCOL")
            .map_err(|e| WebDAVError::InvalidHeader(e.to_string()))?;
        self.request(method, href, &[], None).await
    }

    /// GET with progress reporting, ending as configured in [`WebDAVConfig::progress_termination`]
    pub fn get_progress(&self, href: &str) -> Result<ProgressStream> {
        self.get_progress_with(href, self.config.progress_termination)
    }

    pub fn get_progress_with(
        &self,
        href: &str,
        termination: ProgressTermination,
    ) -> Result<ProgressStream> {
        self.progress(Method::GET, href, None, termination)
    }

    /// PUT with progress reporting, ending as configured in [`WebDAVConfig::progress_termination`]
    pub fn put_progress(&self, href: &str, data: impl Into<Bytes>) -> Result<ProgressStream> {
        self.put_progress_with(href, data, self.config.progress_termination)
    }

    pub fn put_progress_with(
        &self,
        href: &str,
        data: impl Into<Bytes>,
        termination: ProgressTermination,
    ) -> Result<ProgressStream> {
        self.progress(Method::PUT, href, Some(data.into()), termination)
    }

    fn progress(
        &self,
        method: Method,
        href: &str,
        body: Option<Bytes>,
        termination: ProgressTermination,
    ) -> Result<ProgressStream> {
        let url = self.transport.resolve(href)?;
        let headers = self.transport.build_headers(&[])?;
        Ok(progress_stream(
            self.transport.http_client().clone(),
            method,
            url,
            headers,
            body,
            termination,
        ))
    }
}

impl fmt::Debug for WebDAVClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDAVClient")
            .field("base_url", &self.base_url().as_str())
            .field("username", &self.config.username)
            .finish_non_exhaustive()
    }
}

/// Compares addresses ignoring a trailing `/`
fn same_address(a: &Url, b: &Url) -> bool {
    a.as_str().trim_end_matches('/') == b.as_str().trim_end_matches('/')
}
