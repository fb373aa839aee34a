use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use std::ops::Deref;
use url::Url;

use crate::errors::{Result, WebDAVError};
use crate::services::webdav::{DecodedBody, ProgressStream, WebDAVClient};
use crate::webdav_xml_parser::XmlNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Collection,
    File,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Collection => "collection",
            ResourceType::File => "file",
        }
    }
}

/// Fields and operations shared by collections and members.
///
/// A snapshot of the server state at the time it was fetched; nothing here
/// changes after construction. Operations go back to the client and return
/// fresh values.
#[derive(Debug, Clone)]
pub struct Resource<'c> {
    href: Url,
    prop: XmlNode,
    client: &'c WebDAVClient,
}

impl<'c> Resource<'c> {
    /// Absolute address of the resource
    pub fn href(&self) -> &Url {
        &self.href
    }

    /// The raw `prop` element this resource was built from
    pub fn prop(&self) -> &XmlNode {
        &self.prop
    }

    fn prop_text(&self, name: &str) -> Option<String> {
        self.prop.select(name).map(|node| node.text())
    }

    pub fn display_name(&self) -> Option<String> {
        self.prop_text("displayname").map(|name| percent_decode(&name))
    }

    pub fn kind(&self) -> ResourceType {
        if self.prop.select("resourcetype collection").is_some() {
            ResourceType::Collection
        } else {
            ResourceType::File
        }
    }

    pub fn creation_date(&self) -> Option<DateTime<FixedOffset>> {
        self.prop_text("creationdate").and_then(|d| parse_date(&d))
    }

    pub fn last_modified(&self) -> Option<DateTime<FixedOffset>> {
        self.prop_text("getlastmodified").and_then(|d| parse_date(&d))
    }

    pub fn etag(&self) -> Option<String> {
        self.prop_text("getetag")
    }

    /// Last path segment of the address, percent-decoded
    pub fn name(&self) -> String {
        let path = self.href.path().trim_end_matches('/');
        let segment = path.rsplit('/').next().unwrap_or("");
        percent_decode(segment)
    }

    fn parent_url(&self) -> Result<Url> {
        let parent = if self.href.path().ends_with('/') {
            self.href.join("..")?
        } else {
            self.href.join(".")?
        };
        Ok(parent)
    }

    /// Inspects the collection containing this resource
    pub async fn get_parent(&self) -> Result<Entity<'c>> {
        let parent = self.parent_url()?;
        self.client.inspect(parent.as_str()).await
    }

    /// Moves the resource and returns it as found at its new address.
    ///
    /// A relative `target` is resolved against this resource's address.
    pub async fn move_to(&self, target: &str) -> Result<Entity<'c>> {
        let destination = self.href.join(target)?;
        self.client
            .move_to(self.href.as_str(), destination.as_str())
            .await?;
        self.client.inspect(destination.as_str()).await
    }

    /// Renames the resource within its parent collection
    pub async fn rename(&self, new_name: &str) -> Result<Entity<'c>> {
        let encoded = urlencoding::encode(new_name);
        let target = match self.kind() {
            ResourceType::Collection => format!("../{}/", encoded),
            ResourceType::File => encoded.into_owned(),
        };
        self.move_to(&target).await
    }

    pub async fn delete(&self) -> Result<()> {
        self.client.delete(self.href.as_str()).await?;
        Ok(())
    }

    /// Fetches the current server state of this address as a new entity
    pub async fn reload(&self) -> Result<Entity<'c>> {
        self.client.inspect(self.href.as_str()).await
    }

    fn child_href(&self, name: &str) -> Result<Url> {
        Ok(self.href.join(&urlencoding::encode(name))?)
    }
}

/// A resource that contains other resources
#[derive(Debug, Clone)]
pub struct Collection<'c> {
    resource: Resource<'c>,
}

impl<'c> Collection<'c> {
    pub async fn list(&self) -> Result<Vec<Entity<'c>>> {
        self.client.list(self.href.as_str()).await
    }

    /// Creates or replaces the member `name` and returns it
    pub async fn upload(&self, name: &str, data: impl Into<Bytes>) -> Result<Entity<'c>> {
        let href = self.child_href(name)?;
        self.client.put(href.as_str(), data).await?;
        self.client.inspect(href.as_str()).await
    }

    pub fn upload_with_progress(&self, name: &str, data: impl Into<Bytes>) -> Result<ProgressStream> {
        let href = self.child_href(name)?;
        self.client.put_progress(href.as_str(), data)
    }

    /// Creates the child collection `name` and returns it
    pub async fn mkdir(&self, name: &str) -> Result<Entity<'c>> {
        let href = self.href.join(&format!("{}/", urlencoding::encode(name)))?;
        self.client.mkdir(href.as_str()).await?;
        self.client.inspect(href.as_str()).await
    }
}

impl<'c> Deref for Collection<'c> {
    type Target = Resource<'c>;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

/// A resource with content
#[derive(Debug, Clone)]
pub struct Member<'c> {
    resource: Resource<'c>,
}

impl<'c> Member<'c> {
    pub fn content_length(&self) -> Option<u64> {
        self.prop_text("getcontentlength")
            .and_then(|len| len.trim().parse().ok())
    }

    pub fn content_type(&self) -> Option<String> {
        self.prop_text("getcontenttype")
    }

    pub async fn download(&self) -> Result<DecodedBody> {
        self.client.get(self.href.as_str()).await
    }

    pub fn download_with_progress(&self) -> Result<ProgressStream> {
        self.client.get_progress(self.href.as_str())
    }

    /// Replaces the content and returns the updated member
    pub async fn update(&self, data: impl Into<Bytes>) -> Result<Entity<'c>> {
        self.client.put(self.href.as_str(), data).await?;
        self.client.inspect(self.href.as_str()).await
    }

    pub fn update_with_progress(&self, data: impl Into<Bytes>) -> Result<ProgressStream> {
        self.client.put_progress(self.href.as_str(), data)
    }
}

impl<'c> Deref for Member<'c> {
    type Target = Resource<'c>;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

/// A resource from a multi-status response, classified once at construction
#[derive(Debug, Clone)]
pub enum Entity<'c> {
    Collection(Collection<'c>),
    Member(Member<'c>),
}

impl<'c> Entity<'c> {
    /// Builds an entity from one `<response>` element.
    ///
    /// `base` is the address the `href` is resolved against. Collections
    /// always get a trailing `/` so child addresses resolve below them.
    pub fn from_response(client: &'c WebDAVClient, base: &Url, response: &XmlNode) -> Result<Self> {
        let href = response
            .child("href")
            .or_else(|| response.select("href"))
            .ok_or(WebDAVError::MissingElement("href"))?
            .text();
        let prop = successful_prop(response).ok_or(WebDAVError::MissingElement("prop"))?;

        let mut href = base.join(href.trim())?;
        let is_collection = prop.select("resourcetype collection").is_some();
        if is_collection && !href.path().ends_with('/') {
            let path = format!("{}/", href.path());
            href.set_path(&path);
        }

        let resource = Resource {
            href,
            prop: prop.clone(),
            client,
        };

        Ok(if is_collection {
            Entity::Collection(Collection { resource })
        } else {
            Entity::Member(Member { resource })
        })
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Entity::Collection(_))
    }

    pub fn as_collection(&self) -> Option<&Collection<'c>> {
        match self {
            Entity::Collection(c) => Some(c),
            Entity::Member(_) => None,
        }
    }

    pub fn as_member(&self) -> Option<&Member<'c>> {
        match self {
            Entity::Member(m) => Some(m),
            Entity::Collection(_) => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection<'c>> {
        match self {
            Entity::Collection(c) => Some(c),
            Entity::Member(_) => None,
        }
    }

    pub fn into_member(self) -> Option<Member<'c>> {
        match self {
            Entity::Member(m) => Some(m),
            Entity::Collection(_) => None,
        }
    }
}

impl<'c> Deref for Entity<'c> {
    type Target = Resource<'c>;

    fn deref(&self) -> &Self::Target {
        match self {
            Entity::Collection(c) => &c.resource,
            Entity::Member(m) => &m.resource,
        }
    }
}

/// The `prop` of the `propstat` reporting success, or the first one present
fn successful_prop(response: &XmlNode) -> Option<&XmlNode> {
    response
        .select_all("propstat")
        .into_iter()
        .find(|propstat| {
            propstat
                .child("status")
                .map(|status| status.text().contains(" 200"))
                .unwrap_or(false)
        })
        .and_then(|propstat| propstat.child("prop"))
        .or_else(|| response.select("prop"))
}

fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// WebDAV servers use RFC 3339 for `creationdate` and HTTP dates for `getlastmodified`,
/// but not consistently
fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .ok()
}
