//! WebDAV client library.
//!
//! [`WebDAVClient`] issues authenticated WebDAV requests (PROPFIND, GET, PUT,
//! DELETE, MOVE, MKCOL), decodes response bodies by content type and wraps
//! PROPFIND results into [`Entity`] values: either a [`Collection`] or a
//! [`Member`]. GET and PUT are also available as progress streams that report
//! upload and download fractions while the transfer runs.
//!
//! ```no_run
//! use futures::StreamExt;
//! use readur_webdav::{WebDAVClient, WebDAVConfig};
//!
//! # async fn example() -> readur_webdav::Result<()> {
//! let client = WebDAVClient::new(WebDAVConfig::new("http://localhost:8080/dav", "user", "pass"))?;
//!
//! let root = client.get_root().await?;
//! if let Some(root) = root.as_collection() {
//!     for entity in root.list().await? {
//!         println!("{} ({})", entity.name(), entity.kind().as_str());
//!     }
//! }
//!
//! let mut transfer = client.put_progress("notes.txt", "hello")?;
//! while let Some(progress) = transfer.next().await {
//!     println!("upload {:.0}%", progress.upload * 100.0);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod webdav_xml_parser;

pub use config::WebDAVConfig;
pub use errors::{Result, WebDAVError};
pub use models::{
    Collection, Entity, Member, ProgressTermination, Resource, ResourceType, TransferHandle,
    TransferProgress,
};
pub use services::webdav::{DecodedBody, ProgressStream, WebDAVClient};
pub use webdav_xml_parser::{XmlDocument, XmlNode};
