// WebDAV client: transport, content negotiation, progress transfers and the client facade

pub mod client;
pub mod common;
pub mod content;
pub mod progress;
pub mod transport;

// Re-export main types for convenience
pub use client::WebDAVClient;
pub use common::{build_user_agent, Depth};
pub use content::{ContentNegotiator, DecodedBody, TypeParser};
pub use progress::{ProgressStream, UPLOAD_CHUNK_SIZE};
pub use transport::Transport;
