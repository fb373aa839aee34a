/// Common utilities and shared constants for WebDAV requests

/// PROPFIND body asking for every live property the server knows about
pub const PROPFIND_ALLPROP_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
    <D:allprop/>
</D:propfind>"#;

/// Build a standardized User-Agent string for all WebDAV requests
pub fn build_user_agent() -> String {
    format!("Readur/{} (WebDAV-Client; +https://github.com/readur)",
            env!("CARGO_PKG_VERSION"))
}

/// Value of the `Depth` header for a PROPFIND
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// The resource itself
    Zero,
    /// The resource and its immediate children
    One,
}

impl Depth {
    pub fn as_header_value(&self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
        }
    }
}
