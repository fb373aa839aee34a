use bytes::Bytes;
use std::any::Any;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::errors::{Result, WebDAVError};
use crate::webdav_xml_parser::XmlDocument;

/// A response body decoded according to its content type
#[derive(Debug, Clone)]
pub enum DecodedBody {
    /// The response had no content type; only its status is meaningful
    Status(u16),
    Text(String),
    Xml(XmlDocument),
    Html(XmlDocument),
    Json(serde_json::Value),
    /// Body that is not valid UTF-8 and has no decoder able to take raw bytes
    Binary(Bytes),
    /// Value produced by a custom type parser
    Custom(Arc<dyn Any + Send + Sync>),
}

impl DecodedBody {
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedBody::Status(_) => "status",
            DecodedBody::Text(_) => "text",
            DecodedBody::Xml(_) => "xml",
            DecodedBody::Html(_) => "html",
            DecodedBody::Json(_) => "json",
            DecodedBody::Binary(_) => "binary",
            DecodedBody::Custom(_) => "custom",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DecodedBody::Status(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedBody::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            DecodedBody::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&XmlDocument> {
        match self {
            DecodedBody::Xml(doc) | DecodedBody::Html(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            DecodedBody::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Content bytes for text, JSON and binary bodies.
    ///
    /// Text and binary bodies return exactly what the server sent. JSON is
    /// re-serialised from the parsed value, so whitespace and key order may
    /// differ from the original body.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            DecodedBody::Text(t) => Some(Bytes::from(t)),
            DecodedBody::Binary(b) => Some(b),
            DecodedBody::Json(v) => serde_json::to_vec(&v).ok().map(Bytes::from),
            _ => None,
        }
    }

    pub(crate) fn into_xml(self) -> Result<XmlDocument> {
        match self {
            DecodedBody::Xml(doc) => Ok(doc),
            other => Err(WebDAVError::UnexpectedBody {
                expected: "xml",
                found: other.kind(),
            }),
        }
    }
}

/// Decode function for one content type
pub type TypeParser = Arc<dyn Fn(Bytes) -> Result<DecodedBody> + Send + Sync>;

/// Maps response content types to decoders.
///
/// Keys are matched by substring against the `Content-Type` header, in
/// registration order, so `application/json` also matches
/// `application/json; charset=utf-8`. The first match wins.
pub struct ContentNegotiator {
    parsers: RwLock<Vec<(String, TypeParser)>>,
}

impl ContentNegotiator {
    pub fn new() -> Self {
        let negotiator = Self {
            parsers: RwLock::new(Vec::new()),
        };
        negotiator.add_type_parser("text/plain", |body: Bytes| {
            Ok(text_or_binary(body))
        });
        negotiator.add_type_parser("application/xml", decode_xml);
        negotiator.add_type_parser("text/xml", decode_xml);
        negotiator.add_type_parser("application/html", |body: Bytes| {
            Ok(DecodedBody::Html(XmlDocument::parse_html(&String::from_utf8_lossy(&body))?))
        });
        negotiator.add_type_parser("application/json", |body: Bytes| {
            Ok(DecodedBody::Json(serde_json::from_slice(&body)?))
        });
        negotiator
    }

    /// Registers a decoder, replacing any existing one for exactly this key
    /// while keeping its position in the match order.
    pub fn add_type_parser<F>(&self, content_type: &str, parser: F)
    where
        F: Fn(Bytes) -> Result<DecodedBody> + Send + Sync + 'static,
    {
        let parser: TypeParser = Arc::new(parser);
        let mut parsers = self.parsers.write().unwrap_or_else(|e| e.into_inner());
        match parsers.iter_mut().find(|(key, _)| key == content_type) {
            Some(entry) => entry.1 = parser,
            None => parsers.push((content_type.to_string(), parser)),
        }
    }

    /// Registered content type keys in match order
    pub fn registered_types(&self) -> Vec<String> {
        let parsers = self.parsers.read().unwrap_or_else(|e| e.into_inner());
        parsers.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn decode(&self, content_type: &str, body: Bytes) -> Result<DecodedBody> {
        let parser = {
            let parsers = self.parsers.read().unwrap_or_else(|e| e.into_inner());
            parsers
                .iter()
                .find(|(key, _)| content_type.contains(key.as_str()))
                .map(|(key, parser)| (key.clone(), Arc::clone(parser)))
        };

        match parser {
            Some((key, parser)) => {
                debug!("Decoding {} byte body as '{}'", body.len(), key);
                parser(body)
            }
            None => {
                debug!("No parser registered for '{}', returning body as text", content_type);
                Ok(text_or_binary(body))
            }
        }
    }
}

/// Text when the body is valid UTF-8, otherwise the untouched bytes
fn text_or_binary(body: Bytes) -> DecodedBody {
    match String::from_utf8(body.to_vec()) {
        Ok(text) => DecodedBody::Text(text),
        Err(_) => DecodedBody::Binary(body),
    }
}

/// Non-UTF-8 bodies labelled as XML are handed back as bytes rather than parsed
fn decode_xml(body: Bytes) -> Result<DecodedBody> {
    match std::str::from_utf8(&body) {
        Ok(text) => Ok(DecodedBody::Xml(XmlDocument::parse(text)?)),
        Err(_) => Ok(DecodedBody::Binary(body)),
    }
}

impl Default for ContentNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_registry_order() {
        let negotiator = ContentNegotiator::new();
        assert_eq!(
            negotiator.registered_types(),
            vec!["text/plain", "application/xml", "text/xml", "application/html", "application/json"]
        );
    }

    #[test]
    fn test_plain_text_with_charset() {
        let negotiator = ContentNegotiator::new();
        let body = negotiator
            .decode("text/plain; charset=utf-8", Bytes::from_static(b"test123"))
            .unwrap();
        assert_eq!(body.as_text(), Some("test123"));
    }

    #[test]
    fn test_json_decoding() {
        let negotiator = ContentNegotiator::new();
        let value = json!({"a": true, "b": 2, "c": "3"});
        let body = negotiator
            .decode("application/json", Bytes::from(value.to_string()))
            .unwrap();
        assert_eq!(body.as_json(), Some(&value));
    }

    #[test]
    fn test_malformed_json_propagates_parser_error() {
        let negotiator = ContentNegotiator::new();
        let err = negotiator
            .decode("application/json", Bytes::from_static(b"{not json"))
            .unwrap_err();
        assert!(matches!(err, WebDAVError::Json(_)));
    }

    #[test]
    fn test_xml_decoding() {
        let negotiator = ContentNegotiator::new();
        let body = negotiator
            .decode(
                "application/xml; charset=utf-8",
                Bytes::from_static(b"<D:multistatus xmlns:D=\"DAV:\"><D:response/></D:multistatus>"),
            )
            .unwrap();
        assert!(body.as_document().unwrap().select("response").is_some());
        assert!(body.into_xml().is_ok());
    }

    #[test]
    fn test_unmatched_type_falls_back_to_text_or_binary() {
        let negotiator = ContentNegotiator::new();
        let text = negotiator
            .decode("application/octet-stream", Bytes::from_static(b"hello"))
            .unwrap();
        assert_eq!(text.as_text(), Some("hello"));

        let binary = negotiator
            .decode("application/octet-stream", Bytes::from_static(&[0xff, 0xfe, 0x00]))
            .unwrap();
        assert_eq!(binary.into_bytes().unwrap().as_ref(), &[0xff, 0xfe, 0x00]);
    }

    #[test]
    fn test_non_utf8_text_and_xml_bodies_stay_binary() {
        let negotiator = ContentNegotiator::new();
        let raw = Bytes::from_static(&[0x00, 0x07, 0xff, 0x80, 0x41]);

        for content_type in ["text/plain; charset=utf-8", "application/xml", "text/xml"] {
            let body = negotiator.decode(content_type, raw.clone()).unwrap();
            assert_eq!(body.kind(), "binary", "content type {}", content_type);
            assert_eq!(body.into_bytes().unwrap(), raw);
        }
    }

    #[test]
    fn test_json_bytes_are_reserialised() {
        let negotiator = ContentNegotiator::new();
        let body = negotiator
            .decode("application/json", Bytes::from_static(b"{ \"a\" : 1 }"))
            .unwrap();
        assert_eq!(body.into_bytes().unwrap().as_ref(), b"{\"a\":1}");
    }

    #[test]
    fn test_registration_overwrites_in_place() {
        let negotiator = ContentNegotiator::new();
        negotiator.add_type_parser("text/plain", |body: Bytes| {
            Ok(DecodedBody::Text(format!("custom:{}", String::from_utf8_lossy(&body))))
        });
        assert_eq!(negotiator.registered_types()[0], "text/plain");
        assert_eq!(negotiator.registered_types().len(), 5);

        let body = negotiator.decode("text/plain", Bytes::from_static(b"x")).unwrap();
        assert_eq!(body.as_text(), Some("custom:x"));
    }

    #[test]
    fn test_first_match_wins_in_registration_order() {
        let negotiator = ContentNegotiator::new();
        negotiator.add_type_parser("json", |_body: Bytes| Ok(DecodedBody::Status(0)));

        let body = negotiator
            .decode("application/json", Bytes::from_static(b"[1]"))
            .unwrap();
        assert!(body.as_json().is_some());

        let body = negotiator
            .decode("application/vnd.api+json", Bytes::from_static(b"[1]"))
            .unwrap();
        assert_eq!(body.status(), Some(0));
    }

    #[test]
    fn test_custom_parser_value() {
        let negotiator = ContentNegotiator::new();
        negotiator.add_type_parser("text/csv", |body: Bytes| {
            let rows: Vec<String> = String::from_utf8_lossy(&body)
                .lines()
                .map(str::to_string)
                .collect();
            Ok(DecodedBody::Custom(Arc::new(rows)))
        });

        let body = negotiator
            .decode("text/csv; header=present", Bytes::from_static(b"a,b\nc,d"))
            .unwrap();
        let rows = body.downcast_ref::<Vec<String>>().unwrap();
        assert_eq!(rows, &vec!["a,b".to_string(), "c,d".to_string()]);
    }
}
