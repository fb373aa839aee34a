//! Markup parsing for WebDAV response bodies.
//!
//! Bodies are turned into a small navigable tree of [`XmlNode`]s. Element names
//! are stored by their local name, so `<D:href>`, `<d:href>` and `<href xmlns="DAV:">`
//! are all found by querying `href`. Queries use a descendant selector syntax:
//! `"resourcetype collection"` finds a `collection` element anywhere below a
//! `resourcetype` element.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{Result, WebDAVError};

/// Elements that never have content in HTML and are usually left unclosed
const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Deepest element nesting accepted from a response body.
/// Tree traversal and drop are recursive, so this bounds stack use.
pub const MAX_NESTING_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlContent {
    Element(XmlNode),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    content: Vec<XmlContent>,
}

impl XmlNode {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            content: Vec::new(),
        }
    }

    /// Local element name, without any namespace prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements
    pub fn children(&self) -> impl Iterator<Item = &XmlNode> {
        self.content.iter().filter_map(|c| match c {
            XmlContent::Element(node) => Some(node),
            XmlContent::Text(_) => None,
        })
    }

    /// First direct child element with the given name
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children().find(|c| c.name == name)
    }

    /// Concatenated text of this element and all its descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for c in &self.content {
            match c {
                XmlContent::Text(t) => out.push_str(t),
                XmlContent::Element(node) => node.collect_text(out),
            }
        }
    }

    /// First descendant matching a whitespace separated descendant selector
    pub fn select(&self, selector: &str) -> Option<&XmlNode> {
        self.select_all(selector).into_iter().next()
    }

    /// All descendants matching a whitespace separated descendant selector, in document order
    pub fn select_all(&self, selector: &str) -> Vec<&XmlNode> {
        let parts: Vec<&str> = selector.split_whitespace().collect();
        let mut found = Vec::new();
        if !parts.is_empty() {
            self.collect_matches(&parts, &mut found);
        }
        found
    }

    fn collect_matches<'a>(&'a self, parts: &[&str], found: &mut Vec<&'a XmlNode>) {
        for child in self.children() {
            if child.name == parts[0] {
                if parts.len() == 1 {
                    if !found.iter().any(|n| std::ptr::eq(*n, child)) {
                        found.push(child);
                    }
                } else {
                    child.collect_matches(&parts[1..], found);
                }
            }
            // The first part may also match deeper down
            child.collect_matches(parts, found);
        }
    }
}

/// A parsed XML or HTML document.
///
/// The document itself is an unnamed node whose children are the top level
/// elements, so queries always search below it.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    document: XmlNode,
}

impl XmlDocument {
    /// Parses well-formed XML. Mismatched or unclosed tags are errors.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        let config = reader.config_mut();
        config.trim_text(true);
        config.check_end_names = true;
        config.expand_empty_elements = false;

        let mut builder = TreeBuilder::new(false);
        loop {
            match reader.read_event()? {
                Event::Start(ref e) => builder.open(element_from(e, false)?, false)?,
                Event::Empty(ref e) => builder.leaf(element_from(e, false)?),
                Event::End(_) => builder.close_current(),
                Event::Text(e) => {
                    let text = e.unescape()?;
                    builder.text(text.into_owned());
                }
                Event::CData(e) => builder.text(String::from_utf8_lossy(&e).into_owned()),
                Event::Eof => break,
                _ => {}
            }
        }

        if builder.depth() > 0 {
            return Err(WebDAVError::Xml("unexpected end of document: unclosed element".to_string()));
        }
        let document = builder.finish();
        if document.children().next().is_none() {
            return Err(WebDAVError::Xml("document has no root element".to_string()));
        }
        Ok(Self { document })
    }

    /// Parses HTML leniently: names are lower-cased, void elements need no
    /// closing tag and stray closing tags are ignored.
    pub fn parse_html(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        let config = reader.config_mut();
        config.trim_text(true);
        config.check_end_names = false;
        config.expand_empty_elements = false;
        config.allow_unmatched_ends = true;

        let mut builder = TreeBuilder::new(true);
        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let node = element_from(e, true)?;
                    let void = HTML_VOID_ELEMENTS.contains(&node.name.as_str());
                    builder.open(node, void)?;
                }
                Ok(Event::Empty(ref e)) => builder.leaf(element_from(e, true)?),
                Ok(Event::End(ref e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                    builder.close_named(&name);
                }
                Ok(Event::Text(e)) => {
                    // HTML entities such as &nbsp; are unknown to an XML unescaper
                    let text = match e.unescape() {
                        Ok(t) => t.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    builder.text(text);
                }
                Ok(Event::CData(e)) => builder.text(String::from_utf8_lossy(&e).into_owned()),
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self {
            document: builder.finish(),
        })
    }

    /// The first top level element
    pub fn root(&self) -> Option<&XmlNode> {
        self.document.children().next()
    }

    pub fn select(&self, selector: &str) -> Option<&XmlNode> {
        self.document.select(selector)
    }

    pub fn select_all(&self, selector: &str) -> Vec<&XmlNode> {
        self.document.select_all(selector)
    }

    pub fn text(&self) -> String {
        self.document.text()
    }
}

fn element_from(e: &BytesStart<'_>, html: bool) -> Result<XmlNode> {
    let mut name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    if html {
        name = name.to_lowercase();
    }

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(_) if html => continue,
            Err(err) => return Err(WebDAVError::Xml(err.to_string())),
        };
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }

    Ok(XmlNode::new(name, attributes))
}

/// Builds the node tree from a flat event sequence
struct TreeBuilder {
    stack: Vec<XmlNode>,
    lowercase: bool,
}

impl TreeBuilder {
    fn new(lowercase: bool) -> Self {
        Self {
            stack: vec![XmlNode::new(String::new(), Vec::new())],
            lowercase,
        }
    }

    /// Open elements below the document node
    fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    fn open(&mut self, node: XmlNode, void: bool) -> Result<()> {
        if void {
            self.leaf(node);
        } else {
            if self.depth() >= MAX_NESTING_DEPTH {
                return Err(WebDAVError::Xml(format!(
                    "nesting too deep: more than {} levels",
                    MAX_NESTING_DEPTH
                )));
            }
            self.stack.push(node);
        }
        Ok(())
    }

    fn leaf(&mut self, node: XmlNode) {
        self.append(XmlContent::Element(node));
    }

    fn text(&mut self, text: String) {
        if !text.is_empty() {
            self.append(XmlContent::Text(text));
        }
    }

    fn append(&mut self, content: XmlContent) {
        if let Some(top) = self.stack.last_mut() {
            top.content.push(content);
        }
    }

    fn close_current(&mut self) {
        if self.depth() > 0 {
            if let Some(node) = self.stack.pop() {
                self.leaf(node);
            }
        }
    }

    /// Closes up to and including the innermost open element called `name`.
    /// A closing tag with no open counterpart is dropped.
    fn close_named(&mut self, name: &str) {
        let name = if self.lowercase {
            name.to_lowercase()
        } else {
            name.to_string()
        };
        let Some(pos) = self.stack.iter().skip(1).rposition(|n| n.name == name) else {
            return;
        };
        // rposition over the skipped iterator is relative to index 1
        let target = pos + 1;
        while self.stack.len() > target {
            self.close_current();
        }
    }

    fn finish(mut self) -> XmlNode {
        while self.depth() > 0 {
            self.close_current();
        }
        self.stack.pop().unwrap_or_else(|| XmlNode::new(String::new(), Vec::new()))
    }
}
