//! WordprocessingML names and string-level XML helpers.
//!
//! Reading goes through `roxmltree` (with byte positions); writing is plain string
//! splicing so that everything outside an edited span keeps its exact bytes.

use roxmltree::Node;

use crate::error::{DocxError, Result};

pub const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const OFFICE_REL_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const CONTENT_TYPES_NS: &str =
    "http://schemas.openxmlformats.org/package/2006/content-types";

pub const OFFICE_DOCUMENT_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const COMMENTS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
pub const COMMENTS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml";

/// True if `node` is the WordprocessingML element `w:{local}`.
pub fn is_w(node: Node, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(WML_NS)
}

/// Value of the WordprocessingML attribute `w:{local}`.
pub fn w_attr<'a>(node: Node<'a, '_>, local: &str) -> Option<&'a str> {
    node.attribute((WML_NS, local))
}

/// Concatenated character data of an element's direct text children.
pub fn element_text(node: Node) -> String {
    node.children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect()
}

pub fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(value: &str) -> String {
    escape_text(value)
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Byte offset just past the `>` closing the start tag that begins at `from`.
///
/// Quote-aware, so a `>` inside an attribute value does not end the tag.
pub fn start_tag_end(xml: &str, from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &byte) in xml.as_bytes()[from..].iter().enumerate() {
        match quote {
            Some(q) if byte == q => quote = None,
            Some(_) => {}
            None if byte == b'"' || byte == b'\'' => quote = Some(byte),
            None if byte == b'>' => return Some(from + i + 1),
            None => {}
        }
    }
    None
}

/// Parse a whole part, attributing failures to the part name.
pub fn parse_part<'input>(part: &str, xml: &'input str) -> Result<roxmltree::Document<'input>> {
    roxmltree::Document::parse(xml).map_err(|e| DocxError::xml(part, e))
}

/// Namespace context of the main document part.
///
/// Paragraph fragments cut out of the document carry prefixes (`w:`, `r:`, `w14:` ...)
/// declared on the root element. To re-read a fragment on its own it is wrapped in an
/// element re-declaring those namespaces; ranges reported by the parser are shifted back
/// by [`FragmentContext::offset`].
#[derive(Debug, Clone)]
pub struct FragmentContext {
    open: String,
}

impl FragmentContext {
    const CLOSE: &'static str = "</fragment>";

    pub fn from_root(root: Node) -> Self {
        let mut open = String::from("<fragment");
        for ns in root.namespaces() {
            match ns.name() {
                Some("xml") => {}
                Some(prefix) => {
                    open.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape_attr(ns.uri())))
                }
                None => open.push_str(&format!(" xmlns=\"{}\"", escape_attr(ns.uri()))),
            }
        }
        open.push('>');
        Self { open }
    }

    pub fn wrap(&self, fragment: &str) -> String {
        let mut wrapped =
            String::with_capacity(self.open.len() + fragment.len() + Self::CLOSE.len());
        wrapped.push_str(&self.open);
        wrapped.push_str(fragment);
        wrapped.push_str(Self::CLOSE);
        wrapped
    }

    pub fn offset(&self) -> usize {
        self.open.len()
    }
}

/// True if the element binds the `w` prefix to the WordprocessingML namespace.
///
/// Generated markup is always written with the `w:` prefix.
pub fn binds_w_prefix(root: Node) -> bool {
    root.namespaces()
        .any(|ns| ns.name() == Some("w") && ns.uri() == WML_NS)
}
