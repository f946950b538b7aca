// Owned XML element tree for DBGP payloads
//
// roxmltree documents borrow their source text, so packets keep an owned copy
// of the tree that can move across tasks.

use crate::protocol::{DbgpError, DbgpResult};
use base64::Engine;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Concatenated direct text and CDATA content.
    pub text: String,
}

impl XmlElement {
    /// Parse a payload and return its root element
    pub fn parse(xml: &str) -> DbgpResult<Self> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| DbgpError::Protocol(format!("Malformed XML: {}", e)))?;
        Ok(Self::from_node(doc.root_element()))
    }

    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let mut element = XmlElement {
            name: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            children: Vec::new(),
            text: String::new(),
        };

        for child in node.children() {
            if child.is_element() {
                element.children.push(Self::from_node(child));
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    element.text.push_str(text);
                }
            }
        }

        element
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute that must be present
    pub fn required_attr(&self, name: &str) -> DbgpResult<&str> {
        self.attr(name).ok_or_else(|| {
            DbgpError::Protocol(format!("<{}> is missing attribute '{}'", self.name, name))
        })
    }

    /// Attribute parsed into a number (or any `FromStr` type)
    pub fn attr_parsed<T: FromStr>(&self, name: &str) -> DbgpResult<Option<T>> {
        match self.attr(name) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                DbgpError::Protocol(format!(
                    "<{}> attribute '{}' has invalid value '{}'",
                    self.name, name, raw
                ))
            }),
        }
    }

    /// DBGP booleans are encoded as "0"/"1"
    pub fn attr_flag(&self, name: &str) -> bool {
        matches!(self.attr(name), Some("1") | Some("true"))
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text content decoded according to the element's `encoding` attribute
    pub fn decoded_text(&self) -> DbgpResult<Vec<u8>> {
        match self.attr("encoding") {
            Some("base64") => decode_base64(&self.text),
            Some("none") | None => Ok(self.text.as_bytes().to_vec()),
            Some(other) => Err(DbgpError::Protocol(format!(
                "Unsupported encoding '{}' on <{}>",
                other, self.name
            ))),
        }
    }
}

pub fn decode_base64(text: &str) -> DbgpResult<Vec<u8>> {
    // Engines may wrap long base64 payloads
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| DbgpError::Protocol(format!("Invalid base64 payload: {}", e)))
}

pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}
