// DBGP inbound packets
//
// Every payload read from the engine is one of: response, notify, stream.
// The init packet is only valid as the first packet of a connection.

use crate::protocol::{error_message, DbgpError, DbgpResult};
use crate::types::StreamKind;
use crate::xml::XmlElement;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone)]
pub enum Packet {
    Response(ResponsePacket),
    Notify(NotifyPacket),
    Stream(StreamPacket),
}

impl Packet {
    /// Parse a payload and classify it by its root element
    pub fn parse(xml: &str) -> DbgpResult<Self> {
        let root = XmlElement::parse(xml)?;

        match root.name.as_str() {
            "response" => ResponsePacket::from_element(root).map(Packet::Response),
            "notify" => NotifyPacket::from_element(root).map(Packet::Notify),
            "stream" => StreamPacket::from_element(&root).map(Packet::Stream),
            "init" => Err(DbgpError::protocol("Unexpected init packet after handshake")),
            other => Err(DbgpError::Protocol(format!("Unknown packet type <{}>", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponsePacket {
    pub transaction_id: u32,
    pub command: String,
    pub root: XmlElement,
}

impl ResponsePacket {
    fn from_element(root: XmlElement) -> DbgpResult<Self> {
        let transaction_id = root
            .attr_parsed::<u32>("transaction_id")?
            .ok_or_else(|| DbgpError::protocol("Response without transaction_id"))?;
        let command = root.attr("command").unwrap_or_default().to_string();

        Ok(Self {
            transaction_id,
            command,
            root,
        })
    }

    /// The embedded `<error>` element, if the engine reported one
    pub fn error(&self) -> Option<DbgpError> {
        let error = self.root.child("error")?;

        let code = match error.attr_parsed::<i32>("code") {
            Ok(Some(code)) => code,
            Ok(None) => 999,
            Err(e) => {
                warn!("Response {} carries an unreadable error code: {}", self.transaction_id, e);
                999
            }
        };

        let message = error
            .child("message")
            .map(|m| m.text.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| error_message(code).to_string());

        Some(DbgpError::Remote { code, message })
    }

    pub fn is_error(&self) -> bool {
        self.root.child("error").is_some()
    }

    pub fn check_error(&self) -> DbgpResult<()> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.root.attr(name)
    }

    /// DBGP reports boolean command outcomes as `success="1"`
    pub fn is_success(&self) -> bool {
        self.root.attr_flag("success")
    }
}

#[derive(Debug, Clone)]
pub struct NotifyPacket {
    pub name: String,
    pub root: XmlElement,
}

impl NotifyPacket {
    fn from_element(root: XmlElement) -> DbgpResult<Self> {
        let name = root.required_attr("name")?.to_string();
        Ok(Self { name, root })
    }
}

#[derive(Debug, Clone)]
pub struct StreamPacket {
    pub kind: StreamKind,
    pub content: Bytes,
}

impl StreamPacket {
    fn from_element(root: &XmlElement) -> DbgpResult<Self> {
        let kind = root.required_attr("type")?.parse::<StreamKind>()?;
        let content = Bytes::from(root.decoded_text()?);
        Ok(Self { kind, content })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// First packet sent by an engine after it connects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitPacket {
    pub appid: Option<String>,
    pub idekey: Option<String>,
    pub session: Option<String>,
    pub thread: Option<String>,
    pub parent: Option<String>,
    pub language: Option<String>,
    pub protocol_version: Option<String>,
    pub fileuri: Option<String>,
}

impl InitPacket {
    pub fn parse(xml: &str) -> DbgpResult<Self> {
        let root = XmlElement::parse(xml)?;
        if root.name != "init" {
            return Err(DbgpError::Protocol(format!(
                "Expected init packet, got <{}>",
                root.name
            )));
        }

        let get = |name: &str| root.attr(name).map(str::to_string);
        Ok(Self {
            appid: get("appid"),
            idekey: get("idekey"),
            session: get("session"),
            thread: get("thread"),
            parent: get("parent"),
            language: get("language"),
            protocol_version: get("protocol_version"),
            fileuri: get("fileuri"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_response() {
        let packet = Packet::parse(r#"<response command="run" transaction_id="12" status="break"/>"#).unwrap();
        match packet {
            Packet::Response(r) => {
                assert_eq!(r.transaction_id, 12);
                assert_eq!(r.command, "run");
                assert!(r.check_error().is_ok());
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_response_error_element() {
        let xml = r#"<response command="breakpoint_remove" transaction_id="3"><error code="205"><message>no such breakpoint</message></error></response>"#;
        let Packet::Response(r) = Packet::parse(xml).unwrap() else {
            panic!("expected response");
        };

        assert!(r.is_error());
        match r.check_error() {
            Err(DbgpError::Remote { code, message }) => {
                assert_eq!(code, 205);
                assert_eq!(message, "no such breakpoint");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_without_message_uses_table() {
        let xml = r#"<response command="x" transaction_id="3"><error code="4"/></response>"#;
        let Packet::Response(r) = Packet::parse(xml).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(r.error().unwrap().to_string(), "DBGP error code 4: unimplemented command");
    }

    #[test]
    fn test_response_without_transaction_id_rejected() {
        assert!(Packet::parse(r#"<response command="run"/>"#).is_err());
    }

    #[test]
    fn test_classify_notify() {
        let xml = r#"<notify name="breakpoint_resolved"><breakpoint id="5"/></notify>"#;
        let Packet::Notify(n) = Packet::parse(xml).unwrap() else {
            panic!("expected notify");
        };
        assert_eq!(n.name, "breakpoint_resolved");
        assert_eq!(n.root.child("breakpoint").unwrap().attr("id"), Some("5"));
    }

    #[test]
    fn test_classify_stream() {
        let xml = r#"<stream type="stderr" encoding="base64">b29wcw==</stream>"#;
        let Packet::Stream(s) = Packet::parse(xml).unwrap() else {
            panic!("expected stream");
        };
        assert_eq!(s.kind, StreamKind::Stderr);
        assert_eq!(s.text(), "oops");
    }

    #[test]
    fn test_unknown_root_rejected() {
        assert!(Packet::parse("<bogus/>").is_err());
        assert!(Packet::parse("<init appid=\"1\"/>").is_err());
    }

    #[test]
    fn test_parse_init() {
        let xml = r#"<init appid="42" idekey="ECLIPSE" language="Python" protocol_version="1.0" fileuri="file:///a.py"/>"#;
        let init = InitPacket::parse(xml).unwrap();
        assert_eq!(init.language.as_deref(), Some("Python"));
        assert_eq!(init.fileuri.as_deref(), Some("file:///a.py"));
        assert!(init.thread.is_none());

        assert!(InitPacket::parse("<response transaction_id=\"1\"/>").is_err());
    }
}
