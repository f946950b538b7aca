// Context and property inspection commands
//
// context_names / context_get / property_get / property_set / property_value / eval

use crate::commands::{context_commands, property_commands};
use crate::packet::ResponsePacket;
use crate::protocol::{DbgpError, DbgpResult};
use crate::session::DbgpSession;
use crate::xml::{encode_base64, XmlElement};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A variable context (locals, globals...) reported by `context_names`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub id: u32,
    pub name: String,
}

/// A variable and, when the engine sent them, its children
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub fullname: Option<String>,
    pub property_type: Option<String>,
    pub classname: Option<String>,
    pub constant: bool,
    pub has_children: bool,
    pub num_children: Option<u32>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub key: Option<String>,
    pub address: Option<String>,
    pub encoding: Option<String>,
    /// Decoded value text
    pub value: Option<String>,
    pub children: Vec<Property>,
}

impl Property {
    /// Build from a `<property>` element. Name, fullname and value may be given
    /// as attributes/text or as child elements with their own encoding.
    pub fn from_element(element: &XmlElement) -> DbgpResult<Self> {
        let name = match element.child("name") {
            Some(child) => decode_text(child)?,
            None => element.attr("name").unwrap_or_default().to_string(),
        };
        let fullname = match element.child("fullname") {
            Some(child) => Some(decode_text(child)?),
            None => element.attr("fullname").map(str::to_string),
        };

        let children = element
            .children_named("property")
            .map(Property::from_element)
            .collect::<DbgpResult<Vec<_>>>()?;

        let value = match element.child("value") {
            Some(child) => Some(decode_text(child)?),
            None if element.text.trim().is_empty() => None,
            None => Some(decode_text(element)?),
        };

        Ok(Self {
            name,
            fullname,
            property_type: element.attr("type").map(str::to_string),
            classname: element.attr("classname").map(str::to_string),
            constant: element.attr_flag("constant"),
            has_children: element.attr_flag("children") || !children.is_empty(),
            num_children: element.attr_parsed("numchildren")?,
            page: element.attr_parsed("page")?,
            page_size: element.attr_parsed("pagesize")?,
            key: element.attr("key").map(str::to_string),
            address: element.attr("address").map(str::to_string),
            encoding: element.attr("encoding").map(str::to_string),
            value,
            children,
        })
    }

    /// Depth-first search by fullname
    pub fn find(&self, fullname: &str) -> Option<&Property> {
        if self.fullname.as_deref() == Some(fullname) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(fullname))
    }
}

fn decode_text(element: &XmlElement) -> DbgpResult<String> {
    let bytes = element.decoded_text()?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn first_property(response: &ResponsePacket) -> DbgpResult<Property> {
    let element = response.root.child("property").ok_or_else(|| {
        DbgpError::Protocol(format!("{} response without <property>", response.command))
    })?;
    Property::from_element(element)
}

impl DbgpSession {
    /// Contexts available at `depth` (context_names command)
    pub async fn context_names(&self, depth: Option<u32>) -> DbgpResult<Vec<ContextInfo>> {
        let request = self
            .create_request(context_commands::CONTEXT_NAMES)
            .with_optional("-d", depth);

        let response = self.communicate(request).await?;

        let mut contexts = Vec::new();
        for element in response.root.children_named("context") {
            let (Some(id), Some(name)) = (element.attr_parsed::<u32>("id").ok().flatten(), element.attr("name")) else {
                warn!("[session {}] Skipping malformed <context>", self.id());
                continue;
            };
            contexts.push(ContextInfo {
                id,
                name: name.to_string(),
            });
        }
        Ok(contexts)
    }

    /// Variables of one context (context_get command)
    pub async fn context_get(&self, depth: Option<u32>, context_id: Option<u32>) -> DbgpResult<Vec<Property>> {
        let request = self
            .create_request(context_commands::CONTEXT_GET)
            .with_optional("-d", depth)
            .with_optional("-c", context_id);

        let response = self.communicate(request).await?;

        let mut properties = Vec::new();
        for element in response.root.children_named("property") {
            match Property::from_element(element) {
                Ok(property) => properties.push(property),
                Err(e) => warn!("[session {}] Skipping property: {}", self.id(), e),
            }
        }
        Ok(properties)
    }

    /// property_get command
    pub async fn property_get(
        &self,
        fullname: &str,
        depth: Option<u32>,
        context_id: Option<u32>,
    ) -> DbgpResult<Property> {
        let request = self
            .create_request(property_commands::PROPERTY_GET)
            .with_option("-n", fullname)
            .with_optional("-d", depth)
            .with_optional("-c", context_id);

        let response = self.communicate(request).await?;
        first_property(&response)
    }

    /// Assign a new value; the engine evaluates `value` in the debuggee's language
    pub async fn property_set(
        &self,
        fullname: &str,
        value: &str,
        depth: Option<u32>,
        context_id: Option<u32>,
    ) -> DbgpResult<bool> {
        let encoded = encode_base64(value.as_bytes());
        let request = self
            .create_request(property_commands::PROPERTY_SET)
            .with_option("-n", fullname)
            .with_optional("-d", depth)
            .with_optional("-c", context_id)
            .with_option("-l", encoded.len())
            .with_argument(encoded);

        let response = self.communicate(request).await?;
        Ok(response.is_success())
    }

    /// Full value of a property, without its children (property_value command)
    pub async fn property_value(
        &self,
        fullname: &str,
        depth: Option<u32>,
        context_id: Option<u32>,
    ) -> DbgpResult<String> {
        let request = self
            .create_request(property_commands::PROPERTY_VALUE)
            .with_option("-n", fullname)
            .with_optional("-d", depth)
            .with_optional("-c", context_id);

        let response = self.communicate(request).await?;
        decode_text(&response.root)
    }

    /// Evaluate an expression in the current frame (eval command)
    pub async fn eval(&self, expression: &str) -> DbgpResult<Property> {
        let encoded = encode_base64(expression.as_bytes());
        let request = self
            .create_request(property_commands::EVAL)
            .with_option("-l", encoded.len())
            .with_argument(encoded);

        let response = self.communicate(request).await?;
        first_property(&response)
    }
}
