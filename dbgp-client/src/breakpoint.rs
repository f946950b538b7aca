// Breakpoint commands
//
// breakpoint_set / get / list / update / remove

use crate::commands::breakpoint_commands;
use crate::packet::ResponsePacket;
use crate::protocol::DbgpResult;
use crate::session::DbgpSession;
use crate::types::{parse_state, state_str, BreakpointType, HitCondition};
use crate::xml::{encode_base64, XmlElement};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A breakpoint as the engine reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub id: String,
    pub breakpoint_type: BreakpointType,
    pub enabled: bool,
    pub filename: Option<String>,
    pub line_number: Option<u32>,
    pub function: Option<String>,
    pub exception: Option<String>,
    pub hit_value: Option<u32>,
    pub hit_condition: Option<HitCondition>,
    pub hit_count: Option<u32>,
    pub temporary: bool,
    pub expression: Option<String>,
}

impl Breakpoint {
    fn from_element(element: &XmlElement) -> Option<Self> {
        let Some(id) = element.attr("id") else {
            warn!("Skipping <breakpoint> without id");
            return None;
        };

        let breakpoint_type = match element.attr("type").map(str::parse::<BreakpointType>) {
            Some(Ok(t)) => t,
            Some(Err(e)) => {
                warn!("Skipping breakpoint {}: {}", id, e);
                return None;
            }
            None => {
                warn!("Skipping breakpoint {} without type", id);
                return None;
            }
        };

        let expression = element
            .child("expression")
            .and_then(|e| match e.decoded_text() {
                Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                Err(err) => {
                    warn!("Breakpoint {} has an undecodable expression: {}", id, err);
                    None
                }
            });

        Some(Self {
            id: id.to_string(),
            breakpoint_type,
            enabled: parse_state(element.attr("state")),
            filename: element.attr("filename").map(str::to_string),
            line_number: element.attr_parsed("lineno").ok().flatten(),
            function: element.attr("function").map(str::to_string),
            exception: element.attr("exception").map(str::to_string),
            hit_value: element.attr_parsed("hit_value").ok().flatten(),
            hit_condition: element.attr("hit_condition").and_then(|c| c.parse().ok()),
            hit_count: element.attr_parsed("hit_count").ok().flatten(),
            temporary: element.attr_flag("temporary"),
            expression,
        })
    }
}

fn parse_breakpoints(response: &ResponsePacket) -> Vec<Breakpoint> {
    response
        .root
        .children_named("breakpoint")
        .filter_map(Breakpoint::from_element)
        .collect()
}

/// What to create with `breakpoint_set`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    pub breakpoint_type: BreakpointType,
    pub enabled: bool,
    pub filename: Option<String>,
    pub line_number: Option<u32>,
    pub function: Option<String>,
    pub exception: Option<String>,
    pub hit_value: Option<u32>,
    pub hit_condition: Option<HitCondition>,
    pub temporary: bool,
    pub expression: Option<String>,
}

impl BreakpointSpec {
    fn new(breakpoint_type: BreakpointType) -> Self {
        Self {
            breakpoint_type,
            enabled: true,
            filename: None,
            line_number: None,
            function: None,
            exception: None,
            hit_value: None,
            hit_condition: None,
            temporary: false,
            expression: None,
        }
    }

    pub fn line(uri: impl Into<String>, line: u32) -> Self {
        Self {
            filename: Some(uri.into()),
            line_number: Some(line),
            ..Self::new(BreakpointType::Line)
        }
    }

    pub fn call(function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            ..Self::new(BreakpointType::Call)
        }
    }

    pub fn function_return(function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            ..Self::new(BreakpointType::Return)
        }
    }

    pub fn exception(name: impl Into<String>) -> Self {
        Self {
            exception: Some(name.into()),
            ..Self::new(BreakpointType::Exception)
        }
    }

    /// Stops when `expression` evaluates true, optionally at a location
    pub fn conditional(expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Self::new(BreakpointType::Conditional)
        }
    }

    /// Stops when the value of `expression` changes
    pub fn watch(expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Self::new(BreakpointType::Watch)
        }
    }

    pub fn at(mut self, uri: impl Into<String>, line: u32) -> Self {
        self.filename = Some(uri.into());
        self.line_number = Some(line);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_hit(mut self, value: u32, condition: HitCondition) -> Self {
        self.hit_value = Some(value);
        self.hit_condition = Some(condition);
        self
    }

    /// Removed by the engine after the first hit
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn with_condition(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }
}

/// Fields `breakpoint_update` may change; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointUpdate {
    pub enabled: Option<bool>,
    pub line_number: Option<u32>,
    pub hit_value: Option<u32>,
    pub hit_condition: Option<HitCondition>,
}

impl DbgpSession {
    /// Set a breakpoint (breakpoint_set command)
    pub async fn set_breakpoint(&self, spec: &BreakpointSpec) -> DbgpResult<Breakpoint> {
        let mut request = self
            .create_request(breakpoint_commands::SET)
            .with_option("-t", spec.breakpoint_type)
            .with_option("-s", state_str(spec.enabled))
            .with_optional("-f", spec.filename.as_deref())
            .with_optional("-n", spec.line_number)
            .with_optional("-m", spec.function.as_deref())
            .with_optional("-x", spec.exception.as_deref())
            .with_optional("-h", spec.hit_value)
            .with_optional("-o", spec.hit_condition);
        if spec.temporary {
            request = request.with_option("-r", 1);
        }
        if let Some(expression) = &spec.expression {
            request = request.with_argument(encode_base64(expression.as_bytes()));
        }

        let response = self.communicate(request).await?;
        let id = response.root.required_attr("id")?.to_string();
        let enabled = response
            .attr("state")
            .map_or(spec.enabled, |s| parse_state(Some(s)));

        Ok(Breakpoint {
            id,
            breakpoint_type: spec.breakpoint_type,
            enabled,
            filename: spec.filename.clone(),
            line_number: spec.line_number,
            function: spec.function.clone(),
            exception: spec.exception.clone(),
            hit_value: spec.hit_value,
            hit_condition: spec.hit_condition,
            hit_count: None,
            temporary: spec.temporary,
            expression: spec.expression.clone(),
        })
    }

    /// Get one breakpoint by id (breakpoint_get command)
    pub async fn get_breakpoint(&self, id: &str) -> DbgpResult<Option<Breakpoint>> {
        let request = self
            .create_request(breakpoint_commands::GET)
            .with_option("-d", id);

        let response = self.communicate(request).await?;
        Ok(parse_breakpoints(&response).into_iter().next())
    }

    /// List all breakpoints (breakpoint_list command)
    pub async fn list_breakpoints(&self) -> DbgpResult<Vec<Breakpoint>> {
        let request = self.create_request(breakpoint_commands::LIST);
        let response = self.communicate(request).await?;
        Ok(parse_breakpoints(&response))
    }

    /// breakpoint_update command
    pub async fn update_breakpoint(&self, id: &str, update: &BreakpointUpdate) -> DbgpResult<()> {
        let request = self
            .create_request(breakpoint_commands::UPDATE)
            .with_option("-d", id)
            .with_optional("-s", update.enabled.map(state_str))
            .with_optional("-n", update.line_number)
            .with_optional("-h", update.hit_value)
            .with_optional("-o", update.hit_condition);

        self.communicate(request).await?;
        Ok(())
    }

    /// breakpoint_remove command
    pub async fn remove_breakpoint(&self, id: &str) -> DbgpResult<()> {
        let request = self
            .create_request(breakpoint_commands::REMOVE)
            .with_option("-d", id);

        self.communicate(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbgpConfig;
    use crate::testing::{response_xml, session_pair};
    use crate::xml::decode_base64;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_conditional_breakpoint() {
        let (session, mut engine) = session_pair(DbgpConfig::default());
        let session = Arc::new(session);

        let spec = BreakpointSpec::conditional("$x > 3")
            .at("file:///srv/index.php", 42)
            .with_hit(2, HitCondition::GreaterOrEqual)
            .temporary();

        let call = {
            let session = session.clone();
            let spec = spec.clone();
            tokio::spawn(async move { session.set_breakpoint(&spec).await })
        };

        let request = engine.next_request().await;
        assert_eq!(request.command(), "breakpoint_set");
        assert_eq!(request.options()[0].0, "-i");
        assert_eq!(request.option("-t"), Some("conditional"));
        assert_eq!(request.option("-s"), Some("enabled"));
        assert_eq!(request.option("-f"), Some("file:///srv/index.php"));
        assert_eq!(request.option("-n"), Some("42"));
        assert_eq!(request.option("-h"), Some("2"));
        assert_eq!(request.option("-o"), Some(">="));
        assert_eq!(request.option("-r"), Some("1"));
        assert_eq!(request.option("-m"), None);
        assert_eq!(request.arguments().len(), 1);
        assert_eq!(decode_base64(&request.arguments()[0]).unwrap(), b"$x > 3");

        engine
            .send_xml(&response_xml(&request, r#"state="enabled" id="17""#, ""))
            .await;

        let breakpoint = call.await.unwrap().unwrap();
        assert_eq!(breakpoint.id, "17");
        assert_eq!(breakpoint.breakpoint_type, BreakpointType::Conditional);
        assert_eq!(breakpoint.line_number, Some(42));
        assert!(breakpoint.temporary);
    }

    #[tokio::test]
    async fn test_list_skips_malformed_breakpoints() {
        let (session, engine) = session_pair(DbgpConfig::default());
        let _engine = engine.serve(|request| {
            Some(response_xml(
                request,
                "",
                r#"<breakpoint id="1" type="line" state="enabled" filename="file:///a.py" lineno="3" hit_count="2"/>
                   <breakpoint type="line" filename="file:///a.py" lineno="4"/>
                   <breakpoint id="3" type="teleport"/>
                   <breakpoint id="4" type="watch" state="disabled"><expression encoding="base64">Y291bnQ=</expression></breakpoint>"#,
            ))
        });

        let breakpoints = session.list_breakpoints().await.unwrap();
        assert_eq!(breakpoints.len(), 2);

        assert_eq!(breakpoints[0].id, "1");
        assert_eq!(breakpoints[0].line_number, Some(3));
        assert_eq!(breakpoints[0].hit_count, Some(2));
        assert!(breakpoints[0].enabled);

        assert_eq!(breakpoints[1].breakpoint_type, BreakpointType::Watch);
        assert_eq!(breakpoints[1].expression.as_deref(), Some("count"));
        assert!(!breakpoints[1].enabled);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let (session, mut engine) = session_pair(DbgpConfig::default());
        let session = Arc::new(session);

        let call = {
            let session = session.clone();
            tokio::spawn(async move {
                let update = BreakpointUpdate {
                    enabled: Some(false),
                    hit_value: Some(5),
                    hit_condition: Some(HitCondition::Multiple),
                    ..Default::default()
                };
                session.update_breakpoint("17", &update).await
            })
        };
        let request = engine.next_request().await;
        assert_eq!(request.command(), "breakpoint_update");
        assert_eq!(request.option("-d"), Some("17"));
        assert_eq!(request.option("-s"), Some("disabled"));
        assert_eq!(request.option("-o"), Some("%"));
        assert_eq!(request.option("-n"), None);
        engine.send_xml(&response_xml(&request, "", "")).await;
        call.await.unwrap().unwrap();

        let call = {
            let session = session.clone();
            tokio::spawn(async move { session.remove_breakpoint("17").await })
        };
        let request = engine.next_request().await;
        assert_eq!(request.command(), "breakpoint_remove");
        engine.send_xml(&response_xml(&request, "", "")).await;
        call.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_breakpoint_commands_skip_feature_negotiation() {
        let (session, mut engine) = session_pair(DbgpConfig::default());
        let session = Arc::new(session);

        let call = {
            let session = session.clone();
            tokio::spawn(async move { session.get_breakpoint("9").await })
        };
        let request = engine.next_request().await;
        assert_eq!(request.command(), "breakpoint_get");
        engine
            .send_xml(&response_xml(
                &request,
                "",
                r#"<breakpoint id="9" type="exception" exception="KeyError" state="enabled"/>"#,
            ))
            .await;

        let breakpoint = call.await.unwrap().unwrap().unwrap();
        assert_eq!(breakpoint.exception.as_deref(), Some("KeyError"));
        assert_eq!(breakpoint.filename, None);
    }
}
