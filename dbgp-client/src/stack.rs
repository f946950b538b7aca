// Stack inspection commands

use crate::commands::stack_commands;
use crate::protocol::{DbgpError, DbgpResult};
use crate::session::DbgpSession;
use crate::xml::XmlElement;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One frame of a `stack_get` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackLevel {
    pub level: u32,
    /// "file" or "eval"
    pub frame_type: String,
    pub filename: String,
    pub line_number: u32,
    /// Current function/command name
    pub location: Option<String>,
    pub cmd_begin: Option<String>,
    pub cmd_end: Option<String>,
}

impl StackLevel {
    fn from_element(element: &XmlElement) -> DbgpResult<Self> {
        Ok(Self {
            level: element
                .attr_parsed("level")?
                .ok_or_else(|| DbgpError::protocol("<stack> without level"))?,
            frame_type: element.attr("type").unwrap_or("file").to_string(),
            filename: element.attr("filename").unwrap_or_default().to_string(),
            line_number: element.attr_parsed("lineno")?.unwrap_or(0),
            location: element.attr("where").map(str::to_string),
            cmd_begin: element.attr("cmdbegin").map(str::to_string),
            cmd_end: element.attr("cmdend").map(str::to_string),
        })
    }
}

impl DbgpSession {
    pub async fn stack_depth(&self) -> DbgpResult<u32> {
        let request = self.create_request(stack_commands::STACK_DEPTH);
        let response = self.communicate(request).await?;
        response
            .root
            .attr_parsed("depth")?
            .ok_or_else(|| DbgpError::protocol("stack_depth response without depth"))
    }

    /// Frames at `depth`, or the whole stack when `None`
    pub async fn stack_get(&self, depth: Option<u32>) -> DbgpResult<Vec<StackLevel>> {
        let request = self
            .create_request(stack_commands::STACK_GET)
            .with_optional("-d", depth);

        let response = self.communicate(request).await?;

        let mut frames = Vec::new();
        for element in response.root.children_named("stack") {
            match StackLevel::from_element(element) {
                Ok(frame) => frames.push(frame),
                Err(e) => warn!("[session {}] Skipping stack frame: {}", self.id(), e),
            }
        }
        frames.sort_by_key(|f| f.level);
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbgpConfig;
    use crate::testing::{response_xml, session_pair};

    #[tokio::test]
    async fn test_stack_depth_and_frames() {
        let (session, engine) = session_pair(DbgpConfig::default());
        let _engine = engine.serve(|request| {
            let xml = match request.command() {
                "stack_depth" => response_xml(request, r#"depth="2""#, ""),
                _ => response_xml(
                    request,
                    "",
                    r#"<stack level="1" type="file" filename="file:///lib.tcl" lineno="8" where="helper"/>
                       <stack level="0" type="file" filename="file:///main.tcl" lineno="21" where="main" cmdbegin="21:0" cmdend="21:12"/>
                       <stack type="file"/>"#,
                ),
            };
            Some(xml)
        });

        assert_eq!(session.stack_depth().await.unwrap(), 2);

        let frames = session.stack_get(None).await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].level, 0);
        assert_eq!(frames[0].filename, "file:///main.tcl");
        assert_eq!(frames[0].line_number, 21);
        assert_eq!(frames[0].cmd_begin.as_deref(), Some("21:0"));
        assert_eq!(frames[1].location.as_deref(), Some("helper"));
    }

    #[tokio::test]
    async fn test_stack_get_passes_depth() {
        let (session, mut engine) = session_pair(DbgpConfig::default());
        let session = std::sync::Arc::new(session);

        let call = {
            let session = session.clone();
            tokio::spawn(async move { session.stack_get(Some(1)).await })
        };
        let request = engine.next_request().await;
        assert_eq!(request.option("-d"), Some("1"));
        engine.send_xml(&response_xml(&request, "", "")).await;
        assert!(call.await.unwrap().unwrap().is_empty());
    }
}
