// Spawnpoint commands
//
// spawnpoint_set / get / list / update / remove. A spawnpoint marks a location
// where a newly spawned execution context should stop.

use crate::commands::spawnpoint_commands;
use crate::packet::ResponsePacket;
use crate::protocol::DbgpResult;
use crate::session::DbgpSession;
use crate::types::{parse_state, state_str};
use crate::xml::XmlElement;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spawnpoint {
    /// Engine-assigned id
    pub id: String,
    pub filename: String,
    pub line_number: u32,
    pub enabled: bool,
}

impl Spawnpoint {
    /// Build from a `<spawnpoint>` element; `None` when a required attribute is missing
    fn from_element(element: &XmlElement) -> Option<Self> {
        let Some(id) = element.attr("id") else {
            warn!("Skipping <spawnpoint> without id");
            return None;
        };

        let line_number = match element.attr_parsed::<u32>("lineno") {
            Ok(line) => line.unwrap_or(0),
            Err(e) => {
                warn!("Skipping spawnpoint {}: {}", id, e);
                return None;
            }
        };

        Some(Self {
            id: id.to_string(),
            filename: element.attr("filename").unwrap_or_default().to_string(),
            line_number,
            enabled: parse_state(element.attr("state")),
        })
    }
}

fn parse_spawnpoints(response: &ResponsePacket) -> Vec<Spawnpoint> {
    response
        .root
        .children_named("spawnpoint")
        .filter_map(Spawnpoint::from_element)
        .collect()
}

impl DbgpSession {
    /// Set a spawnpoint (spawnpoint_set command)
    pub async fn set_spawnpoint(&self, uri: &str, line: u32, enabled: bool) -> DbgpResult<Spawnpoint> {
        self.ensure_multiple_sessions().await;

        let request = self
            .create_request(spawnpoint_commands::SET)
            .with_option("-f", uri)
            .with_option("-n", line)
            .with_option("-s", state_str(enabled));

        let response = self.communicate(request).await?;
        let id = response.root.required_attr("id")?.to_string();
        let enabled = response.attr("state").map_or(enabled, |s| parse_state(Some(s)));

        Ok(Spawnpoint {
            id,
            filename: uri.to_string(),
            line_number: line,
            enabled,
        })
    }

    /// Get one spawnpoint by id (spawnpoint_get command)
    pub async fn get_spawnpoint(&self, id: &str) -> DbgpResult<Option<Spawnpoint>> {
        self.ensure_multiple_sessions().await;

        let request = self
            .create_request(spawnpoint_commands::GET)
            .with_option("-d", id);

        let response = self.communicate(request).await?;
        Ok(parse_spawnpoints(&response).into_iter().next())
    }

    /// List all spawnpoints (spawnpoint_list command)
    pub async fn list_spawnpoints(&self) -> DbgpResult<Vec<Spawnpoint>> {
        self.ensure_multiple_sessions().await;

        let request = self.create_request(spawnpoint_commands::LIST);
        let response = self.communicate(request).await?;
        Ok(parse_spawnpoints(&response))
    }

    /// Change a spawnpoint's state and/or line (spawnpoint_update command)
    pub async fn update_spawnpoint(
        &self,
        id: &str,
        enabled: Option<bool>,
        line: Option<u32>,
    ) -> DbgpResult<()> {
        self.ensure_multiple_sessions().await;

        let request = self
            .create_request(spawnpoint_commands::UPDATE)
            .with_option("-d", id)
            .with_optional("-s", enabled.map(state_str))
            .with_optional("-n", line);

        self.communicate(request).await?;
        Ok(())
    }

    /// Remove a spawnpoint (spawnpoint_remove command)
    pub async fn remove_spawnpoint(&self, id: &str) -> DbgpResult<()> {
        self.ensure_multiple_sessions().await;

        let request = self
            .create_request(spawnpoint_commands::REMOVE)
            .with_option("-d", id);

        self.communicate(request).await?;
        Ok(())
    }
}
