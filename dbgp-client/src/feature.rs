// Feature negotiation commands
//
// feature_get / feature_set

use crate::commands::feature_commands;
use crate::protocol::DbgpResult;
use crate::session::DbgpSession;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub name: String,
    pub supported: bool,
    pub value: String,
}

impl DbgpSession {
    /// Query an engine feature (feature_get command)
    pub async fn feature_get(&self, name: &str) -> DbgpResult<FeatureValue> {
        let request = self
            .create_request(feature_commands::FEATURE_GET)
            .with_option("-n", name);

        let response = self.communicate(request).await?;

        Ok(FeatureValue {
            name: response.attr("feature_name").unwrap_or(name).to_string(),
            supported: response.root.attr_flag("supported"),
            value: response.root.text.trim().to_string(),
        })
    }

    /// Change an engine feature (feature_set command). Returns the engine's success flag.
    pub async fn feature_set(&self, name: &str, value: &str) -> DbgpResult<bool> {
        let request = self
            .create_request(feature_commands::FEATURE_SET)
            .with_option("-n", name)
            .with_option("-v", value);

        let response = self.communicate(request).await?;
        Ok(response.is_success())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::features;
    use crate::config::DbgpConfig;
    use crate::testing::{response_xml, session_pair};

    #[tokio::test]
    async fn test_feature_get_and_set() {
        let (session, engine) = session_pair(DbgpConfig::default());
        let _engine = engine.serve(|request| {
            let xml = match (request.command(), request.option("-n")) {
                ("feature_get", Some("language_name")) => response_xml(
                    request,
                    r#"feature_name="language_name" supported="1""#,
                    "<![CDATA[Python]]>",
                ),
                ("feature_get", _) => response_xml(request, r#"supported="0""#, ""),
                ("feature_set", Some("max_depth")) => response_xml(request, r#"success="1""#, ""),
                _ => response_xml(request, r#"success="0""#, ""),
            };
            Some(xml)
        });

        let language = session.feature_get(features::LANGUAGE_NAME).await.unwrap();
        assert!(language.supported);
        assert_eq!(language.value, "Python");

        let unknown = session.feature_get("bogus").await.unwrap();
        assert!(!unknown.supported);
        assert_eq!(unknown.name, "bogus");

        assert!(session.feature_set(features::MAX_DEPTH, "2").await.unwrap());
        assert!(!session.feature_set(features::ENCODING, "ascii").await.unwrap());
    }
}
