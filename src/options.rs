//! Connection options that can be applied in one call.
//!
//! ```ignore
//! let options = ConnectionOptions::from_json(r#"{
//!     "product_id": "pr-12345678",
//!     "device_id": "de-abcdefgh",
//!     "server_key": "sk-..."
//! }"#)?;
//! connection.set_options(&options)?;
//! ```

use crate::engine::ConnectionOption;
use crate::status::Result;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_jwt_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl ConnectionOptions {
    /// Parses options from JSON. Unknown keys are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The individual settings, in the order they are applied.
    pub(crate) fn to_settings(&self) -> Vec<ConnectionOption> {
        let fields: [(Option<&String>, fn(String) -> ConnectionOption); 8] = [
            (self.product_id.as_ref(), ConnectionOption::ProductId),
            (self.device_id.as_ref(), ConnectionOption::DeviceId),
            (self.application_name.as_ref(), ConnectionOption::ApplicationName),
            (self.application_version.as_ref(), ConnectionOption::ApplicationVersion),
            (self.server_url.as_ref(), ConnectionOption::ServerUrl),
            (self.server_key.as_ref(), ConnectionOption::ServerKey),
            (self.server_jwt_token.as_ref(), ConnectionOption::ServerJwtToken),
            (self.private_key.as_ref(), ConnectionOption::PrivateKey),
        ];

        fields
            .into_iter()
            .filter_map(|(value, make)| value.map(|value| make(value.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_options() {
        let options =
            ConnectionOptions::from_json(r#"{"product_id":"pr-1","device_id":"de-1"}"#).unwrap();

        assert_eq!(
            options.to_settings(),
            vec![
                ConnectionOption::ProductId("pr-1".into()),
                ConnectionOption::DeviceId("de-1".into()),
            ]
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = ConnectionOptions::from_json(r#"{"productId":"pr-1"}"#).unwrap_err();
        assert!(matches!(err, crate::Error::Options(_)));
    }

    #[test]
    fn json_skips_unset_fields() {
        let options = ConnectionOptions {
            server_url: Some("https://example.test".into()),
            ..Default::default()
        };

        assert_eq!(
            options.to_json().unwrap(),
            r#"{"server_url":"https://example.test"}"#
        );
    }
}
