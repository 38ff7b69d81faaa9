//! Minimal REST client for the Hue bridge v1 API.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::HueError;
use crate::payload::{ApiResult, BridgeConfig, Group, Light, Scene, StateBody};

/// HTTP client bound to one bridge address.
#[derive(Clone)]
pub struct HueClient {
    http: reqwest::Client,
    base: String,
}

impl HueClient {
    /// Build a client for `address` (IP or hostname, plain HTTP).
    ///
    /// # Errors
    ///
    /// Returns [`HueError::Http`] if the underlying client cannot be built.
    pub fn new(address: &str) -> Result<Self, HueError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base: format!("http://{address}/api"),
        })
    }

    fn check_results(results: &[ApiResult]) -> Result<(), HueError> {
        for result in results {
            if let Some(error) = &result.error {
                return Err(HueError::Api {
                    code: error.code,
                    description: error.description.clone(),
                });
            }
        }
        Ok(())
    }

    /// `POST /api` — create an API user; the link button must have been
    /// pressed within the last 30 seconds.
    pub async fn create_user(&self, devicetype: &str) -> Result<String, HueError> {
        let results: Vec<ApiResult> = self
            .http
            .post(&self.base)
            .json(&serde_json::json!({ "devicetype": devicetype }))
            .send()
            .await?
            .json()
            .await?;
        Self::check_results(&results)?;

        results
            .iter()
            .filter_map(|r| r.success.as_ref())
            .filter_map(|s| s.get("username"))
            .filter_map(|u| u.as_str())
            .map(ToString::to_string)
            .next()
            .ok_or_else(|| HueError::Api {
                code: -1,
                description: "no username in create-user reply".to_string(),
            })
    }

    /// `GET /api/{user}/config` — authenticated bridge configuration; also
    /// the pairing check.
    pub async fn config(&self, username: &str) -> Result<BridgeConfig, HueError> {
        let value: serde_json::Value = self
            .http
            .get(format!("{}/{username}/config", self.base))
            .send()
            .await?
            .json()
            .await?;

        // An unauthorized user gets the error array instead of the config.
        if let Ok(results) = serde_json::from_value::<Vec<ApiResult>>(value.clone()) {
            Self::check_results(&results)?;
        }
        Ok(serde_json::from_value(value)?)
    }

    /// `GET /api/{user}/lights`
    pub async fn lights(&self, username: &str) -> Result<HashMap<String, Light>, HueError> {
        Ok(self
            .http
            .get(format!("{}/{username}/lights", self.base))
            .send()
            .await?
            .json()
            .await?)
    }

    /// `GET /api/{user}/groups`
    pub async fn groups(&self, username: &str) -> Result<HashMap<String, Group>, HueError> {
        Ok(self
            .http
            .get(format!("{}/{username}/groups", self.base))
            .send()
            .await?
            .json()
            .await?)
    }

    /// `GET /api/{user}/scenes`
    pub async fn scenes(&self, username: &str) -> Result<HashMap<String, Scene>, HueError> {
        Ok(self
            .http
            .get(format!("{}/{username}/scenes", self.base))
            .send()
            .await?
            .json()
            .await?)
    }

    /// `PUT /api/{user}/lights/{id}/state`
    pub async fn set_light_state(
        &self,
        username: &str,
        light_id: &str,
        body: &StateBody,
    ) -> Result<(), HueError> {
        let results: Vec<ApiResult> = self
            .http
            .put(format!("{}/{username}/lights/{light_id}/state", self.base))
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        Self::check_results(&results)
    }

    /// `PUT /api/{user}/groups/{id}/action` — also how scenes are recalled
    /// (`group 0` addresses every light).
    pub async fn set_group_action(
        &self,
        username: &str,
        group_id: &str,
        body: &StateBody,
    ) -> Result<(), HueError> {
        let results: Vec<ApiResult> = self
            .http
            .put(format!("{}/{username}/groups/{group_id}/action", self.base))
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        Self::check_results(&results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_fail_check_when_any_result_is_an_error() {
        let results: Vec<ApiResult> = serde_json::from_str(
            r#"[{"success": {"on": true}}, {"error": {"type": 6, "description": "parameter not available"}}]"#,
        )
        .unwrap();
        let result = HueClient::check_results(&results);
        assert!(matches!(result, Err(HueError::Api { code: 6, .. })));
    }

    #[test]
    fn should_pass_check_for_success_only_reply() {
        let results: Vec<ApiResult> =
            serde_json::from_str(r#"[{"success": {"/lights/1/state/on": true}}]"#).unwrap();
        assert!(HueClient::check_results(&results).is_ok());
    }
}
