//! Meta ads Graph API client: ad set lookup and status updates.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use vane_core::config::MetaAdsConfig;
use vane_core::TargetAction;

use crate::error::ClientError;

/// Meta campaign/ad-set delivery status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaStatus {
    Paused,
    Active,
}

impl MetaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaStatus::Paused => "PAUSED",
            MetaStatus::Active => "ACTIVE",
        }
    }
}

impl From<TargetAction> for MetaStatus {
    fn from(action: TargetAction) -> Self {
        match action {
            TargetAction::Pause => MetaStatus::Paused,
            TargetAction::Resume => MetaStatus::Active,
        }
    }
}

/// Ad set details returned by the pre-update validation fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct AdSetDetails {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
}

/// Meta ads port.
#[async_trait]
pub trait MetaAdsApi: Send + Sync {
    async fn get_ad_set(&self, ad_set_id: &str, token: &str) -> Result<AdSetDetails, ClientError>;
    async fn update_ad_set_status(
        &self,
        ad_set_id: &str,
        status: MetaStatus,
        token: &str,
    ) -> Result<(), ClientError>;
    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: MetaStatus,
        token: &str,
    ) -> Result<(), ClientError>;
}

pub struct MetaAdsClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    message: String,
    #[serde(default)]
    code: i64,
}

impl MetaAdsClient {
    /// All engine-side calls authenticate with per-user tokens; the app
    /// credentials only matter to the OAuth surface upstream, so missing
    /// ones are worth a warning but never block construction.
    pub fn from_config(config: &MetaAdsConfig) -> Self {
        if !config.is_configured() {
            tracing::warn!("meta app credentials not configured — token refresh surfaces disabled");
        }
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Graph API reports "does not exist" errors with code 100 inside a
    /// 400 response; surface those as NotFound so they stay terminal.
    async fn graph_error(response: reqwest::Response, resource: &str) -> ClientError {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        if let Ok(body) = serde_json::from_str::<GraphErrorBody>(&text) {
            if status == 404 || body.error.code == 100 {
                return ClientError::NotFound {
                    resource: resource.to_string(),
                };
            }
            return ClientError::Api {
                status,
                message: body.error.message,
                retry_after_ms: None,
            };
        }
        if status == 404 {
            return ClientError::NotFound {
                resource: resource.to_string(),
            };
        }
        ClientError::Api {
            status,
            message: text,
            retry_after_ms: None,
        }
    }

    async fn post_status(&self, object_id: &str, status: MetaStatus, token: &str, resource: &str)
        -> Result<(), ClientError>
    {
        let url = format!("{}/{}", self.base_url, object_id);
        let response = self
            .client
            .post(&url)
            .query(&[("access_token", token)])
            .form(&[("status", status.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::graph_error(response, resource).await);
        }
        debug!(object_id = %object_id, status = status.as_str(), "meta status updated");
        Ok(())
    }
}

#[async_trait]
impl MetaAdsApi for MetaAdsClient {
    async fn get_ad_set(&self, ad_set_id: &str, token: &str) -> Result<AdSetDetails, ClientError> {
        let url = format!("{}/{}", self.base_url, ad_set_id);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("access_token", token),
                ("fields", "id,name,status,campaign_id"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::graph_error(response, &format!("ad set {ad_set_id}")).await);
        }

        response
            .json::<AdSetDetails>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn update_ad_set_status(
        &self,
        ad_set_id: &str,
        status: MetaStatus,
        token: &str,
    ) -> Result<(), ClientError> {
        self.post_status(ad_set_id, status, token, &format!("ad set {ad_set_id}"))
            .await
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: MetaStatus,
        token: &str,
    ) -> Result<(), ClientError> {
        self.post_status(campaign_id, status, token, &format!("campaign {campaign_id}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_maps_to_meta_status() {
        assert_eq!(MetaStatus::from(TargetAction::Pause).as_str(), "PAUSED");
        assert_eq!(MetaStatus::from(TargetAction::Resume).as_str(), "ACTIVE");
    }

    #[test]
    fn graph_error_body_parses() {
        let body: GraphErrorBody = serde_json::from_str(
            r#"{"error": {"message": "Unsupported get request", "code": 100}}"#,
        )
        .unwrap();
        assert_eq!(body.error.code, 100);
    }
}
