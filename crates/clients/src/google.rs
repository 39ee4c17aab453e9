//! Google ads REST client: campaign status updates.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use vane_core::config::GoogleAdsConfig;
use vane_core::TargetAction;

use crate::error::{api_error_from_response, ClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoogleCampaignStatus {
    Paused,
    Enabled,
}

impl GoogleCampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoogleCampaignStatus::Paused => "PAUSED",
            GoogleCampaignStatus::Enabled => "ENABLED",
        }
    }
}

impl From<TargetAction> for GoogleCampaignStatus {
    fn from(action: TargetAction) -> Self {
        match action {
            TargetAction::Pause => GoogleCampaignStatus::Paused,
            TargetAction::Resume => GoogleCampaignStatus::Enabled,
        }
    }
}

/// Google ads port.
#[async_trait]
pub trait GoogleAdsApi: Send + Sync {
    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: GoogleCampaignStatus,
        token: &str,
    ) -> Result<(), ClientError>;
}

pub struct GoogleAdsClient {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleAdsClient {
    /// Engine-side calls use per-user tokens; missing client credentials
    /// only affect the upstream OAuth surface.
    pub fn from_config(config: &GoogleAdsConfig) -> Self {
        if !config.is_configured() {
            tracing::warn!("google client credentials not configured — token refresh surfaces disabled");
        }
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GoogleAdsApi for GoogleAdsClient {
    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: GoogleCampaignStatus,
        token: &str,
    ) -> Result<(), ClientError> {
        let url = format!("{}/campaigns/{}:updateStatus", self.base_url, campaign_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "status": status.as_str() }))
            .send()
            .await?;

        let http_status = response.status();
        if http_status.as_u16() == 404 {
            return Err(ClientError::NotFound {
                resource: format!("campaign {campaign_id}"),
            });
        }
        if !http_status.is_success() {
            return Err(api_error_from_response(response).await);
        }
        debug!(campaign_id = %campaign_id, status = status.as_str(), "google campaign status updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_maps_to_google_status() {
        assert_eq!(GoogleCampaignStatus::from(TargetAction::Pause).as_str(), "PAUSED");
        assert_eq!(GoogleCampaignStatus::from(TargetAction::Resume).as_str(), "ENABLED");
    }
}
