//! Per-target action dispatch.
//!
//! Targets run in parallel; results come back in target-list order because
//! they are collected by index, not completion order. A failed target
//! never fails its siblings.

use std::sync::atomic::{AtomicU32, Ordering};

use futures::future::join_all;
use tracing::{info, warn};

use vane_clients::{GoogleAdsApi, GoogleCampaignStatus, MetaAdsApi, MetaStatus};
use vane_core::{ActionOutcome, ApiError, CampaignTarget, Platform};
use vane_limiter::RateLimiter;
use vane_store::CredentialsLookup;

/// Platform calls get a tighter retry budget than the weather fetch.
const PLATFORM_MAX_RETRIES: u32 = 2;

pub(crate) struct ActionContext<'a> {
    pub credentials: &'a dyn CredentialsLookup,
    pub meta: &'a dyn MetaAdsApi,
    pub google: &'a dyn GoogleAdsApi,
    pub limiter: &'a RateLimiter,
}

/// Dispatch every target of a rule in parallel. `meta_calls` and
/// `google_calls` count platform call attempts for the execution metrics.
pub(crate) async fn dispatch_targets(
    ctx: &ActionContext<'_>,
    user_id: &str,
    targets: &[CampaignTarget],
    meta_calls: &AtomicU32,
    google_calls: &AtomicU32,
) -> Vec<ActionOutcome> {
    join_all(
        targets
            .iter()
            .map(|target| dispatch_one(ctx, user_id, target, meta_calls, google_calls)),
    )
    .await
}

async fn dispatch_one(
    ctx: &ActionContext<'_>,
    user_id: &str,
    target: &CampaignTarget,
    meta_calls: &AtomicU32,
    google_calls: &AtomicU32,
) -> ActionOutcome {
    let mut outcome = ActionOutcome {
        campaign_id: target.campaign_id.clone(),
        platform: target.platform,
        action: target.action,
        success: false,
        error_message: None,
        target_type: target.target_type,
        ad_set_id: target.ad_set_id.clone(),
    };

    let result = match target.platform {
        Platform::Meta => dispatch_meta(ctx, user_id, target, meta_calls).await,
        Platform::Google => dispatch_google(ctx, user_id, target, google_calls).await,
    };

    match result {
        Ok(()) => {
            outcome.success = true;
            info!(
                campaign_id = %target.campaign_id,
                platform = target.platform.as_str(),
                action = ?target.action,
                "action dispatched"
            );
        }
        Err(message) => {
            warn!(
                campaign_id = %target.campaign_id,
                platform = target.platform.as_str(),
                error = %message,
                "action failed"
            );
            outcome.error_message = Some(message);
        }
    }
    outcome
}

async fn dispatch_meta(
    ctx: &ActionContext<'_>,
    user_id: &str,
    target: &CampaignTarget,
    meta_calls: &AtomicU32,
) -> Result<(), String> {
    // Credential lookup failures are per-action and never retried at the
    // limiter layer.
    let creds = match ctx.credentials.meta_for(user_id).await {
        Ok(Some(creds)) => creds,
        Ok(None) => return Err("meta account not found".to_string()),
        Err(e) => return Err(format!("meta credential lookup failed: {e}")),
    };
    let ad_set_id = target.ad_set_id.clone().unwrap_or_default();
    let status = MetaStatus::from(target.action);

    // Validate the ad set exists before touching its status.
    ctx.limiter
        .execute_with_backoff(
            || {
                meta_calls.fetch_add(1, Ordering::Relaxed);
                async {
                    ctx.meta
                        .get_ad_set(&ad_set_id, &creds.access_token)
                        .await
                        .map_err(ApiError::from)
                }
            },
            "meta_ads",
            "adset_update",
            PLATFORM_MAX_RETRIES,
            None,
        )
        .await
        .map_err(|e| e.to_string())?;

    ctx.limiter
        .execute_with_backoff(
            || {
                meta_calls.fetch_add(1, Ordering::Relaxed);
                async {
                    ctx.meta
                        .update_ad_set_status(&ad_set_id, status, &creds.access_token)
                        .await
                        .map_err(ApiError::from)
                }
            },
            "meta_ads",
            "adset_update",
            PLATFORM_MAX_RETRIES,
            None,
        )
        .await
        .map_err(|e| e.to_string())?;

    Ok(())
}

async fn dispatch_google(
    ctx: &ActionContext<'_>,
    user_id: &str,
    target: &CampaignTarget,
    google_calls: &AtomicU32,
) -> Result<(), String> {
    let creds = match ctx.credentials.google_for(user_id).await {
        Ok(Some(creds)) => creds,
        Ok(None) => return Err("google account not found".to_string()),
        Err(e) => return Err(format!("google credential lookup failed: {e}")),
    };
    let status = GoogleCampaignStatus::from(target.action);

    ctx.limiter
        .execute_with_backoff(
            || {
                google_calls.fetch_add(1, Ordering::Relaxed);
                async {
                    ctx.google
                        .update_campaign_status(&target.campaign_id, status, &creds.access_token)
                        .await
                        .map_err(ApiError::from)
                }
            },
            "google_ads",
            "campaign_update",
            PLATFORM_MAX_RETRIES,
            None,
        )
        .await
        .map_err(|e| e.to_string())?;

    Ok(())
}
