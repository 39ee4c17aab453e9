//! Platform credential lookup port.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::StoreError;

/// Access token for one connected ad account.
#[derive(Debug, Clone, FromRow)]
pub struct PlatformCredentials {
    pub access_token: String,
    pub account_id: Option<String>,
}

/// Token lookup per user and platform. Returns `None` when the user has
/// not connected the platform; the engine turns that into a per-action
/// failure, never a retry.
#[async_trait]
pub trait CredentialsLookup: Send + Sync {
    async fn meta_for(&self, user_id: &str) -> Result<Option<PlatformCredentials>, StoreError>;
    async fn google_for(&self, user_id: &str) -> Result<Option<PlatformCredentials>, StoreError>;
}

pub struct PgCredentialsLookup {
    pool: PgPool,
}

impl PgCredentialsLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lookup(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<PlatformCredentials>, StoreError> {
        let creds = sqlx::query_as::<_, PlatformCredentials>(
            "SELECT access_token, account_id FROM platform_accounts \
             WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?;
        Ok(creds)
    }
}

#[async_trait]
impl CredentialsLookup for PgCredentialsLookup {
    async fn meta_for(&self, user_id: &str) -> Result<Option<PlatformCredentials>, StoreError> {
        self.lookup(user_id, "meta").await
    }

    async fn google_for(&self, user_id: &str) -> Result<Option<PlatformCredentials>, StoreError> {
        self.lookup(user_id, "google").await
    }
}
