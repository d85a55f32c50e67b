use crate::powerbi::client::PowerBiError;
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_identity::DefaultAzureCredential;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const POWERBI_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Tokens are refreshed this long before the issuer's expiry.
const REFRESH_MARGIN_SECS: i64 = 300;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Source of bearer tokens for the Power BI and Fabric APIs.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, PowerBiError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    secret: String,
    refresh_at: DateTime<Utc>,
}

impl CachedToken {
    fn expiring_at(secret: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret,
            refresh_at: expires_at - Duration::seconds(REFRESH_MARGIN_SECS),
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.refresh_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// OAuth2 client-credentials grant for a service principal.
pub struct ClientSecretCredential {
    http: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cache: Mutex<Option<CachedToken>>,
}

impl ClientSecretCredential {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self::with_authority(DEFAULT_AUTHORITY_HOST, tenant_id, client_id, client_secret)
    }

    pub fn with_authority(
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self {
            http: Client::new(),
            authority_host: authority_host.trim_end_matches('/').to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cache: Mutex::new(None),
        }
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        )
    }

    async fn request_token(&self) -> Result<CachedToken, PowerBiError> {
        let url = self.token_url();
        log::debug!("Requesting token from {}", url);

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", POWERBI_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PowerBiError::TokenError(format!(
                "{} - {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response.json().await?;
        let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Ok(CachedToken::expiring_at(
            token.access_token,
            Utc::now() + Duration::seconds(expires_in),
        ))
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    async fn token(&self) -> Result<String, PowerBiError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.is_fresh(Utc::now())
        {
            return Ok(cached.secret.clone());
        }

        let fresh = self.request_token().await?;
        log::debug!("Token refreshed, next refresh at {}", fresh.refresh_at);
        let secret = fresh.secret.clone();
        *cache = Some(fresh);
        Ok(secret)
    }
}

/// Falls back to the ambient Azure identity chain (environment, managed identity, Azure CLI).
pub struct AzureIdentityCredential {
    credential: Arc<DefaultAzureCredential>,
    cache: Mutex<Option<CachedToken>>,
}

impl Default for AzureIdentityCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureIdentityCredential {
    pub fn new() -> Self {
        Self {
            credential: Arc::new(DefaultAzureCredential::default()),
            cache: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for AzureIdentityCredential {
    async fn token(&self) -> Result<String, PowerBiError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.is_fresh(Utc::now())
        {
            return Ok(cached.secret.clone());
        }

        let token_response = self.credential.get_token(POWERBI_SCOPE).await?;
        let secret = token_response.token.secret().to_string();
        let expires_at = Utc
            .timestamp_opt(token_response.expires_on.unix_timestamp(), 0)
            .single()
            .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_EXPIRES_IN_SECS));

        *cache = Some(CachedToken::expiring_at(secret.clone(), expires_at));
        Ok(secret)
    }
}

/// A fixed bearer token minted elsewhere.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, PowerBiError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_token_refreshes_five_minutes_early() {
        let now = Utc::now();
        let token = CachedToken::expiring_at("abc".to_string(), now + Duration::seconds(3600));
        assert!(token.is_fresh(now));
        assert!(token.is_fresh(now + Duration::seconds(3299)));
        assert!(!token.is_fresh(now + Duration::seconds(3300)));
    }

    #[test]
    fn short_lived_token_is_never_fresh() {
        let now = Utc::now();
        let token = CachedToken::expiring_at("abc".to_string(), now + Duration::seconds(120));
        assert!(!token.is_fresh(now));
    }

    #[test]
    fn token_url_uses_tenant() {
        let credential =
            ClientSecretCredential::with_authority("https://login.example/", "tenant", "id", "s");
        assert_eq!(
            credential.token_url(),
            "https://login.example/tenant/oauth2/v2.0/token"
        );
    }

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        let provider = StaticToken::new("fixed");
        assert_eq!(provider.token().await.unwrap(), "fixed");
    }
}
