use crate::powerbi::auth::TokenProvider;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ADMIN_BASE_URL: &str = "https://api.powerbi.com/v1.0/myorg/admin";
pub const FABRIC_BASE_URL: &str = "https://api.fabric.microsoft.com/v1";

#[derive(Error, Debug)]
pub enum PowerBiError {
    #[error("Authentication failed: {0}")]
    AuthError(#[from] azure_core::Error),
    #[error("Token request failed: {0}")]
    TokenError(String),
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },
    #[error("Scan {scan_id} failed with status: {status}")]
    ScanFailed { scan_id: String, status: String },
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    #[error("{operation} timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },
    #[error("Long-running operation started but no Location header provided")]
    MissingLocation,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Bounded retry for throttled (429) and unavailable (503) responses.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based). `Retry-After` wins when present.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(wait) = retry_after {
            return wait.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub admin_base_url: String,
    pub fabric_base_url: String,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            admin_base_url: ADMIN_BASE_URL.to_string(),
            fabric_base_url: FABRIC_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Status, headers and body of a response, before any success check.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PowerBiError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn into_success(self) -> Result<Self, PowerBiError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(self.into_api_error())
        }
    }

    pub fn into_api_error(self) -> PowerBiError {
        PowerBiError::ApiError {
            status: self.status.as_u16(),
            body: self.body,
        }
    }
}

#[derive(Clone)]
pub struct PowerBiClient {
    client: Client,
    credential: Arc<dyn TokenProvider>,
    settings: ClientSettings,
}

impl PowerBiClient {
    pub fn new(credential: Arc<dyn TokenProvider>) -> Self {
        Self::with_settings(credential, ClientSettings::default())
    }

    pub fn with_settings(credential: Arc<dyn TokenProvider>, settings: ClientSettings) -> Self {
        Self {
            client: Client::new(),
            credential,
            settings,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.admin_base_url.trim_end_matches('/'),
            path
        )
    }

    pub fn fabric_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.fabric_base_url.trim_end_matches('/'),
            path
        )
    }

    /// Send a request to an absolute URL, retrying throttled responses.
    /// The status is not checked; callers that poll need 202 as-is.
    pub async fn send_raw(
        &self,
        method: Method,
        url: &str,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<RawResponse, PowerBiError> {
        let payload = body.map(serde_json::to_vec).transpose()?;

        log::debug!("Request: {} {}", method, url);
        if let Some(b) = &body
            && let Ok(json) = serde_json::to_string_pretty(b)
        {
            log::debug!("Request body: {}", json);
        }

        let mut attempt = 0;
        loop {
            let token = self.credential.token().await?;
            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(token)
                .header("Content-Type", "application/json");

            if let Some(bytes) = &payload {
                request = request.body(bytes.clone());
            }

            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();

            log::debug!("Response status: {}", status);

            if RetryPolicy::is_retryable(status) && attempt < self.settings.retry.max_retries {
                let delay = self
                    .settings
                    .retry
                    .delay_for(attempt, retry_after(&headers));
                log::warn!(
                    "{} {} returned {}, retrying in {:?} (attempt {}/{})",
                    method,
                    url,
                    status,
                    delay,
                    attempt + 1,
                    self.settings.retry.max_retries
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response.text().await?;
            if status.is_success() {
                log::debug!("Response body: {}", body);
            } else {
                log::debug!("Error response: {}", body);
            }

            return Ok(RawResponse {
                status,
                headers,
                body,
            });
        }
    }

    pub async fn request_url<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<T, PowerBiError> {
        let response = self.send_raw(method, url, body).await?.into_success()?;
        response.json()
    }

    /// Make a request against the Power BI admin API.
    /// URL format: https://api.powerbi.com/v1.0/myorg/admin/{path}
    pub async fn admin_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<T, PowerBiError> {
        let url = self.admin_url(path);
        self.request_url(method, &url, body).await
    }

    pub async fn admin_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PowerBiError> {
        self.admin_request(Method::GET, path, None::<&String>).await
    }

    pub async fn admin_post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + ?Sized),
    ) -> Result<T, PowerBiError> {
        self.admin_request(Method::POST, path, Some(body)).await
    }

    /// Make a request against the Fabric REST API.
    /// URL format: https://api.fabric.microsoft.com/v1/{path}
    pub async fn fabric_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<T, PowerBiError> {
        let url = self.fabric_url(path);
        self.request_url(method, &url, body).await
    }

    pub async fn get_url<T: DeserializeOwned>(&self, url: &str) -> Result<T, PowerBiError> {
        self.request_url(Method::GET, url, None::<&String>).await
    }

    /// GET an absolute URL and return the body text after the success check.
    pub async fn get_text(&self, url: &str) -> Result<String, PowerBiError> {
        let response = self
            .send_raw(Method::GET, url, None::<&String>)
            .await?
            .into_success()?;
        Ok(response.body)
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
