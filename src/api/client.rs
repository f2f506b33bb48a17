//! Typed HTTP client for the Dayly backend.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests against the Dayly REST API, decoding JSON payloads strictly
//! and translating HTTP status codes into `ApiError`.

use std::time::Duration;

use reqwest::{header, Client, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::models::{GroupDto, PhotoDto};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for establishing a connection.
/// 30s allows for slow cellular links while failing fast enough for good UX.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Timeout for a complete resource transfer.
/// Photo downloads can be multi-megabyte on slow links.
const RESOURCE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct DeviceRegistration<'a> {
    device_token: &'a str,
    platform: &'a str,
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    #[serde(default)]
    success: bool,
}

/// API client for the Dayly backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client against the given base URL.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(RESOURCE_TIMEOUT_SECS))
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    /// The underlying reqwest client, shared with the progressive fetcher
    /// so photo downloads reuse the same pool and timeouts.
    pub fn http_client(&self) -> Client {
        self.client.clone()
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("Token is not header-safe".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Send a request and decode the 2xx body strictly into `T`.
    /// Decode failures surface as `Decoding`, distinct from transport errors.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        debug!(method = %method, url = %url, "API request");

        let mut builder = self
            .client
            .request(method, url)
            .headers(self.auth_headers()?);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(ApiError::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from_transport)?;

        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }
        if text.is_empty() && status != StatusCode::NO_CONTENT {
            return Err(ApiError::NoData);
        }
        if text.is_empty() {
            // 204: synthesize an empty JSON value for unit-like targets.
            return serde_json::from_str("null").map_err(ApiError::Decoding);
        }

        serde_json::from_str(&text).map_err(ApiError::Decoding)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, self.endpoint(path)?, None).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, self.endpoint(path)?, Some(body))
            .await
    }

    async fn delete<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        self.request(Method::DELETE, url, None).await
    }

    // ===== Data Fetching Methods =====

    /// Fetch the authoritative group list with embedded members and
    /// last-photo metadata.
    pub async fn fetch_groups(&self) -> Result<Vec<GroupDto>, ApiError> {
        self.get("/api/groups").await
    }

    /// Fetch today's photos for a group.
    pub async fn fetch_today_photos(&self, group_id: Uuid) -> Result<Vec<PhotoDto>, ApiError> {
        self.get(&format!("/api/photos/{}/today", group_id)).await
    }

    // ===== Push Token Lifecycle =====

    /// Register a device token for push notifications.
    pub async fn register_device(&self, device_token: &str) -> Result<(), ApiError> {
        let body = serde_json::to_value(DeviceRegistration {
            device_token,
            platform: "ios",
        })
        .map_err(ApiError::Decoding)?;
        let resp: SuccessResponse = self.post("/api/devices/register", body).await?;
        if !resp.success {
            return Err(ApiError::InvalidResponse(
                "Device registration was not acknowledged".to_string(),
            ));
        }
        Ok(())
    }

    /// Remove a previously registered device token.
    pub async fn unregister_device(&self, device_token: &str) -> Result<(), ApiError> {
        let resp: SuccessResponse = self.delete(self.unregister_url(device_token)?).await?;
        if !resp.success {
            return Err(ApiError::InvalidResponse(
                "Device unregistration was not acknowledged".to_string(),
            ));
        }
        Ok(())
    }

    /// Tokens go through proper query encoding - push tokens can contain
    /// characters that would otherwise corrupt the query string.
    fn unregister_url(&self, device_token: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint("/api/devices/unregister")?;
        url.query_pairs_mut()
            .append_pair("device_token", device_token);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_base_url() {
        assert!(matches!(
            ApiClient::new("not a url"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let client = ApiClient::new("https://api.dayly.app").expect("valid url");
        let url = client.endpoint("/api/groups").expect("join");
        assert_eq!(url.as_str(), "https://api.dayly.app/api/groups");
    }

    #[test]
    fn test_with_token_sets_bearer_header() {
        let client = ApiClient::new("https://api.dayly.app")
            .expect("valid url")
            .with_token("abc123".to_string());
        let headers = client.auth_headers().expect("headers");
        assert_eq!(
            headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer abc123")
        );
    }

    #[test]
    fn test_unregister_url_encodes_token() {
        let client = ApiClient::new("https://api.dayly.app").expect("valid url");
        let url = client.unregister_url("a&b=c d").expect("url");
        assert_eq!(url.query(), Some("device_token=a%26b%3Dc+d"));
    }

    #[test]
    fn test_auth_headers_empty_without_token() {
        let client = ApiClient::new("https://api.dayly.app").expect("valid url");
        assert!(client.auth_headers().expect("headers").is_empty());
    }
}
