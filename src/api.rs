//! HTTP plumbing shared by both backends.
//!
//! Every request carries `X-API-Version` and `X-Service-Key`. Requests are
//! plain, non-credentialed calls; authentication is a bearer token on the
//! device-scoped endpoints only.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{PushError, PushResult};
use crate::subscription::DeviceIdentity;

/// Backend error code meaning "device not registered" (sent with 404).
pub const DEVICE_NOT_REGISTERED: i64 = 3;

/// Error body returned with non-200 statuses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    /// Backend error code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Human readable message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Thin client for the push backend API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    service_key: String,
}

impl ApiClient {
    /// Build a client from explicit settings.
    pub fn new(base_url: &str, api_version: &str, service_key: &str) -> PushResult<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_http(http, base_url, api_version, service_key))
    }

    /// Build a client reusing an existing connection pool.
    pub fn with_http(
        http: reqwest::Client,
        base_url: &str,
        api_version: &str,
        service_key: &str,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            service_key: service_key.to_string(),
        }
    }

    /// Build a client from configuration.
    pub fn from_config(config: &Config) -> PushResult<Self> {
        Self::new(&config.api_url, &config.api_version, &config.service_key)
    }

    /// Base URL of the API (used as the vendor web service URL).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request with the standard headers applied.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-API-Version", &self.api_version)
            .header("X-Service-Key", &self.service_key)
    }

    /// Request against `/v1/devices/{identity}/{resource}`.
    pub fn device_request(
        &self,
        method: Method,
        identity: &DeviceIdentity,
        resource: &str,
    ) -> RequestBuilder {
        self.request(method, &format!("/v1/devices/{identity}/{resource}"))
    }

    /// Fetch the server public key (`applicationServerKey`), as wire text.
    pub async fn fetch_server_public_key(&self) -> PushResult<String> {
        let response = self.request(Method::GET, "/v1/webpush/key").send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(rejection(response).await);
        }
        let key = response.text().await?.trim().to_string();
        if key.is_empty() {
            return Err(PushError::MalformedResponse("empty server public key".to_string()));
        }
        Ok(key)
    }
}

/// Consume a non-200 response body and turn it into an error.
pub async fn rejection(response: Response) -> PushError {
    let status = response.status().as_u16();
    let message = read_error_body(response).await.message.unwrap_or_default();
    PushError::BackendRejected { status, message }
}

/// Parse the `{code, message}` error body, tolerating anything else.
pub async fn read_error_body(response: Response) -> ApiErrorBody {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or_else(|_| ApiErrorBody {
        code: None,
        message: (!text.is_empty()).then_some(text),
    })
}
