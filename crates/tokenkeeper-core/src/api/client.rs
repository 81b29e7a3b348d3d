//! API client for authenticated calls to the application API.
//!
//! This module provides the `ApiClient` struct. Every request it sends is
//! passed through the [`RequestAugmenter`] first, so consumers never build
//! `Authorization` headers themselves.

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{ApiError, RequestAugmenter};
use crate::auth::AuthCoordinator;
use crate::config::Config;

/// API client configured with a base URL and default headers.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    augmenter: RequestAugmenter,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        auth: AuthCoordinator,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(Self::default_headers())
            .build()?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            augmenter: RequestAugmenter::new(auth),
        })
    }

    pub fn from_config(config: &Config, auth: AuthCoordinator) -> Result<Self, ApiError> {
        Self::new(config.api_base_url(), config.request_timeout(), auth)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Headers sent with every request, before credentials are attached
    pub fn headers(&self) -> header::HeaderMap {
        Self::default_headers()
    }

    fn default_headers() -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    pub fn augmenter(&self) -> &RequestAugmenter {
        &self.augmenter
    }

    pub fn coordinator(&self) -> &AuthCoordinator {
        self.augmenter.coordinator()
    }

    /// Resolve `path` against the base URL; absolute URLs are kept as-is.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Attach credentials, dispatch, and fail on non-success statuses.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder.build()?;
        let request = self.augmenter.augment(request).await?;

        let url = request.url().clone();
        let response = self.client.execute(request).await?;
        debug!(url = %url, status = response.status().as_u16(), "API response");
        Self::check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON from {path}: {e}")))
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON from {path}: {e}")))
    }
}
