//! # HTTP Retrieval Utilities
//!
//! A retrying, asynchronous API client around `reqwest`. Transient failures
//! (connect errors, 5xx, 429) are retried with exponential backoff by
//! `reqwest-retry` before the caller ever sees them.

use std::time::Duration;

use reqwest::{header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE}, Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

const USER_AGENT: &str = "EcoFeed/1.0";

/// A standardized container for API responses.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized response body, present on 2xx.
    pub data: Option<T>,
    /// The raw body returned by the server when the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// Returns the body of a successful response, or an error describing the failure.
    pub fn into_data(self) -> anyhow::Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(anyhow::anyhow!(
                "HTTP {}: {}",
                self.status,
                self.error_body.unwrap_or_default()
            )),
        }
    }
}

/// Retrying HTTP client shared by the poller and the dashboard REST client.
#[derive(Clone)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client with a per-request `timeout` and up to `max_retries`
    /// retries of transient failures.
    pub fn new(auth_token: Option<String>, max_retries: u32, timeout: Duration) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            inner: client,
            auth_token,
        }
    }

    /// Performs a request against an absolute `url` and decodes the JSON body.
    ///
    /// A non-2xx status is not an error here; it comes back as an
    /// [`ApiResponse`] with `success == false` and the raw body attached.
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if the request cannot be sent or a 2xx body
    /// does not deserialize into `T`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        url: Url,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let mut req = self.inner.request(method, url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }

    /// Shorthand for a body-less `GET`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> anyhow::Result<ApiResponse<T>> {
        self.request::<T, ()>(Method::GET, url, None, None).await
    }
}
