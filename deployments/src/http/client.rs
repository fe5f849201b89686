//! HTTP client implementation

use std::time::Duration;

use http::StatusCode;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};
use url::Url;

use crate::errors::DeployError;
use crate::utils::{calc_exp_backoff, CooldownOptions};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Retry policy for idempotent reads
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay between attempts
    pub backoff: CooldownOptions,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: CooldownOptions::default(),
        }
    }
}

/// HTTP client for the GitHub REST API
pub struct HttpClient {
    client: Client,
    base_url: Url,
    retry: RetryOptions,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, timeout: Duration, retry: RetryOptions) -> Result<Self, DeployError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(
            "x-github-api-version",
            header::HeaderValue::from_static(GITHUB_API_VERSION),
        );

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deployments/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| DeployError::Config(format!("Invalid API URL '{}': {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, DeployError> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| DeployError::Internal(format!("Invalid request path '{}': {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
    }

    /// Make a GET request, retrying transient failures
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<T, DeployError> {
        let url = self.url(path, query)?;
        let mut attempt = 0;

        loop {
            debug!("GET {}", url);
            let result = match self.request(Method::GET, url.clone(), token).send().await {
                Ok(response) => decode(Method::GET, response).await,
                Err(e) => Err(transport_error(e)),
            };

            match result {
                Err(e) if e.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    let delay = calc_exp_backoff(&self.retry.backoff, attempt);
                    warn!("GET {} failed ({}), retrying in {:?}", url, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<T, DeployError> {
        self.send_once(Method::POST, path, token, body).await
    }

    /// Make a PATCH request
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<T, DeployError> {
        self.send_once(Method::PATCH, path, token, body).await
    }

    // Writes are never retried here
    async fn send_once<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<T, DeployError> {
        let url = self.url(path, &[])?;
        debug!("{} {}", method, url);

        let response = self
            .request(method.clone(), url, token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        decode(method, response).await
    }
}

fn transport_error(err: reqwest::Error) -> DeployError {
    if err.is_timeout() || err.is_connect() {
        DeployError::TransientNetwork(err.to_string())
    } else {
        DeployError::Http(err)
    }
}

async fn decode<T: DeserializeOwned>(method: Method, response: Response) -> Result<T, DeployError> {
    let status = response.status();
    let url = response.url().clone();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        error!("HTTP {} {} failed: {} - {}", method, url, status, body);
        return Err(status_error(status, body));
    }

    // Some endpoints answer with an empty body
    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    Ok(serde_json::from_str(body)?)
}

fn status_error(status: StatusCode, body: String) -> DeployError {
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);

    match status {
        StatusCode::NOT_FOUND => DeployError::NotFound(message),
        StatusCode::UNPROCESSABLE_ENTITY => DeployError::Unprocessable(message),
        StatusCode::TOO_MANY_REQUESTS => DeployError::TransientNetwork(message),
        s if s.is_server_error() => DeployError::TransientNetwork(format!("{}: {}", s, message)),
        s => DeployError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::new(
            "https://api.github.com/",
            Duration::from_secs(5),
            RetryOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let client = client();
        let url = client
            .url("/repos/ploys/tests/contents/.github/workflows", &[("ref", "abc")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/ploys/tests/contents/.github/workflows?ref=abc"
        );
    }

    #[test]
    fn test_base_url_with_prefix_is_kept() {
        let client = HttpClient::new(
            "https://ghe.example.com/api/v3",
            Duration::from_secs(5),
            RetryOptions::default(),
        )
        .unwrap();
        let url = client.url("/app/installations/1/access_tokens", &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/app/installations/1/access_tokens"
        );
    }

    #[test]
    fn test_status_mapping() {
        let err = status_error(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#.into());
        assert!(matches!(err, DeployError::NotFound(ref m) if m == "Not Found"));

        let err = status_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Reference already exists"}"#.into(),
        );
        assert!(matches!(err, DeployError::Unprocessable(_)));

        let err = status_error(StatusCode::BAD_GATEWAY, String::new());
        assert!(err.is_transient());

        let err = status_error(StatusCode::FORBIDDEN, "nope".into());
        assert!(matches!(err, DeployError::Api { status: 403, .. }));
        assert!(!err.is_transient());
    }
}
