use crate::error::{ClientError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://veoci.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated client for the platform's v2 REST API.
///
/// Cheap to clone: the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct VeociClient {
    http: Client,
    api_base: String,
}

impl VeociClient {
    pub fn new(token: &str, base_url: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| ClientError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("solmap/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base(base_url),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// GET `{api_base}{path}` and decode the body as JSON
    pub async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.api_base, path);
        log::debug!("GET {url}");

        let response = self.http.get(&url).query(query).send().await?;
        check_status(response.status(), &url)?;

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn api_base(base_url: &str) -> String {
    format!("{}/api/v2", base_url.trim().trim_end_matches('/'))
}

fn check_status(status: StatusCode, url: &str) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED => Err(ClientError::Authentication(
            "invalid or expired token".to_string(),
        )),
        StatusCode::FORBIDDEN => Err(ClientError::Authentication(
            "access denied, check token permissions".to_string(),
        )),
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(url.to_string())),
        s => Err(ClientError::Status {
            status: s.as_u16(),
            url: url.to_string(),
        }),
    }
}
