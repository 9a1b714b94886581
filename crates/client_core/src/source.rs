//! Fetch capability injected into the load controller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use shared::{domain::User, error::FetchError};
use url::Url;

pub const DEFAULT_USERS_ENDPOINT: &str = "https://jsonplaceholder.typicode.com/users";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("contact-list/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait UsersSource: Send + Sync {
    async fn fetch_users(&self) -> Result<Vec<User>, FetchError>;

    /// Human-readable origin used in log lines.
    fn describe(&self) -> String;
}

/// Used when no transport is configured. Every fetch fails as a transport error
/// instead of yielding an empty list.
pub struct UnavailableUsersSource;

#[async_trait]
impl UsersSource for UnavailableUsersSource {
    async fn fetch_users(&self) -> Result<Vec<User>, FetchError> {
        Err(FetchError::transport("users transport is unavailable"))
    }

    fn describe(&self) -> String {
        "unavailable".to_string()
    }
}

/// Reqwest-backed source performing `GET <endpoint>`.
pub struct HttpUsersSource {
    http: Client,
    endpoint: Url,
}

impl HttpUsersSource {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl UsersSource for HttpUsersSource {
    async fn fetch_users(&self) -> Result<Vec<User>, FetchError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(status));
        }

        let body = response.bytes().await.map_err(map_transport_error)?;
        decode_users(&body)
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

/// Decodes a JSON array of users. An empty array is a valid, empty result.
pub fn decode_users(body: &[u8]) -> Result<Vec<User>, FetchError> {
    Ok(serde_json::from_slice::<Vec<User>>(body)?)
}

fn map_transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::transport(format!("request timed out: {err}"))
    } else if err.is_connect() {
        FetchError::transport(format!("failed to connect: {err}"))
    } else if err.is_decode() {
        FetchError::decode(err.to_string())
    } else {
        FetchError::transport(err.to_string())
    }
}

fn map_status_error(status: StatusCode) -> FetchError {
    FetchError::transport(format!("unexpected HTTP status {status}"))
}

#[cfg(test)]
#[path = "tests/source_tests.rs"]
mod tests;
