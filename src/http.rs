// src/http.rs
//! Shared HTTP plumbing for the source adapters: one `reqwest::Client`, one
//! retry policy, one status-to-error mapping.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::FetchError;
use crate::retry::RetryPolicy;

pub const USER_AGENT: &str = "UCG-News-Bot/1.0";

/// Longest upstream error body we keep in an error value.
pub(crate) const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, retry })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Send the request built by `build` and decode a JSON body, retrying
    /// transient failures according to the policy.
    pub async fn get_json<T, B>(&self, what: &str, build: B) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        B: Fn(&Client) -> RequestBuilder,
    {
        let client = &self.client;
        let build = &build;
        self.retry
            .run(what, move || async move {
                let resp = build(client).send().await?;
                let status = resp.status();
                let body = resp.text().await?;
                if !status.is_success() {
                    return Err(status_error(status, body));
                }
                serde_json::from_str::<T>(&body).map_err(|e| FetchError::Parse(e.to_string()))
            })
            .await
    }
}

fn status_error(status: StatusCode, body: String) -> FetchError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return FetchError::RateLimited;
    }
    if status == StatusCode::FORBIDDEN && body.contains("quotaExceeded") {
        return FetchError::QuotaExceeded;
    }
    FetchError::Status {
        status,
        body: truncate(&body, MAX_ERROR_BODY),
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rate_limit_and_quota() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            FetchError::RateLimited
        ));
        assert!(matches!(
            status_error(
                StatusCode::FORBIDDEN,
                r#"{"error":{"errors":[{"reason":"quotaExceeded"}]}}"#.into()
            ),
            FetchError::QuotaExceeded
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "nope".into()),
            FetchError::Status { .. }
        ));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("ウルトラマン", 3), "ウルト");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
