mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, bail};
use serde::Serialize;

/// POSTs `body` as JSON and fails on any non-success status.
pub async fn post_json<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    body: &impl Serialize,
) -> Result<reqwest::StatusCode> {
    let mut req = reqwest::Request::new(reqwest::Method::POST, url.parse()?);
    req.headers_mut().insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());

    let resp = client.execute(req).await.context("sending request")?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("sink returned status {status}: {body}");
    }

    Ok(status)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::HttpClient;

    /// Records every request and answers with a fixed status.
    pub struct RecordingClient {
        pub status: u16,
        pub requests: Mutex<Vec<reqwest::Request>>,
    }

    impl RecordingClient {
        pub fn with_status(status: u16) -> Self {
            Self {
                status,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.requests.lock().unwrap().push(req);
            let resp = http::Response::builder()
                .status(self.status)
                .body("{}")
                .unwrap();
            Ok(resp.into())
        }
    }
}
