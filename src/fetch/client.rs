use async_trait::async_trait;
use reqwest::{Request, Response};

/// Seam over the HTTP transport so the relay can be driven by a mock sink.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
