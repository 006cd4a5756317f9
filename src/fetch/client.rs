use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared HTTP requests. Auth and other cross-cutting concerns wrap
/// an inner client rather than subclassing it.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
