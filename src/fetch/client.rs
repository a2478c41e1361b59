use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport seam for every outbound HTTP call (backend API and maps
/// provider). Decorators in [`crate::fetch::auth`] wrap an inner client to
/// add credentials.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Box<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}
