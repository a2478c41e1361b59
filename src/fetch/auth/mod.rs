//! Credential decorators for [`HttpClient`](crate::fetch::HttpClient).

mod api_key;
mod url_param;

pub use api_key::ApiKey;
pub use url_param::UrlParam;

use super::HttpClient;

/// Wraps `inner` with `Authorization: tma <init data>` when Telegram launch
/// data is available. Without it requests go out unauthenticated.
pub fn telegram_init_data<C: HttpClient + 'static>(
    inner: C,
    init_data: Option<&str>,
) -> anyhow::Result<Box<dyn HttpClient>> {
    match init_data {
        Some(data) => Ok(Box::new(ApiKey::authorization(inner, "tma", data)?)),
        None => Ok(Box::new(inner)),
    }
}
