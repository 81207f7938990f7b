//! Shared plumbing for the REST-backed forge APIs.
//!
//! Forge calls run on FUSE dispatch threads during a group's first
//! expansion, so the blocking reqwest client is the right shape here; the
//! tokio runtime only ever runs git jobs.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;

use super::{ApiError, Page};

/// Page size requested from every forge listing endpoint.
pub(crate) const PER_PAGE: u32 = 100;

/// Build a blocking HTTP client with an optional authentication header.
pub(crate) fn http_client(auth: Option<(&'static str, &str)>) -> Result<Client, ApiError> {
    let mut headers = HeaderMap::new();
    if let Some((name, value)) = auth {
        let mut value = HeaderValue::from_str(value).map_err(|_| ApiError::InvalidToken)?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    Ok(Client::builder()
        .user_agent(concat!("forgefs/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .build()?)
}

/// GET `url` and decode the JSON response.
pub(crate) fn get_json<T: DeserializeOwned>(
    http: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, ApiError> {
    let response = http.get(url).query(query).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.json()?)
}

/// Standard pagination query parameters.
pub(crate) fn page_query(page: u32) -> [(&'static str, String); 2] {
    [
        ("page", page.to_string()),
        ("per_page", PER_PAGE.to_string()),
    ]
}

/// Wrap a listing response into a page. A full page means the walk
/// continues; a short page ends it.
pub(crate) fn into_page<T>(items: Vec<T>, page: u32) -> Page<T> {
    let next = (items.len() as u32 >= PER_PAGE).then(|| page + 1);
    Page { items, next }
}
