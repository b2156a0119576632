//! HTTP client for the Ghost Content API.
//!
//! # Example
//!
//! ```no_run
//! use ghostcache::api::{BrowseParams, ContentApi, GhostContentApi};
//! use ghostcache::content::ContentKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = GhostContentApi::new("https://demo.ghost.io", "22444f78447824223cefc48062")?;
//!     let params = BrowseParams::new(5).include("tags");
//!     for post in api.browse(ContentKind::Posts, &params).await? {
//!         println!("{}", post.slug);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{ApiError, BrowseParams, ContentApi};
use crate::content::{ContentItem, ContentKind};

/// Content API protocol version the client speaks.
pub const API_VERSION: &str = "v2";

/// Ghost Content API client.
///
/// Stateless apart from the connection pool; it never caches responses.
/// Caching is the job of [`ContentCacheService`](crate::cache::ContentCacheService).
#[derive(Debug, Clone)]
pub struct GhostContentApi {
    client: Client,
    base_url: Url,
    key: String,
}

impl GhostContentApi {
    /// Creates a client for the Ghost site at `url`, authenticating with the
    /// Content API `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if `url` cannot be parsed, or
    /// [`ApiError::Http`] if the underlying HTTP client cannot be built.
    pub fn new(url: &str, key: impl Into<String>) -> Result<Self, ApiError> {
        let base_url = Url::parse(&format!(
            "{}/ghost/api/{API_VERSION}/content/",
            url.trim_end_matches('/')
        ))?;

        Ok(Self {
            client: Client::builder().build()?,
            base_url,
            key: key.into(),
        })
    }

    /// Returns the collection root, e.g. `https://site/ghost/api/v2/content/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn browse_url(&self, kind: ContentKind, params: &BrowseParams) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(&format!("{}/", kind.field()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("key", &self.key);
            query.append_pair("limit", &params.limit.to_string());
            if let Some(include) = &params.include {
                query.append_pair("include", include);
            }
            if let Some(filter) = params.filter.as_deref().filter(|f| !f.is_empty()) {
                query.append_pair("filter", filter);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ContentApi for GhostContentApi {
    async fn browse(
        &self,
        kind: ContentKind,
        params: &BrowseParams,
    ) -> Result<Vec<ContentItem>, ApiError> {
        let url = self.browse_url(kind, params)?;
        debug!(%kind, filter = ?params.filter, limit = params.limit, "browsing content API");

        // The URL carries the API key, so it is stripped from transport errors.
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = response.status();
        let body = response.text().await.map_err(reqwest::Error::without_url)?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_owned()),
            });
        }

        parse_collection(kind, &body)
    }
}

/// Extracts the `posts`/`pages` array from a browse response body.
fn parse_collection(kind: ContentKind, body: &str) -> Result<Vec<ContentItem>, ApiError> {
    let mut payload: Value = serde_json::from_str(body)?;
    let collection = payload
        .get_mut(kind.field())
        .map(Value::take)
        .filter(Value::is_array)
        .ok_or(ApiError::MissingField {
            field: kind.field(),
        })?;
    Ok(serde_json::from_value(collection)?)
}

// Ghost error bodies look like `{"errors":[{"message":"...","type":"..."}]}`.
fn error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    payload
        .get("errors")?
        .get(0)?
        .get("message")?
        .as_str()
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_of(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn base_url_is_versioned() {
        let api = GhostContentApi::new("https://blog.example.com/", "k").unwrap();
        assert_eq!(
            api.base_url().as_str(),
            "https://blog.example.com/ghost/api/v2/content/"
        );
    }

    #[test]
    fn base_url_keeps_subdirectory() {
        let api = GhostContentApi::new("https://example.com/blog", "k").unwrap();
        assert_eq!(
            api.base_url().as_str(),
            "https://example.com/blog/ghost/api/v2/content/"
        );
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(matches!(
            GhostContentApi::new("not a url", "k"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn browse_url_carries_all_params() {
        let api = GhostContentApi::new("https://example.com", "secret").unwrap();
        let params = BrowseParams::new(50)
            .include("tags")
            .filter(Some("tags:news".to_string()));
        let url = api.browse_url(ContentKind::Pages, &params).unwrap();

        assert_eq!(url.path(), "/ghost/api/v2/content/pages/");
        assert_eq!(
            query_of(&url),
            vec![
                ("key".to_string(), "secret".to_string()),
                ("limit".to_string(), "50".to_string()),
                ("include".to_string(), "tags".to_string()),
                ("filter".to_string(), "tags:news".to_string()),
            ]
        );
    }

    #[test]
    fn browse_url_omits_missing_filter() {
        let api = GhostContentApi::new("https://example.com", "secret").unwrap();
        let url = api
            .browse_url(ContentKind::Posts, &BrowseParams::new(50))
            .unwrap();
        assert!(query_of(&url).iter().all(|(k, _)| k != "filter"));
    }

    #[test]
    fn parse_collection_reads_kind_field() {
        let body = r#"{"posts":[{"slug":"a"},{"slug":"b","featured":true}],"meta":{}}"#;
        let items = parse_collection(ContentKind::Posts, body).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[1].featured);
    }

    #[test]
    fn parse_collection_missing_field() {
        let body = r#"{"posts":[]}"#;
        assert!(matches!(
            parse_collection(ContentKind::Pages, body),
            Err(ApiError::MissingField { field: "pages" })
        ));
    }

    #[test]
    fn parse_collection_bad_json() {
        assert!(matches!(
            parse_collection(ContentKind::Posts, "<html>"),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn error_message_from_ghost_body() {
        let body = r#"{"errors":[{"message":"Unknown Content API Key","type":"UnauthorizedError"}]}"#;
        assert_eq!(
            error_message(body).as_deref(),
            Some("Unknown Content API Key")
        );
        assert_eq!(error_message("oops"), None);
    }
}
