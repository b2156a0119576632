//! Content records served by the remote CMS.
//!
//! [`ContentItem`] mirrors a Ghost post or page closely enough for the cache
//! to do its job: it reads `slug`, `html` and `featured`, and carries every
//! other field through untouched so downstream templates see the full record.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One of the two parallel content collections.
///
/// Each kind owns its own cache container and transform bindings, but both
/// flow through identical processing logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Posts,
    Pages,
}

impl ContentKind {
    /// Both kinds, in a stable order.
    pub const ALL: [ContentKind; 2] = [ContentKind::Posts, ContentKind::Pages];

    /// Singular label handed to transforms: `"post"` or `"page"`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Posts => "post",
            Self::Pages => "page",
        }
    }

    /// Plural field name: the remote resource path segment and the
    /// [`ContentData`] field the middleware fills.
    pub fn field(self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Pages => "pages",
        }
    }

    /// Number of items the request middleware asks for when none is configured.
    pub fn default_limit(self) -> usize {
        match self {
            Self::Posts => 10,
            Self::Pages => 5,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// A single post or page as returned by the content API.
///
/// Only the fields the cache acts on are typed. Everything else lands in
/// [`extra`](Self::extra) and is serialized back out unchanged.
///
/// # Examples
///
/// ```
/// use ghostcache::content::ContentItem;
///
/// let item: ContentItem = serde_json::from_str(
///     r#"{"slug":"hello","html":"<p>hi</p>","featured":true,"title":"Hello"}"#,
/// ).unwrap();
/// assert_eq!(item.slug, "hello");
/// assert!(item.featured);
/// assert_eq!(item.extra["title"], "Hello");
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentItem {
    pub slug: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub html: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub featured: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentItem {
    /// Creates an item with an empty passthrough map.
    pub fn new(slug: impl Into<String>, html: impl Into<String>, featured: bool) -> Self {
        Self {
            slug: slug.into(),
            html: html.into(),
            featured,
            extra: Map::new(),
        }
    }

    /// Replaces the body, keeping every other field.
    #[must_use]
    pub fn with_html(self, html: String) -> Self {
        Self { html, ..self }
    }
}

// Ghost sends `"html": null` for empty bodies and occasionally `"featured": null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The response-scoped data object shared by the content middlewares.
///
/// Whichever middleware runs first creates it with both collections empty;
/// each middleware then fills only its own field, so posts and pages can be
/// mounted alone or chained.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentData {
    pub posts: Vec<ContentItem>,
    pub pages: Vec<ContentItem>,
}

impl ContentData {
    pub fn get(&self, kind: ContentKind) -> &[ContentItem] {
        match kind {
            ContentKind::Posts => &self.posts,
            ContentKind::Pages => &self.pages,
        }
    }

    pub fn set(&mut self, kind: ContentKind, items: Vec<ContentItem>) {
        match kind {
            ContentKind::Posts => self.posts = items,
            ContentKind::Pages => self.pages = items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels() {
        assert_eq!(ContentKind::Posts.label(), "post");
        assert_eq!(ContentKind::Pages.label(), "page");
        assert_eq!(ContentKind::Posts.field(), "posts");
        assert_eq!(ContentKind::Pages.to_string(), "pages");
    }

    #[test]
    fn default_limits() {
        assert_eq!(ContentKind::Posts.default_limit(), 10);
        assert_eq!(ContentKind::Pages.default_limit(), 5);
    }

    #[test]
    fn null_fields_deserialize_to_defaults() {
        let item: ContentItem =
            serde_json::from_str(r#"{"slug":"a","html":null,"featured":null}"#).unwrap();
        assert_eq!(item.html, "");
        assert!(!item.featured);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let item: ContentItem = serde_json::from_str(r#"{"slug":"a"}"#).unwrap();
        assert_eq!(item.html, "");
        assert!(!item.featured);
        assert!(item.extra.is_empty());
    }

    #[test]
    fn passthrough_fields_survive_round_trip() {
        let raw = r#"{"slug":"a","html":"<p/>","featured":false,"title":"T","tags":[{"slug":"x"}]}"#;
        let item: ContentItem = serde_json::from_str(raw).unwrap();
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["title"], "T");
        assert_eq!(value["tags"][0]["slug"], "x");
    }

    #[test]
    fn with_html_keeps_other_fields() {
        let mut item = ContentItem::new("a", "<p>old</p>", true);
        item.extra.insert("title".to_string(), "T".into());
        let rewritten = item.with_html("<p>new</p>".to_string());
        assert_eq!(rewritten.html, "<p>new</p>");
        assert_eq!(rewritten.slug, "a");
        assert!(rewritten.featured);
        assert_eq!(rewritten.extra["title"], "T");
    }

    #[test]
    fn content_data_fields_are_independent() {
        let mut data = ContentData::default();
        data.set(ContentKind::Pages, vec![ContentItem::new("p", "", false)]);
        assert!(data.get(ContentKind::Posts).is_empty());
        assert_eq!(data.get(ContentKind::Pages).len(), 1);
    }
}
