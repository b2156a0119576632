//! Per-kind, tag-keyed storage of fetched content.

use std::collections::HashMap;
use std::sync::RwLock;

use super::lock::{rw_read, rw_write};
use crate::content::ContentItem;

/// Tag-keyed store for one content kind.
///
/// Every entry is kept featured-first: all `featured` items precede the rest,
/// and each group keeps the order the API returned it in (newest first).
/// Entries are replaced wholly on [`set`](Self::set), never merged, and
/// [`get`](Self::get) always hands out an owned copy so callers cannot reach
/// the stored sequence.
///
/// # Examples
///
/// ```
/// use ghostcache::cache::ContentCacheContainer;
/// use ghostcache::content::ContentItem;
///
/// let container = ContentCacheContainer::new();
/// container.set("news", vec![
///     ContentItem::new("a", "", false),
///     ContentItem::new("b", "", true),
/// ]);
///
/// let slugs: Vec<_> = container.get("news", None).unwrap()
///     .into_iter().map(|item| item.slug).collect();
/// assert_eq!(slugs, ["b", "a"]);
/// assert!(container.get("sport", None).is_none());
/// ```
#[derive(Debug, Default)]
pub struct ContentCacheContainer {
    entries: RwLock<HashMap<String, Vec<ContentItem>>>,
}

impl ContentCacheContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        rw_write(&self.entries, "container.clear").clear();
    }

    /// Stores `items` under `tag`, featured items first, replacing any previous entry.
    pub fn set(&self, tag: impl Into<String>, items: Vec<ContentItem>) {
        rw_write(&self.entries, "container.set").insert(tag.into(), featured_first(items));
    }

    /// Stores `items` like [`set`](Self::set) and returns what a following
    /// `get(tag, limit)` would, without letting a concurrent `clear` in between.
    pub(crate) fn replace(
        &self,
        tag: &str,
        items: Vec<ContentItem>,
        limit: Option<usize>,
    ) -> Vec<ContentItem> {
        let ordered = featured_first(items);
        let end = limit.map_or(ordered.len(), |limit| limit.min(ordered.len()));
        let copy = ordered[..end].to_vec();

        rw_write(&self.entries, "container.replace").insert(tag.to_owned(), ordered);
        copy
    }

    /// Returns a copy of the entry for `tag`, truncated to `limit` items when given.
    ///
    /// `None` means the tag has never been stored (a cache miss), which is
    /// distinct from a stored empty sequence.
    pub fn get(&self, tag: &str, limit: Option<usize>) -> Option<Vec<ContentItem>> {
        let entries = rw_read(&self.entries, "container.get");
        let stored = entries.get(tag)?;
        let end = limit.map_or(stored.len(), |limit| limit.min(stored.len()));
        Some(stored[..end].to_vec())
    }

    /// Returns `true` if an entry exists for `tag`.
    pub fn contains(&self, tag: &str) -> bool {
        rw_read(&self.entries, "container.contains").contains_key(tag)
    }

    /// Number of cached tags.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, "container.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn featured_first(items: Vec<ContentItem>) -> Vec<ContentItem> {
    let (mut ordered, rest): (Vec<_>, Vec<_>) = items.into_iter().partition(|item| item.featured);
    ordered.extend(rest);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(slug: &str, featured: bool) -> ContentItem {
        ContentItem::new(slug, format!("<p>{slug}</p>"), featured)
    }

    fn slugs(items: &[ContentItem]) -> Vec<&str> {
        items.iter().map(|item| item.slug.as_str()).collect()
    }

    fn five() -> Vec<ContentItem> {
        vec![
            item("a", false),
            item("b", true),
            item("c", false),
            item("d", true),
            item("e", false),
        ]
    }

    #[test]
    fn featured_items_come_first_in_stable_order() {
        let container = ContentCacheContainer::new();
        container.set(
            "x",
            vec![item("A", false), item("B", true), item("C", false), item("D", true)],
        );
        let got = container.get("x", None).unwrap();
        assert_eq!(slugs(&got), ["B", "D", "A", "C"]);
    }

    #[test]
    fn miss_returns_none_not_empty() {
        let container = ContentCacheContainer::new();
        assert!(container.get("unknown-tag", None).is_none());

        container.set("empty", Vec::new());
        assert_eq!(container.get("empty", None), Some(Vec::new()));
    }

    #[test]
    fn limit_truncates_stored_order() {
        let container = ContentCacheContainer::new();
        container.set("x", five());

        assert_eq!(slugs(&container.get("x", Some(2)).unwrap()), ["b", "d"]);
        assert_eq!(container.get("x", None).unwrap().len(), 5);
    }

    #[test]
    fn limit_larger_than_entry_returns_everything() {
        let container = ContentCacheContainer::new();
        container.set("x", five());
        assert_eq!(container.get("x", Some(50)).unwrap().len(), 5);
        assert!(container.get("x", Some(0)).unwrap().is_empty());
    }

    #[test]
    fn returned_copy_is_isolated() {
        let container = ContentCacheContainer::new();
        container.set("x", five());

        let mut first = container.get("x", None).unwrap();
        first.clear();
        let mut second = container.get("x", Some(1)).unwrap();
        second[0].html = "mutated".to_string();

        let again = container.get("x", None).unwrap();
        assert_eq!(again.len(), 5);
        assert_eq!(again[0].html, "<p>b</p>");
    }

    #[test]
    fn set_replaces_whole_entry() {
        let container = ContentCacheContainer::new();
        container.set("x", five());
        container.set("x", vec![item("z", false)]);

        assert_eq!(slugs(&container.get("x", None).unwrap()), ["z"]);
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn replace_returns_limited_copy_and_stores_all() {
        let container = ContentCacheContainer::new();
        let returned = container.replace("x", five(), Some(3));

        assert_eq!(slugs(&returned), ["b", "d", "a"]);
        assert_eq!(container.get("x", None).unwrap().len(), 5);
    }

    #[test]
    fn clear_is_idempotent() {
        let container = ContentCacheContainer::new();
        container.set("x", five());
        container.set("y", five());
        assert_eq!(container.len(), 2);

        container.clear();
        container.clear();
        assert!(container.is_empty());
        assert!(!container.contains("x"));
    }
}
