//! Content transforms: body rewrites applied to fetched items before caching.
//!
//! A transform is bound to a kind and either a specific tag or the wildcard
//! [`ALL_TAGS`]. Lookups prefer the tag-specific binding, fall back to the
//! wildcard, and otherwise leave bodies untouched.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use super::lock::{rw_read, rw_write};
use crate::content::ContentKind;

/// Binding key that applies to every tag lacking a specific binding.
pub const ALL_TAGS: &str = "all";

const SMOKE_TEST_HTML: &str = "<p>The quick brown fox jumps over the lazy dog.</p>";
const SMOKE_TEST_SLUG: &str = "transform-smoke-test";

/// A transform failed on its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("transform failed: {0}")]
    Failed(String),

    #[error("transform panicked")]
    Panicked,
}

impl TransformError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Rewrites the `html` body of a post or page.
///
/// Any `Fn(&str, &str, ContentKind) -> Result<String, TransformError>` closure
/// implements this trait, receiving `(html, slug, kind)`.
pub trait Transform: Send + Sync {
    fn apply(&self, html: &str, slug: &str, kind: ContentKind) -> Result<String, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(&str, &str, ContentKind) -> Result<String, TransformError> + Send + Sync,
{
    fn apply(&self, html: &str, slug: &str, kind: ContentKind) -> Result<String, TransformError> {
        (self)(html, slug, kind)
    }
}

/// Shared, cheaply-cloneable transform handle.
pub type SharedTransform = Arc<dyn Transform>;

/// Runs `transform` once against a fixed sample, turning a panic into an error.
fn smoke_test(transform: &dyn Transform, kind: ContentKind) -> Result<(), TransformError> {
    match catch_unwind(AssertUnwindSafe(|| {
        transform.apply(SMOKE_TEST_HTML, SMOKE_TEST_SLUG, kind)
    })) {
        Ok(result) => result.map(|_| ()),
        Err(_) => Err(TransformError::Panicked),
    }
}

/// Per-kind map from tag (or [`ALL_TAGS`]) to a validated transform.
#[derive(Default)]
pub struct TransformRegistry {
    bindings: RwLock<HashMap<(ContentKind, String), SharedTransform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `transform` to `(kind, tag)`; `tag` defaults to [`ALL_TAGS`].
    ///
    /// The transform is invoked once on a sample body first. If that call
    /// fails or panics, nothing is stored and any earlier binding for the
    /// same key stays in effect.
    ///
    /// # Errors
    ///
    /// Returns the smoke-test failure.
    pub fn register(
        &self,
        kind: ContentKind,
        transform: SharedTransform,
        tag: Option<&str>,
    ) -> Result<(), TransformError> {
        smoke_test(transform.as_ref(), kind)?;

        let tag = tag.unwrap_or(ALL_TAGS).to_owned();
        rw_write(&self.bindings, "transforms.register").insert((kind, tag), transform);
        Ok(())
    }

    /// Returns the transform for `(kind, tag)`, falling back to the
    /// [`ALL_TAGS`] binding.
    pub fn resolve(&self, kind: ContentKind, tag: &str) -> Option<SharedTransform> {
        let bindings = rw_read(&self.bindings, "transforms.resolve");
        bindings
            .get(&(kind, tag.to_owned()))
            .or_else(|| bindings.get(&(kind, ALL_TAGS.to_owned())))
            .cloned()
    }

    /// Number of stored bindings across both kinds.
    pub fn len(&self) -> usize {
        rw_read(&self.bindings, "transforms.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = rw_read(&self.bindings, "transforms.debug");
        let mut keys: Vec<_> = bindings
            .keys()
            .map(|(kind, tag)| format!("{}:{tag}", kind.label()))
            .collect();
        keys.sort();
        f.debug_struct("TransformRegistry")
            .field("bindings", &keys)
            .finish()
    }
}
