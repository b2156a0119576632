//! Configuration layer: the `ghost` settings section and service bootstrap.
//!
//! Settings are layered file → environment. Environment keys use the
//! `GHOSTCACHE` prefix with `__` as the separator, e.g.
//! `GHOSTCACHE__GHOST__URL=https://demo.ghost.io`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::cache::{ContentCacheService, DEFAULT_PAGE_SIZE, ServiceOptions};
use crate::content::ContentKind;

const ENV_PREFIX: &str = "GHOSTCACHE";
const ENV_SEPARATOR: &str = "__";

/// Name of the settings section read by [`bootstrap`].
pub const GHOST_SECTION: &str = "ghost";

/// The `ghost` section.
///
/// ```toml
/// [ghost]
/// enabled = true
/// url = "https://demo.ghost.io"
/// key = "22444f78447824223cefc48062"
/// fetch_timeout_secs = 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GhostSettings {
    /// The service is only initialized when this is `true`.
    pub enabled: bool,
    pub url: String,
    pub key: String,
    pub posts_limit: usize,
    pub pages_limit: usize,
    pub page_size: usize,
    pub fetch_timeout_secs: Option<u64>,
    pub dedupe_in_flight: bool,
}

impl Default for GhostSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            key: String::new(),
            posts_limit: ContentKind::Posts.default_limit(),
            pages_limit: ContentKind::Pages.default_limit(),
            page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout_secs: None,
            dedupe_in_flight: false,
        }
    }
}

impl GhostSettings {
    /// Reads the `ghost` section; a missing section yields the defaults.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        match config.get::<Self>(GHOST_SECTION) {
            Ok(settings) => Ok(settings),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            page_size: self.page_size,
            fetch_timeout: self.fetch_timeout_secs.map(Duration::from_secs),
            dedupe_in_flight: self.dedupe_in_flight,
        }
    }

    /// Per-request item limit for `kind`.
    pub fn limit(&self, kind: ContentKind) -> usize {
        match kind {
            ContentKind::Posts => self.posts_limit,
            ContentKind::Pages => self.pages_limit,
        }
    }
}

/// Builds the layered configuration: an optional file, then environment.
///
/// # Errors
///
/// Fails if `path` is given but cannot be read or parsed.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()
}

/// Creates the content cache service from `config`.
///
/// Setup is best effort and never fails: an unreadable section or a client
/// that cannot be built is logged, and the service is returned uninitialized
/// so requests pass through with empty content.
pub fn bootstrap(config: &Config) -> Arc<ContentCacheService> {
    let settings = match GhostSettings::from_config(config) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid ghost settings; content cache disabled");
            return Arc::new(ContentCacheService::new());
        }
    };

    let service = Arc::new(ContentCacheService::with_options(settings.service_options()));
    if !settings.enabled {
        debug!("ghost content cache disabled by configuration");
        return service;
    }

    match service.init(&settings.url, &settings.key) {
        Ok(()) => info!(
            dedupe = settings.dedupe_in_flight,
            timeout_secs = ?settings.fetch_timeout_secs,
            "ghost content cache enabled"
        ),
        Err(e) => warn!(error = %e, "failed to initialize ghost content cache"),
    }
    service
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(source: &str) -> Config {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .unwrap()
    }

    #[test]
    fn missing_section_uses_defaults() {
        let settings = GhostSettings::from_config(&Config::default()).unwrap();
        assert_eq!(settings, GhostSettings::default());
        assert_eq!(settings.posts_limit, 10);
        assert_eq!(settings.pages_limit, 5);
        assert_eq!(settings.service_options(), ServiceOptions::default());
    }

    #[test]
    fn partial_section_fills_defaults() {
        let config = from_toml(
            r#"
            [ghost]
            enabled = true
            url = "https://demo.ghost.io"
            key = "abc"
            fetch_timeout_secs = 3
            "#,
        );
        let settings = GhostSettings::from_config(&config).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.limit(ContentKind::Posts), 10);
        assert_eq!(
            settings.service_options().fetch_timeout,
            Some(Duration::from_secs(3))
        );
        assert!(!settings.service_options().dedupe_in_flight);
    }

    #[test]
    fn overrides_take_precedence_over_file() {
        let config = Config::builder()
            .add_source(File::from_str("[ghost]\npages_limit = 2", FileFormat::Toml))
            .set_override("ghost.pages_limit", 7)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            GhostSettings::from_config(&config).unwrap().limit(ContentKind::Pages),
            7
        );
    }

    #[test]
    fn bootstrap_enabled_initializes() {
        let config = from_toml(
            r#"
            [ghost]
            enabled = true
            url = "http://127.0.0.1:2368"
            key = "abc"
            dedupe_in_flight = true
            "#,
        );
        let service = bootstrap(&config);
        assert!(service.is_initialized());
        assert!(service.options().dedupe_in_flight);
    }

    #[test]
    fn bootstrap_disabled_stays_uninitialized() {
        let config = from_toml("[ghost]\nenabled = false\nurl = \"http://localhost\"");
        assert!(!bootstrap(&config).is_initialized());
        assert!(!bootstrap(&Config::default()).is_initialized());
    }

    #[test]
    fn bootstrap_swallows_bad_settings() {
        let wrong_type = from_toml("[ghost]\nenabled = true\nposts_limit = \"many\"");
        assert!(!bootstrap(&wrong_type).is_initialized());

        let bad_url = from_toml("[ghost]\nenabled = true\nurl = \"not a url\"");
        assert!(!bootstrap(&bad_url).is_initialized());
    }

    #[test]
    fn load_without_file_succeeds() {
        assert!(load(None).is_ok());
    }

    #[test]
    fn load_with_missing_file_fails() {
        assert!(load(Some(Path::new("/nonexistent/ghostcache.toml"))).is_err());
    }
}
