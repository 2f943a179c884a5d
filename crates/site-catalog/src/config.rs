//! Configuration types for catalog client construction.

use std::collections::BTreeMap;
use std::path::Path;

use config::{Config as HierarchicalConfig, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::CatalogClientError;

/// Prefix of environment variables overriding configuration values,
/// e.g. `SITE_CATALOG_INDEX_URL`.
pub const SITE_CATALOG_ENV_PREFIX: &str = "SITE_CATALOG";

pub const DEFAULT_BASE_URL: &str = "https://www.opensanctions.org";
pub const DEFAULT_API_URL: &str = "https://api.opensanctions.org";
pub const DEFAULT_INDEX_URL: &str = "https://data.opensanctions.org/datasets/latest/index.json";
pub const DEFAULT_ISSUES_URL: &str = "https://data.opensanctions.org/datasets/latest/issues.json";

/// Configuration for catalog client construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogClientConfig {
    /// Prefix of absolute site URLs, combined with a dataset's `link`.
    /// Never fetched.
    ///
    /// Trailing slashes are dropped before joining, so a dataset's
    /// `opensanctions_url` is `base_url` without trailing `/` followed by its
    /// `link`.
    pub base_url: String,
    /// Base URL of the entity API.
    pub api_url: String,
    /// Location of the catalog index (datasets and model).
    pub index_url: String,
    /// Location of the issues feed.
    pub issues_url: String,
    /// Additional headers to include in requests.
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for CatalogClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            index_url: DEFAULT_INDEX_URL.to_string(),
            issues_url: DEFAULT_ISSUES_URL.to_string(),
            extra_headers: BTreeMap::new(),
            user_agent: None,
        }
    }
}

impl CatalogClientConfig {
    /// Read configuration from defaults, an optional TOML file and
    /// `SITE_CATALOG_*` environment variables, later sources taking precedence.
    ///
    /// A file that is passed explicitly must exist.
    pub fn load(config_file: Option<&Path>) -> Result<Self, CatalogClientError> {
        let defaults = Self::default();
        let mut builder = HierarchicalConfig::builder()
            .set_default("base_url", defaults.base_url)?
            .set_default("api_url", defaults.api_url)?
            .set_default("index_url", defaults.index_url)?
            .set_default("issues_url", defaults.issues_url)?;

        if let Some(path) = config_file {
            debug!(path = %path.display(), "reading catalog config file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let builder = builder.add_source(Environment::with_prefix(SITE_CATALOG_ENV_PREFIX));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every configured endpoint is an absolute URL.
    pub fn validate(&self) -> Result<(), CatalogClientError> {
        for (field, value) in [
            ("base_url", &self.base_url),
            ("api_url", &self.api_url),
            ("index_url", &self.index_url),
            ("issues_url", &self.issues_url),
        ] {
            Url::parse(value).map_err(|source| CatalogClientError::InvalidUrl { field, source })?;
        }
        Ok(())
    }
}
