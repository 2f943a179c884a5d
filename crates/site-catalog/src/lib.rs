//! Data access for the OpenSanctions website.
//!
//! This crate provides:
//! - A client for the catalog index, the issues feed and the entity API
//! - Reshaping of the index into datasets and per-dataset details
//! - Layered configuration of the remote endpoints
//! - A mock client serving canned responses for tests
//!
//! ## Usage
//!
//! ```ignore
//! use site_catalog::{CatalogClient, CatalogClientConfig, ClientTrait};
//!
//! let client = CatalogClient::new(CatalogClientConfig::load(None)?)?;
//! let dataset = client.get_dataset_by_name("eu_fsf").await?;
//! let issues = client.get_dataset_issues(dataset.as_ref()).await?;
//! ```

mod client;
mod config;
mod error;
pub mod markdown;
pub mod mock;
pub mod types;

pub use client::{CachePreference, CatalogClient, Client, ClientTrait};
pub use config::{
    CatalogClientConfig,
    DEFAULT_API_URL,
    DEFAULT_BASE_URL,
    DEFAULT_INDEX_URL,
    DEFAULT_ISSUES_URL,
    SITE_CATALOG_ENV_PREFIX,
};
pub use error::CatalogClientError;
pub use mock::MockClient;
pub use types::{Collection, Dataset, DatasetDetails, Entity, Index, Issue, Source};
