//! The Store contract (spec.md §4.1): transactional persistence of site
//! definitions, discovered installments, and crawl-run records.
//!
//! [`CrawlStore`] is the trait the daemon, engine, and CLI depend on; the
//! shipped implementation is [`diesel_store::DieselCrawlStore`]. Depending on
//! a trait here — rather than a concrete database type — is what makes the
//! engine and daemon loops testable without a real database.

pub mod diesel_store;
pub mod pool;
pub mod records;
pub mod util;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CrawlInfo, SiteDef, SiteUpdate};

pub use diesel_store::DieselCrawlStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("site def not found: {0}")]
    NotFound(String),
    #[error("site update already exists for this (site_def_id, ref)")]
    AlreadyExists,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The Store contract, spec.md §4.1.
#[async_trait]
pub trait CrawlStore: Send + Sync {
    async fn get_active_site_defs(&self) -> Result<Vec<SiteDef>>;
    async fn get_site_def(&self, id: &str) -> Result<SiteDef>;
    /// `url` of the most recent `SiteUpdate` for `site_def_id` (newest
    /// `seen_at` wins), or `None` if no updates exist yet.
    async fn get_last_url(&self, site_def_id: &str) -> Result<Option<String>>;
    async fn get_site_update(
        &self,
        site_def_id: &str,
        site_ref: &str,
    ) -> Result<Option<SiteUpdate>>;
    /// Inserts a new `SiteUpdate`, failing with [`StoreError::AlreadyExists`]
    /// if `(site_def_id, ref)` already exists.
    async fn create_site_update(&self, update: NewSiteUpdate) -> Result<String>;
    /// All `CrawlInfo` rows with `started_at IS NULL AND ended_at IS NULL`,
    /// ordered by `created_at` ascending (FIFO).
    async fn get_pending_crawl_infos(&self) -> Result<Vec<CrawlInfo>>;
    /// All `CrawlInfo` rows for a `SiteDef`, newest-first.
    async fn get_crawl_infos(&self, site_def_id: &str) -> Result<Vec<CrawlInfo>>;
    async fn create_crawl_info(&self, site_def_id: &str, url: &str) -> Result<String>;
    async fn start_crawl_info(&self, id: &str) -> Result<()>;
    async fn end_crawl_info(&self, id: &str, error: &str, seen: u32) -> Result<()>;
}

/// Parameters for [`CrawlStore::create_site_update`].
#[derive(Debug, Clone)]
pub struct NewSiteUpdate {
    pub site_def_id: String,
    pub site_ref: String,
    pub url: String,
    pub title: String,
}
