//! Domain data model (spec.md §3): `SiteDef`, `SiteUpdate`, `CrawlInfo`.
//!
//! These are the types every other module (store, engine, daemon, cli)
//! passes around; persistence-layer row types live in
//! [`crate::store::records`] and convert into these via `From`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier shared by all three entities.
pub type Id = String;

/// A registered publication and its per-site extraction rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDef {
    pub id: Id,
    pub name: String,
    pub active: bool,
    pub start_url: String,
    /// Format string with exactly one placeholder (`{}`), formatted with a
    /// captured `ref` to produce the page URL for that installment.
    pub url_template: String,
    /// XPath selector for the "next page" reference on a page.
    pub next_page_xpath: String,
    /// Regex (with at least one capture group) applied to a raw URL or
    /// XPath result to derive a `ref`.
    pub ref_regexp: String,
    /// XPath selector for the page title.
    pub title_xpath: String,
    /// Regex (with at least one capture group) applied to the XPath title
    /// result.
    pub title_regexp: String,
}

impl SiteDef {
    /// Format `url_template` with the given ref, producing the absolute URL
    /// for that installment.
    pub fn url_for_ref(&self, site_ref: &str) -> String {
        if self.url_template.contains("{}") {
            self.url_template.replacen("{}", site_ref, 1)
        } else {
            // printf-style `%s` template, matching the original source's
            // `fmt.Sprintf(def.URLTemplate, ref)` convention.
            self.url_template.replacen("%s", site_ref, 1)
        }
    }
}

/// One discovered installment of a `SiteDef`, unique on `(site_def_id, ref)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteUpdate {
    pub id: Id,
    pub site_def_id: Id,
    pub site_ref: String,
    pub url: String,
    pub title: String,
    pub seen_at: DateTime<Utc>,
}

/// One scheduled/executing/completed crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlInfo {
    pub id: Id,
    pub site_def_id: Id,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: String,
    pub seen: u32,
}

/// Lifecycle state derived from `started_at`/`ended_at` nullability —
/// never persisted as its own column (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Pending,
    Running,
    Terminal,
}

impl CrawlInfo {
    pub fn state(&self) -> CrawlState {
        match (self.started_at, self.ended_at) {
            (None, None) => CrawlState::Pending,
            (Some(_), None) => CrawlState::Running,
            (Some(_), Some(_)) => CrawlState::Terminal,
            (None, Some(_)) => CrawlState::Terminal,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == CrawlState::Pending
    }

    pub fn is_terminal(&self) -> bool {
        self.state() == CrawlState::Terminal
    }
}
