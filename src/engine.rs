//! The Crawl engine (spec.md §4.4): a single-site pagination state machine
//! that walks the "next-page" chain from a starting URL, persisting every
//! previously-unseen installment.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extract::{ExtractError, Extractor};
use crate::fetch::{FetchError, PageFetcher};
use crate::models::SiteDef;
use crate::store::{CrawlStore, NewSiteUpdate, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no match for ref regexp")]
    NoRefMatch,
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("pagination loop detected")]
    PaginationLoop,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("cancelled")]
    Cancelled,
}

/// The result of one full crawl run (spec.md §4.4 "Outcome").
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub seen: u32,
    pub error: Option<String>,
}

/// Walks a single site's pagination chain.
pub struct CrawlEngine<'a> {
    store: &'a dyn CrawlStore,
    fetcher: &'a dyn PageFetcher,
    extractor: Extractor,
    max_iterations: Option<u32>,
}

impl<'a> CrawlEngine<'a> {
    pub fn new(
        store: &'a dyn CrawlStore,
        fetcher: &'a dyn PageFetcher,
        max_iterations: Option<u32>,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor: Extractor::new(),
            max_iterations,
        }
    }

    /// Runs the pagination state machine described in spec.md §4.4,
    /// returning once the chain terminates (normally, by loop guard, or by
    /// error) or cancellation fires.
    pub async fn run(
        &self,
        site_def: &SiteDef,
        start_url: &str,
        cancel: &CancellationToken,
    ) -> CrawlOutcome {
        let mut seen = 0u32;
        match self.run_inner(site_def, start_url, cancel, &mut seen).await {
            Ok(()) => CrawlOutcome { seen, error: None },
            Err(e) => CrawlOutcome {
                seen,
                error: Some(e.to_string()),
            },
        }
    }

    async fn run_inner(
        &self,
        site_def: &SiteDef,
        start_url: &str,
        cancel: &CancellationToken,
        seen: &mut u32,
    ) -> Result<(), EngineError> {
        let mut current_url = start_url.to_string();
        let mut iterations = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            if let Some(max) = self.max_iterations {
                if iterations >= max {
                    warn!(site_def_id = %site_def.id, iterations, "hit max_iterations safety bound");
                    return Ok(());
                }
            }
            iterations += 1;

            // Step 1: derive currentRef.
            let current_ref = Extractor::apply_regex_to_str(&current_url, &site_def.ref_regexp)
                .map_err(|_| EngineError::NoRefMatch)?;

            // Step 2: fetch currentURL.
            let response = self.fetcher.fetch(&current_url, cancel).await?;

            // Step 3: extract title.
            let title = self
                .extractor
                .apply(&response.body, &site_def.title_xpath, &site_def.title_regexp)?;

            debug!(site_def_id = %site_def.id, url = %current_url, site_ref = %current_ref, "visited page");

            // Step 4: check/persist SiteUpdate.
            match self
                .store
                .create_site_update(NewSiteUpdate {
                    site_def_id: site_def.id.clone(),
                    site_ref: current_ref.clone(),
                    url: current_url.clone(),
                    title,
                })
                .await
            {
                Ok(_) => *seen += 1,
                Err(StoreError::AlreadyExists) => {
                    debug!(site_def_id = %site_def.id, site_ref = %current_ref, "already seen, skipping persistence");
                }
                Err(e) => return Err(EngineError::Store(e)),
            }

            // Step 5: extract nextRef. Missing/empty/no-match is a normal
            // terminal condition, not an error.
            let next_ref = match self
                .extractor
                .apply(&response.body, &site_def.next_page_xpath, &site_def.ref_regexp)
            {
                Ok(r) if !r.is_empty() => r,
                _ => {
                    info!(site_def_id = %site_def.id, seen = *seen, "pagination chain exhausted");
                    return Ok(());
                }
            };

            // Step 6: compute nextURL.
            let next_url = site_def.url_for_ref(&next_ref);

            // Step 7: loop guard.
            if next_url == current_url {
                return Err(EngineError::PaginationLoop);
            }

            // Step 8: advance.
            current_url = next_url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchResponse;
    use crate::models::CrawlInfo;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn site_def() -> SiteDef {
        SiteDef {
            id: "sd-1".into(),
            name: "example".into(),
            active: true,
            start_url: "http://x/a".into(),
            url_template: "http://x/{}".into(),
            next_page_xpath: "//a[@rel='next']/@href".into(),
            ref_regexp: "/([^/]+)/?$".into(),
            title_xpath: "//title/text()".into(),
            title_regexp: "(.+)".into(),
        }
    }

    struct FixtureFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for FixtureFetcher {
        async fn fetch(
            &self,
            url: &str,
            _cancel: &CancellationToken,
        ) -> Result<FetchResponse, FetchError> {
            let body = self
                .pages
                .get(url)
                .cloned()
                .unwrap_or_else(|| panic!("no fixture for {url}"));
            Ok(FetchResponse {
                status: 200,
                body,
                retries_used: 0,
            })
        }
    }

    #[derive(Default)]
    struct MemStore {
        updates: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CrawlStore for MemStore {
        async fn get_active_site_defs(&self) -> crate::store::Result<Vec<SiteDef>> {
            unimplemented!()
        }
        async fn get_site_def(&self, _id: &str) -> crate::store::Result<SiteDef> {
            unimplemented!()
        }
        async fn get_last_url(&self, _id: &str) -> crate::store::Result<Option<String>> {
            Ok(None)
        }
        async fn get_site_update(
            &self,
            site_def_id: &str,
            site_ref: &str,
        ) -> crate::store::Result<Option<crate::models::SiteUpdate>> {
            let exists = self
                .updates
                .lock()
                .unwrap()
                .iter()
                .any(|(s, r)| s == site_def_id && r == site_ref);
            Ok(exists.then(|| crate::models::SiteUpdate {
                id: "x".into(),
                site_def_id: site_def_id.into(),
                site_ref: site_ref.into(),
                url: String::new(),
                title: String::new(),
                seen_at: chrono::Utc::now(),
            }))
        }
        async fn create_site_update(&self, update: NewSiteUpdate) -> crate::store::Result<String> {
            let mut updates = self.updates.lock().unwrap();
            if updates
                .iter()
                .any(|(s, r)| s == &update.site_def_id && r == &update.site_ref)
            {
                return Err(StoreError::AlreadyExists);
            }
            updates.push((update.site_def_id, update.site_ref));
            Ok("new-id".into())
        }
        async fn get_pending_crawl_infos(&self) -> crate::store::Result<Vec<CrawlInfo>> {
            Ok(vec![])
        }
        async fn get_crawl_infos(&self, _id: &str) -> crate::store::Result<Vec<CrawlInfo>> {
            Ok(vec![])
        }
        async fn create_crawl_info(&self, _id: &str, _url: &str) -> crate::store::Result<String> {
            unimplemented!()
        }
        async fn start_crawl_info(&self, _id: &str) -> crate::store::Result<()> {
            unimplemented!()
        }
        async fn end_crawl_info(&self, _id: &str, _error: &str, _seen: u32) -> crate::store::Result<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn scenario_1_single_page_no_next() {
        let mut pages = HashMap::new();
        pages.insert(
            "http://x/a".to_string(),
            "<html><head><title>Chapter A</title></head><body>no next</body></html>".to_string(),
        );
        let fetcher = FixtureFetcher { pages };
        let store = MemStore::default();
        let engine = CrawlEngine::new(&store, &fetcher, None);
        let outcome = engine
            .run(&site_def(), "http://x/a", &CancellationToken::new())
            .await;

        assert_eq!(outcome.seen, 1);
        assert!(outcome.error.is_none());
        assert_eq!(store.updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scenario_2_two_page_walk() {
        let mut pages = HashMap::new();
        pages.insert(
            "http://x/a".to_string(),
            r#"<html><head><title>A</title></head><body><a rel="next" href="http://x/b">n</a></body></html>"#.to_string(),
        );
        pages.insert(
            "http://x/b".to_string(),
            "<html><head><title>B</title></head><body>end</body></html>".to_string(),
        );
        let fetcher = FixtureFetcher { pages };
        let store = MemStore::default();
        let engine = CrawlEngine::new(&store, &fetcher, None);
        let outcome = engine
            .run(&site_def(), "http://x/a", &CancellationToken::new())
            .await;

        assert_eq!(outcome.seen, 2);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn scenario_4_loop_detection() {
        let mut pages = HashMap::new();
        pages.insert(
            "http://x/a".to_string(),
            r#"<html><head><title>A</title></head><body><a rel="next" href="http://x/a">n</a></body></html>"#.to_string(),
        );
        let fetcher = FixtureFetcher { pages };
        let store = MemStore::default();
        let engine = CrawlEngine::new(&store, &fetcher, None);
        let outcome = engine
            .run(&site_def(), "http://x/a", &CancellationToken::new())
            .await;

        assert_eq!(outcome.seen, 1);
        assert!(outcome.error.unwrap().contains("loop"));
    }

    #[tokio::test]
    async fn resumption_skips_already_seen_ref() {
        let mut pages = HashMap::new();
        pages.insert(
            "http://x/a".to_string(),
            r#"<html><head><title>A</title></head><body><a rel="next" href="http://x/b">n</a></body></html>"#.to_string(),
        );
        pages.insert(
            "http://x/b".to_string(),
            "<html><head><title>B</title></head><body>end</body></html>".to_string(),
        );
        let fetcher = FixtureFetcher { pages };
        let store = MemStore::default();
        store.updates.lock().unwrap().push(("sd-1".into(), "a".into()));

        let engine = CrawlEngine::new(&store, &fetcher, None);
        let outcome = engine
            .run(&site_def(), "http://x/a", &CancellationToken::new())
            .await;

        assert_eq!(outcome.seen, 1);
        assert!(outcome.error.is_none());
        assert_eq!(store.updates.lock().unwrap().len(), 2);
    }
}
