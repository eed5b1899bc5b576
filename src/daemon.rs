//! The Daemon (spec.md §4.5): a scheduler loop that enqueues due `CrawlInfo`
//! rows and a worker loop that drains them, run concurrently until a signal
//! requests shutdown.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::CrawlEngine;
use crate::fetch::HttpFetcher;
use crate::store::CrawlStore;

/// Why the daemon stopped running its loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A SIGINT/SIGTERM arrived and both loops wound down in response.
    Signal,
}

/// Runs the scheduler and worker loops until a shutdown signal arrives,
/// returning once both have wound down.
pub async fn run(config: Config, store: Arc<dyn CrawlStore>) -> anyhow::Result<ShutdownReason> {
    let cancel = CancellationToken::new();

    let scheduler = tokio::spawn(scheduler_loop(
        config.clone(),
        store.clone(),
        cancel.clone(),
    ));
    let worker = tokio::spawn(worker_loop(config.clone(), store.clone(), cancel.clone()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, cancelling in-flight work");
    cancel.cancel();

    let (scheduler_res, worker_res) = tokio::join!(scheduler, worker);
    scheduler_res.map_err(|e| anyhow::anyhow!("scheduler task panicked: {e}"))??;
    worker_res.map_err(|e| anyhow::anyhow!("worker task panicked: {e}"))??;

    Ok(ShutdownReason::Signal)
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Enqueues a `CrawlInfo` for every active `SiteDef` that is due, per the
/// resolved due-policy (spec.md §9): a site is due once
/// `now() >= last terminal CrawlInfo's ended_at + CheckIntervalSecs`, or it
/// has never been crawled.
async fn scheduler_loop(
    config: Config,
    store: Arc<dyn CrawlStore>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        if let Err(e) = schedule_work_once(&config, store.as_ref()).await {
            error!(error = %e, "scheduling pass failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(config.schedule_interval()) => {}
            _ = cancel.cancelled() => return Ok(()),
        }
    }
}

async fn schedule_work_once(config: &Config, store: &dyn CrawlStore) -> anyhow::Result<()> {
    let site_defs = store.get_active_site_defs().await?;
    let pending_site_def_ids: std::collections::HashSet<_> = store
        .get_pending_crawl_infos()
        .await?
        .into_iter()
        .map(|ci| ci.site_def_id)
        .collect();
    let now = Utc::now();

    for site_def in site_defs {
        if pending_site_def_ids.contains(&site_def.id) {
            continue;
        }

        let crawl_infos = store.get_crawl_infos(&site_def.id).await?;
        let last_terminal = crawl_infos.iter().find(|ci| ci.is_terminal());

        let due = match last_terminal {
            None => true,
            Some(last) => match last.ended_at {
                Some(ended_at) => now >= ended_at + config.check_interval(),
                None => true,
            },
        };

        if !due {
            continue;
        }

        let start_url = store
            .get_last_url(&site_def.id)
            .await?
            .unwrap_or_else(|| site_def.start_url.clone());

        store.create_crawl_info(&site_def.id, &start_url).await?;
        info!(site_def_id = %site_def.id, url = %start_url, "scheduled crawl");
    }

    Ok(())
}

/// Drains pending `CrawlInfo` rows FIFO, running each through the crawl
/// engine and always recording a terminal outcome (spec.md §4.5).
async fn worker_loop(
    config: Config,
    store: Arc<dyn CrawlStore>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(
        config.user_agent.clone(),
        config.fetch_timeout(),
        config.fetch_retries,
        config.fetch_retry_wait(),
    )?);

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let pending = store.get_pending_crawl_infos().await?;
        if pending.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(config.work_poll_interval()) => {}
                _ = cancel.cancelled() => return Ok(()),
            }
            continue;
        }

        for crawl_info in pending {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if let Err(e) = run_one(
                store.clone(),
                fetcher.clone(),
                &crawl_info,
                config.max_iterations,
                cancel.clone(),
            )
            .await
            {
                error!(crawl_info_id = %crawl_info.id, error = %e, "crawl run failed unexpectedly");
            }
        }
    }
}

/// Runs one crawl on its own task so a panic inside the engine can't take
/// down the worker loop — the panic surfaces as a `JoinError`, which is
/// treated exactly like any other crawl error so `EndCrawlInfo` still runs
/// (spec.md §4.5, "panic in worker").
async fn run_one(
    store: Arc<dyn CrawlStore>,
    fetcher: Arc<HttpFetcher>,
    crawl_info: &crate::models::CrawlInfo,
    max_iterations: Option<u32>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    store.start_crawl_info(&crawl_info.id).await?;
    let site_def = store.get_site_def(&crawl_info.site_def_id).await?;

    let crawl_info_id = crawl_info.id.clone();
    let start_url = crawl_info.url.clone();
    let task_store = store.clone();
    let handle = tokio::spawn(async move {
        let engine = CrawlEngine::new(task_store.as_ref(), fetcher.as_ref(), max_iterations);
        engine.run(&site_def, &start_url, &cancel).await
    });

    let (seen, error) = match handle.await {
        Ok(outcome) => (outcome.seen, outcome.error),
        Err(join_err) => (0, Some(format!("panicked: {join_err}"))),
    };

    if let Some(ref err) = error {
        warn!(crawl_info_id = %crawl_info_id, seen, error = %err, "crawl run ended with error");
    } else {
        info!(crawl_info_id = %crawl_info_id, seen, "crawl run completed");
    }

    store
        .end_crawl_info(&crawl_info_id, error.as_deref().unwrap_or(""), seen)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlInfo, SiteDef, SiteUpdate};
    use crate::store::{NewSiteUpdate, StoreError};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        site_defs: Vec<SiteDef>,
        crawl_infos: Mutex<Vec<CrawlInfo>>,
        created: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CrawlStore for FakeStore {
        async fn get_active_site_defs(&self) -> crate::store::Result<Vec<SiteDef>> {
            Ok(self.site_defs.clone())
        }
        async fn get_site_def(&self, id: &str) -> crate::store::Result<SiteDef> {
            self.site_defs
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        }
        async fn get_last_url(&self, _id: &str) -> crate::store::Result<Option<String>> {
            Ok(None)
        }
        async fn get_site_update(
            &self,
            _site_def_id: &str,
            _site_ref: &str,
        ) -> crate::store::Result<Option<SiteUpdate>> {
            Ok(None)
        }
        async fn create_site_update(&self, _update: NewSiteUpdate) -> crate::store::Result<String> {
            Ok("su-1".into())
        }
        async fn get_pending_crawl_infos(&self) -> crate::store::Result<Vec<CrawlInfo>> {
            Ok(self
                .crawl_infos
                .lock()
                .unwrap()
                .iter()
                .filter(|ci| ci.is_pending())
                .cloned()
                .collect())
        }
        async fn get_crawl_infos(&self, site_def_id: &str) -> crate::store::Result<Vec<CrawlInfo>> {
            Ok(self
                .crawl_infos
                .lock()
                .unwrap()
                .iter()
                .filter(|ci| ci.site_def_id == site_def_id)
                .cloned()
                .collect())
        }
        async fn create_crawl_info(&self, site_def_id: &str, url: &str) -> crate::store::Result<String> {
            self.created
                .lock()
                .unwrap()
                .push((site_def_id.to_string(), url.to_string()));
            Ok("ci-new".into())
        }
        async fn start_crawl_info(&self, _id: &str) -> crate::store::Result<()> {
            Ok(())
        }
        async fn end_crawl_info(&self, _id: &str, _error: &str, _seen: u32) -> crate::store::Result<()> {
            Ok(())
        }
    }

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

    #[tokio::test]
    async fn never_crawled_site_is_always_due() {
        let config = Config {
            dsn: String::new(),
            user_agent: "ua".into(),
            fetch_timeout_secs: 1,
            check_interval_secs: 3600,
            work_poll_interval_secs: 1,
            schedule_interval_secs: 1,
            fetch_retries: 0,
            fetch_retry_wait_secs: 0,
            max_iterations: None,
        };
        let store = FakeStore {
            site_defs: vec![site_def()],
            ..Default::default()
        };

        schedule_work_once(&config, &store).await.unwrap();
        assert_eq!(store.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recently_completed_site_is_not_due() {
        let config = Config {
            dsn: String::new(),
            user_agent: "ua".into(),
            fetch_timeout_secs: 1,
            check_interval_secs: 3600,
            work_poll_interval_secs: 1,
            schedule_interval_secs: 1,
            fetch_retries: 0,
            fetch_retry_wait_secs: 0,
            max_iterations: None,
        };
        let now = Utc::now();
        let store = FakeStore {
            site_defs: vec![site_def()],
            crawl_infos: Mutex::new(vec![CrawlInfo {
                id: "ci-1".into(),
                site_def_id: "sd-1".into(),
                url: "http://x/a".into(),
                created_at: now - ChronoDuration::seconds(120),
                started_at: Some(now - ChronoDuration::seconds(100)),
                ended_at: Some(now - ChronoDuration::seconds(10)),
                error: String::new(),
                seen: 1,
            }]),
            ..Default::default()
        };

        schedule_work_once(&config, &store).await.unwrap();
        assert!(store.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn site_with_pending_crawl_info_is_not_rescheduled() {
        let config = Config {
            dsn: String::new(),
            user_agent: "ua".into(),
            fetch_timeout_secs: 1,
            check_interval_secs: 3600,
            work_poll_interval_secs: 1,
            schedule_interval_secs: 1,
            fetch_retries: 0,
            fetch_retry_wait_secs: 0,
            max_iterations: None,
        };
        let now = Utc::now();
        let store = FakeStore {
            site_defs: vec![site_def()],
            crawl_infos: Mutex::new(vec![CrawlInfo {
                id: "ci-1".into(),
                site_def_id: "sd-1".into(),
                url: "http://x/a".into(),
                created_at: now - ChronoDuration::seconds(5),
                started_at: None,
                ended_at: None,
                error: String::new(),
                seen: 0,
            }]),
            ..Default::default()
        };

        schedule_work_once(&config, &store).await.unwrap();
        assert!(store.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn site_past_check_interval_is_due_again() {
        let config = Config {
            dsn: String::new(),
            user_agent: "ua".into(),
            fetch_timeout_secs: 1,
            check_interval_secs: 60,
            work_poll_interval_secs: 1,
            schedule_interval_secs: 1,
            fetch_retries: 0,
            fetch_retry_wait_secs: 0,
            max_iterations: None,
        };
        let now = Utc::now();
        let store = FakeStore {
            site_defs: vec![site_def()],
            crawl_infos: Mutex::new(vec![CrawlInfo {
                id: "ci-1".into(),
                site_def_id: "sd-1".into(),
                url: "http://x/a".into(),
                created_at: now - ChronoDuration::seconds(7200),
                started_at: Some(now - ChronoDuration::seconds(7100)),
                ended_at: Some(now - ChronoDuration::seconds(7000)),
                error: String::new(),
                seen: 1,
            }]),
            ..Default::default()
        };

        schedule_work_once(&config, &store).await.unwrap();
        assert_eq!(store.created.lock().unwrap().len(), 1);
    }
}
