//! Diesel-backed [`CrawlStore`], supporting SQLite (default) and PostgreSQL
//! (behind the `postgres` feature) through the [`super::pool::DbPool`]
//! dispatch adapted from this codebase's earlier `repository` layer.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};
use uuid::Uuid;

use crate::models::{CrawlInfo, SiteDef, SiteUpdate};
use crate::schema::{crawl_infos, site_defs, site_updates};
use crate::store::pool::{DbPool, SqliteConn};
use crate::store::records::{
    CrawlInfoRecord, NewCrawlInfo, NewSiteDef, NewSiteUpdate as NewSiteUpdateRecord,
    SiteDefRecord, SiteUpdateRecord,
};
use crate::store::util::is_unique_violation;
use crate::store::{CrawlStore, NewSiteUpdate, Result, StoreError};
use crate::{with_conn, with_conn_split};

/// The primary `CrawlStore` implementation. Create one per process and
/// share it (behind an `Arc`) across the scheduler, worker, and CLI.
#[derive(Clone)]
pub struct DieselCrawlStore {
    pool: DbPool,
}

impl DieselCrawlStore {
    /// Open a store against a SQLite file path.
    pub fn sqlite(path: &Path) -> Self {
        Self {
            pool: DbPool::sqlite_from_path(path),
        }
    }

    /// Open a store from a DSN (SQLite path, or `postgres://...` when built
    /// with the `postgres` feature).
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let pool = DbPool::from_url(dsn).map_err(StoreError::Database)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Create the three tables if they don't already exist. Used by tests
    /// and by `crawld migrate` as the SQLite fast path; production
    /// deployments should prefer the `cetane` migration registry
    /// ([`crate::migrations::registry`]) so schema changes are tracked.
    pub async fn init_schema(&self) -> Result<()> {
        with_conn_split!(self.pool,
            sqlite: conn => {
                Self::init_sqlite_schema(&mut conn).await
            },
            postgres: conn => {
                Self::init_postgres_schema(&mut conn).await
            }
        )
        .map_err(StoreError::Database)
    }

    async fn init_sqlite_schema(conn: &mut SqliteConn) -> std::result::Result<(), diesel::result::Error> {
        conn.batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS site_defs (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL UNIQUE,
                active INTEGER NOT NULL DEFAULT 1,
                start_url TEXT NOT NULL,
                url_template TEXT NOT NULL,
                next_page_xpath TEXT NOT NULL,
                ref_regexp TEXT NOT NULL,
                title_xpath TEXT NOT NULL,
                title_regexp TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS site_updates (
                id TEXT PRIMARY KEY NOT NULL,
                site_def_id TEXT NOT NULL,
                site_ref TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                seen_at TEXT NOT NULL,
                UNIQUE(site_def_id, site_ref)
            );
            CREATE TABLE IF NOT EXISTS crawl_infos (
                id TEXT PRIMARY KEY NOT NULL,
                site_def_id TEXT NOT NULL,
                url TEXT NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                ended_at TEXT,
                error TEXT NOT NULL DEFAULT '',
                seen INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_site_updates_site_def ON site_updates(site_def_id, seen_at);
            CREATE INDEX IF NOT EXISTS idx_crawl_infos_site_def ON crawl_infos(site_def_id, created_at);
            "#,
        )
        .await
    }

    #[cfg(feature = "postgres")]
    async fn init_postgres_schema(
        conn: &mut diesel_async::AsyncPgConnection,
    ) -> std::result::Result<(), diesel::result::Error> {
        let statements = [
            r#"CREATE TABLE IF NOT EXISTS site_defs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                start_url TEXT NOT NULL,
                url_template TEXT NOT NULL,
                next_page_xpath TEXT NOT NULL,
                ref_regexp TEXT NOT NULL,
                title_xpath TEXT NOT NULL,
                title_regexp TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS site_updates (
                id TEXT PRIMARY KEY,
                site_def_id TEXT NOT NULL REFERENCES site_defs(id),
                site_ref TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                seen_at TEXT NOT NULL,
                UNIQUE(site_def_id, site_ref)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS crawl_infos (
                id TEXT PRIMARY KEY,
                site_def_id TEXT NOT NULL REFERENCES site_defs(id),
                url TEXT NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                ended_at TEXT,
                error TEXT NOT NULL DEFAULT '',
                seen INTEGER NOT NULL DEFAULT 0
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_site_updates_site_def ON site_updates(site_def_id, seen_at)",
            "CREATE INDEX IF NOT EXISTS idx_crawl_infos_site_def ON crawl_infos(site_def_id, created_at)",
        ];

        for stmt in statements {
            diesel::sql_query(stmt).execute(conn).await?;
        }

        Ok(())
    }

    /// Startup recovery sweep (spec.md §8 invariant 5, §9 open question):
    /// terminate any `CrawlInfo` left `running` from a previous process so
    /// no row stays permanently running.
    pub async fn recover_abandoned(&self) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let n = with_conn!(self.pool, conn => {
            diesel::update(
                crawl_infos::table
                    .filter(crawl_infos::started_at.is_not_null())
                    .filter(crawl_infos::ended_at.is_null()),
            )
            .set((
                crawl_infos::ended_at.eq(Some(now.clone())),
                crawl_infos::error.eq("abandoned"),
                crawl_infos::seen.eq(0),
            ))
            .execute(&mut conn)
            .await
        })?;
        Ok(n)
    }

    /// Register a new `SiteDef` (operator surface, spec.md §10 CLI).
    pub async fn create_site_def(&self, def: &SiteDef) -> Result<()> {
        let new = NewSiteDef {
            id: &def.id,
            name: &def.name,
            active: def.active,
            start_url: &def.start_url,
            url_template: &def.url_template,
            next_page_xpath: &def.next_page_xpath,
            ref_regexp: &def.ref_regexp,
            title_xpath: &def.title_xpath,
            title_regexp: &def.title_regexp,
        };
        with_conn!(self.pool, conn => {
            diesel::insert_into(site_defs::table)
                .values(&new)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn get_all_site_defs(&self) -> Result<Vec<SiteDef>> {
        let records: Vec<SiteDefRecord> = with_conn!(self.pool, conn => {
            site_defs::table.load(&mut conn).await
        })?;
        Ok(records.into_iter().map(SiteDef::from).collect())
    }
}

#[async_trait]
impl CrawlStore for DieselCrawlStore {
    async fn get_active_site_defs(&self) -> Result<Vec<SiteDef>> {
        let records: Vec<SiteDefRecord> = with_conn!(self.pool, conn => {
            site_defs::table
                .filter(site_defs::active.eq(true))
                .load(&mut conn)
                .await
        })?;
        Ok(records.into_iter().map(SiteDef::from).collect())
    }

    async fn get_site_def(&self, id: &str) -> Result<SiteDef> {
        let record: Option<SiteDefRecord> = with_conn!(self.pool, conn => {
            site_defs::table
                .find(id)
                .first(&mut conn)
                .await
                .optional()
        })?;
        record
            .map(SiteDef::from)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_last_url(&self, site_def_id: &str) -> Result<Option<String>> {
        let url: Option<String> = with_conn!(self.pool, conn => {
            site_updates::table
                .filter(site_updates::site_def_id.eq(site_def_id))
                .order(site_updates::seen_at.desc())
                .select(site_updates::url)
                .first(&mut conn)
                .await
                .optional()
        })?;
        Ok(url)
    }

    async fn get_site_update(
        &self,
        site_def_id: &str,
        site_ref: &str,
    ) -> Result<Option<SiteUpdate>> {
        let record: Option<SiteUpdateRecord> = with_conn!(self.pool, conn => {
            site_updates::table
                .filter(site_updates::site_def_id.eq(site_def_id))
                .filter(site_updates::site_ref.eq(site_ref))
                .first(&mut conn)
                .await
                .optional()
        })?;
        Ok(record.map(SiteUpdate::from))
    }

    async fn create_site_update(&self, update: NewSiteUpdate) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let seen_at = Utc::now().to_rfc3339();
        let new = NewSiteUpdateRecord {
            id: &id,
            site_def_id: &update.site_def_id,
            site_ref: &update.site_ref,
            url: &update.url,
            title: &update.title,
            seen_at: &seen_at,
        };

        let result = with_conn!(self.pool, conn => {
            diesel::insert_into(site_updates::table)
                .values(&new)
                .execute(&mut conn)
                .await
        });

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_pending_crawl_infos(&self) -> Result<Vec<CrawlInfo>> {
        let records: Vec<CrawlInfoRecord> = with_conn!(self.pool, conn => {
            crawl_infos::table
                .filter(crawl_infos::started_at.is_null())
                .filter(crawl_infos::ended_at.is_null())
                .order(crawl_infos::created_at.asc())
                .load(&mut conn)
                .await
        })?;
        Ok(records.into_iter().map(CrawlInfo::from).collect())
    }

    async fn get_crawl_infos(&self, site_def_id: &str) -> Result<Vec<CrawlInfo>> {
        let records: Vec<CrawlInfoRecord> = with_conn!(self.pool, conn => {
            crawl_infos::table
                .filter(crawl_infos::site_def_id.eq(site_def_id))
                .order(crawl_infos::created_at.desc())
                .load(&mut conn)
                .await
        })?;
        Ok(records.into_iter().map(CrawlInfo::from).collect())
    }

    async fn create_crawl_info(&self, site_def_id: &str, url: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        let new = NewCrawlInfo {
            id: &id,
            site_def_id,
            url,
            created_at: &created_at,
            error: "",
            seen: 0,
        };
        with_conn!(self.pool, conn => {
            diesel::insert_into(crawl_infos::table)
                .values(&new)
                .execute(&mut conn)
                .await
        })?;
        Ok(id)
    }

    async fn start_crawl_info(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            diesel::update(crawl_infos::table.find(id))
                .set(crawl_infos::started_at.eq(Some(now)))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    async fn end_crawl_info(&self, id: &str, error: &str, seen: u32) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            diesel::update(crawl_infos::table.find(id))
                .set((
                    crawl_infos::ended_at.eq(Some(now)),
                    crawl_infos::error.eq(error),
                    crawl_infos::seen.eq(seen as i32),
                ))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }
}
