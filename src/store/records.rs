//! Diesel ORM row types for the three tables in [`crate::schema`].
//!
//! These convert to/from the domain types in [`crate::models`] via `From`,
//! matching the conversion pattern this codebase's predecessor used for its
//! `SourceRecord -> Source` mapping.

use diesel::prelude::*;

use crate::models::{CrawlInfo, SiteDef, SiteUpdate};
use crate::schema::{crawl_infos, site_defs, site_updates};
use crate::store::util::{parse_datetime, parse_datetime_opt};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = site_defs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SiteDefRecord {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub start_url: String,
    pub url_template: String,
    pub next_page_xpath: String,
    pub ref_regexp: String,
    pub title_xpath: String,
    pub title_regexp: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = site_defs)]
pub struct NewSiteDef<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub active: bool,
    pub start_url: &'a str,
    pub url_template: &'a str,
    pub next_page_xpath: &'a str,
    pub ref_regexp: &'a str,
    pub title_xpath: &'a str,
    pub title_regexp: &'a str,
}

impl From<SiteDefRecord> for SiteDef {
    fn from(r: SiteDefRecord) -> Self {
        SiteDef {
            id: r.id,
            name: r.name,
            active: r.active,
            start_url: r.start_url,
            url_template: r.url_template,
            next_page_xpath: r.next_page_xpath,
            ref_regexp: r.ref_regexp,
            title_xpath: r.title_xpath,
            title_regexp: r.title_regexp,
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = site_updates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SiteUpdateRecord {
    pub id: String,
    pub site_def_id: String,
    pub site_ref: String,
    pub url: String,
    pub title: String,
    pub seen_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = site_updates)]
pub struct NewSiteUpdate<'a> {
    pub id: &'a str,
    pub site_def_id: &'a str,
    pub site_ref: &'a str,
    pub url: &'a str,
    pub title: &'a str,
    pub seen_at: &'a str,
}

impl From<SiteUpdateRecord> for SiteUpdate {
    fn from(r: SiteUpdateRecord) -> Self {
        SiteUpdate {
            id: r.id,
            site_def_id: r.site_def_id,
            site_ref: r.site_ref,
            url: r.url,
            title: r.title,
            seen_at: parse_datetime(&r.seen_at),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crawl_infos)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CrawlInfoRecord {
    pub id: String,
    pub site_def_id: String,
    pub url: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub error: String,
    pub seen: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crawl_infos)]
pub struct NewCrawlInfo<'a> {
    pub id: &'a str,
    pub site_def_id: &'a str,
    pub url: &'a str,
    pub created_at: &'a str,
    pub error: &'a str,
    pub seen: i32,
}

impl From<CrawlInfoRecord> for CrawlInfo {
    fn from(r: CrawlInfoRecord) -> Self {
        CrawlInfo {
            id: r.id,
            site_def_id: r.site_def_id,
            url: r.url,
            created_at: parse_datetime(&r.created_at),
            started_at: parse_datetime_opt(r.started_at),
            ended_at: parse_datetime_opt(r.ended_at),
            error: r.error,
            seen: r.seen.max(0) as u32,
        }
    }
}
