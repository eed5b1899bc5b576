use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE site_defs (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1,
    start_url TEXT NOT NULL,
    url_template TEXT NOT NULL,
    next_page_xpath TEXT NOT NULL,
    ref_regexp TEXT NOT NULL,
    title_xpath TEXT NOT NULL,
    title_regexp TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
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
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE site_updates (
    id TEXT PRIMARY KEY NOT NULL,
    site_def_id TEXT NOT NULL REFERENCES site_defs(id) ON DELETE CASCADE,
    site_ref TEXT NOT NULL,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    seen_at TEXT NOT NULL,
    UNIQUE(site_def_id, site_ref)
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS site_updates (
    id TEXT PRIMARY KEY,
    site_def_id TEXT NOT NULL REFERENCES site_defs(id) ON DELETE CASCADE,
    site_ref TEXT NOT NULL,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    seen_at TEXT NOT NULL,
    UNIQUE(site_def_id, site_ref)
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE crawl_infos (
    id TEXT PRIMARY KEY NOT NULL,
    site_def_id TEXT NOT NULL REFERENCES site_defs(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    started_at TEXT,
    ended_at TEXT,
    error TEXT NOT NULL DEFAULT '',
    seen INTEGER NOT NULL DEFAULT 0
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS crawl_infos (
    id TEXT PRIMARY KEY,
    site_def_id TEXT NOT NULL REFERENCES site_defs(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    started_at TEXT,
    ended_at TEXT,
    error TEXT NOT NULL DEFAULT '',
    seen INTEGER NOT NULL DEFAULT 0
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    "CREATE INDEX idx_site_updates_site_def ON site_updates(site_def_id, seen_at)",
                )
                .for_backend(
                    "postgres",
                    "CREATE INDEX idx_site_updates_site_def ON site_updates(site_def_id, seen_at)",
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    "CREATE INDEX idx_crawl_infos_site_def ON crawl_infos(site_def_id, created_at)",
                )
                .for_backend(
                    "postgres",
                    "CREATE INDEX idx_crawl_infos_site_def ON crawl_infos(site_def_id, created_at)",
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    "CREATE INDEX idx_crawl_infos_pending ON crawl_infos(created_at) WHERE started_at IS NULL AND ended_at IS NULL",
                )
                .for_backend(
                    "postgres",
                    "CREATE INDEX idx_crawl_infos_pending ON crawl_infos(created_at) WHERE started_at IS NULL AND ended_at IS NULL",
                ),
        )
}
