// Diesel table definitions for the crawl daemon's three entities
// (spec.md §3). Hand-written, not `diesel print-schema`-generated, since
// the schema is small and fixed by this crate's own migrations.

diesel::table! {
    site_defs (id) {
        id -> Text,
        name -> Text,
        active -> Bool,
        start_url -> Text,
        url_template -> Text,
        next_page_xpath -> Text,
        ref_regexp -> Text,
        title_xpath -> Text,
        title_regexp -> Text,
    }
}

diesel::table! {
    site_updates (id) {
        id -> Text,
        site_def_id -> Text,
        site_ref -> Text,
        url -> Text,
        title -> Text,
        seen_at -> Text,
    }
}

diesel::table! {
    crawl_infos (id) {
        id -> Text,
        site_def_id -> Text,
        url -> Text,
        created_at -> Text,
        started_at -> Nullable<Text>,
        ended_at -> Nullable<Text>,
        error -> Text,
        seen -> Integer,
    }
}

diesel::joinable!(site_updates -> site_defs (site_def_id));
diesel::joinable!(crawl_infos -> site_defs (site_def_id));

diesel::allow_tables_to_appear_in_same_query!(site_defs, site_updates, crawl_infos,);
