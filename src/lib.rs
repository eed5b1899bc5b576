//! `crawld` — a daemon that schedules and runs per-site pagination crawls,
//! persisting each newly discovered installment as a durable [`models::SiteUpdate`].
//!
//! The crate is organized bottom-up, mirroring the five components of the
//! design: a storage contract ([`store`]), an HTTP fetcher ([`fetch`]), an
//! HTML/XPath/regex extractor ([`extract`]), a single-site pagination engine
//! ([`engine`]), and the daemon itself ([`daemon`]) which composes the above
//! into a scheduler loop and a worker loop.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod extract;
pub mod fetch;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod store;
