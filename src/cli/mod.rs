//! Command-line surface (spec.md §10 ambient stack): `run` starts the
//! daemon, `migrate` initializes the schema and exits, and the `site`
//! subcommands are a thin operator surface over [`crate::store::CrawlStore`].

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::models::SiteDef;
use crate::store::{CrawlStore, DieselCrawlStore};

#[derive(Debug, Parser)]
#[command(name = "crawld", version, about = "Scheduled pagination crawler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scheduler and worker loops until a shutdown signal arrives.
    Run,
    /// Initialize the schema and exit.
    Migrate,
    /// Manage site definitions.
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum SiteCommands {
    /// Register a new site definition.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        start_url: String,
        #[arg(long)]
        url_template: String,
        #[arg(long)]
        next_page_xpath: String,
        #[arg(long)]
        ref_regexp: String,
        #[arg(long)]
        title_xpath: String,
        #[arg(long)]
        title_regexp: String,
    },
    /// List all site definitions.
    List,
    /// Show crawl history for one site definition.
    Show {
        #[arg(long)]
        id: String,
    },
}

/// Runs the selected subcommand, returning the process exit code `main`
/// should use (spec.md §6: 1 on signal-triggered shutdown, 0 otherwise).
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<i32> {
    let store = DieselCrawlStore::from_dsn(&config.dsn)?;
    store.init_schema().await?;

    match cli.command {
        Commands::Run => {
            let recovered = store.recover_abandoned().await?;
            if recovered > 0 {
                tracing::warn!(recovered, "terminated crawl runs abandoned by a previous process");
            }
            let store: Arc<dyn CrawlStore> = Arc::new(store);
            match crate::daemon::run(config, store).await? {
                crate::daemon::ShutdownReason::Signal => Ok(1),
            }
        }
        Commands::Migrate => {
            tracing::info!("schema initialized");
            Ok(0)
        }
        Commands::Site { command } => {
            run_site_command(command, &store).await?;
            Ok(0)
        }
    }
}

async fn run_site_command(command: SiteCommands, store: &DieselCrawlStore) -> anyhow::Result<()> {
    match command {
        SiteCommands::Add {
            name,
            start_url,
            url_template,
            next_page_xpath,
            ref_regexp,
            title_xpath,
            title_regexp,
        } => {
            let def = SiteDef {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                active: true,
                start_url,
                url_template,
                next_page_xpath,
                ref_regexp,
                title_xpath,
                title_regexp,
            };
            store.create_site_def(&def).await?;
            println!("created site def {}", def.id);
            Ok(())
        }
        SiteCommands::List => {
            for site_def in store.get_all_site_defs().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    site_def.id, site_def.name, site_def.active, site_def.start_url
                );
            }
            Ok(())
        }
        SiteCommands::Show { id } => {
            let crawl_infos = store.get_crawl_infos(&id).await?;
            for ci in crawl_infos {
                println!(
                    "{}\t{:?}\t{:?}\t{}\t{}",
                    ci.id, ci.started_at, ci.ended_at, ci.seen, ci.error
                );
            }
            Ok(())
        }
    }
}
