use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use psn_value::config::SyncConfig;
use psn_value::database_ops::catalog::{Catalog, Library};
use psn_value::database_ops::db::Db;
use psn_value::orchestrator::CatalogSync;
use psn_value::scoring::LibraryStats;
use psn_value::thumbnails::PassthroughThumbnails;
use psn_value::util::env;
use psn_value::worker_manager::{Enqueued, LocalTaskQueue, Task, TaskOutcome, TaskQueue};
use psstore_client::PsStoreClient;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "psn-value", version, about = "PlayStation Store catalog sync and value scoring")]
struct Cli {
    /// Optional override for the database URL
    #[arg(long, global = true)]
    db_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct LibraryArg {
    /// Library id or unique name
    #[arg(long, short)]
    library: String,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Register a storefront listing as a library
    LibraryAdd {
        #[arg(long)]
        name: String,
        /// Listing URL; the item count is appended to it when fetching
        #[arg(long)]
        url: String,
    },
    /// Fetch the listing and refresh every eligible item
    Sync(LibraryArg),
    /// Rescore stored items against the current library statistics
    Reweight(LibraryArg),
    /// Re-upload stored thumbnails and keep the new references
    RefreshThumbnails(LibraryArg),
    /// Print library statistics and the best value items
    Show {
        #[command(flatten)]
        target: LibraryArg,
        /// Number of items to list
        #[arg(long, default_value_t = 20)]
        top: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    psn_value::tracing::init_tracing("info")?;
    let cli = Cli::parse();

    let database_url = cli.db_url.clone().unwrap_or_else(env::db_url);
    env::preflight_check(
        "psn-value",
        &[],
        &["APP_ENV", "PSN_LISTING_SPACING_SECS", "PSN_ITEM_SPACING_SECS", "PSN_STORE_UA"],
    )?;
    let db = Db::connect(&database_url, 4).await?;
    let catalog = Catalog::new(db);

    match cli.command {
        Commands::LibraryAdd { name, url } => {
            url::Url::parse(&url).with_context(|| format!("invalid listing url {url}"))?;
            let cfg = SyncConfig::from_env();
            let lib = catalog
                .create_library(&name, &url, LibraryStats::from_ratings(&[], &cfg.scoring))
                .await
                .with_context(|| format!("creating library {name}"))?;
            info!(library_id = lib.id, name = %lib.name, "library-add: created");
            println!("{}\t{}", lib.id, lib.name);
        }
        Commands::Sync(target) => {
            let lib = resolve_library(&catalog, &target.library).await?;
            run_task(&catalog, Task::Sync { library_id: lib.id }).await?;
        }
        Commands::Reweight(target) => {
            let lib = resolve_library(&catalog, &target.library).await?;
            run_task(&catalog, Task::Reweight { library_id: lib.id }).await?;
        }
        Commands::RefreshThumbnails(target) => {
            let lib = resolve_library(&catalog, &target.library).await?;
            run_task(&catalog, Task::RefreshThumbnails { library_id: lib.id }).await?;
        }
        Commands::Show { target, top } => {
            let lib = resolve_library(&catalog, &target.library).await?;
            let synced = lib
                .last_updated
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "{} (#{}) mean={:.4} stdev={:.4} listed={} last_sync={}",
                lib.name, lib.id, lib.rating_mean, lib.rating_stdev, lib.total_results, synced
            );
            for item in catalog.top_items(lib.id, top.max(1)).await? {
                println!(
                    "{:>6} {:>6}  {:>8.3}  {:>7} {:>7}  {}",
                    item.base_value_score,
                    item.plus_value_score,
                    item.weighted_rating,
                    item.base_price,
                    item.plus_price,
                    item.name
                );
            }
        }
    }
    Ok(())
}

async fn resolve_library(catalog: &Catalog, selector: &str) -> Result<Library> {
    let found = match selector.trim().parse::<i64>() {
        Ok(id) => catalog.find_library(id).await?,
        Err(_) => catalog.find_library_by_name(selector.trim()).await?,
    };
    found.ok_or_else(|| anyhow!("no library matches {selector:?}"))
}

/// Dispatch through the task queue and wait; the CLI is the only caller here.
async fn run_task(catalog: &Catalog, task: Task) -> Result<()> {
    let cfg = SyncConfig::from_env();
    let client = PsStoreClient::new(cfg.store_config()).context("building store client")?;
    let sync = CatalogSync::new(
        catalog.clone(),
        Arc::new(client),
        Arc::new(PassthroughThumbnails),
        cfg,
    );
    let queue = LocalTaskQueue::new(sync);
    let handle = match queue.enqueue(task) {
        Enqueued::Started(handle) => handle,
        Enqueued::AlreadyRunning => bail!("{} already running for library {}", task.name(), task.library_id()),
    };
    match handle.await.context("task panicked")?? {
        TaskOutcome::Synced(r) => println!(
            "added={} updated={} skipped_bundle={} skipped_unreleased={} skipped_expected={} failed={}",
            r.added, r.updated, r.skipped_bundle, r.skipped_unreleased, r.skipped_expected, r.failed
        ),
        TaskOutcome::Reweighted(r) | TaskOutcome::ThumbnailsRefreshed(r) => println!(
            "updated={} skipped={} failed={}",
            r.updated, r.skipped, r.failed
        ),
    }
    Ok(())
}
