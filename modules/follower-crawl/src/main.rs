use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use follower_crawl::{
    load_credentials, pool_size, CrawlConfig, Crawler, PgDocumentStore, TwitterConnector,
};

/// Crawl the recent activity of every follower of an account.
#[derive(Parser, Debug)]
#[command(name = "follower-crawl", version)]
struct Cli {
    /// Screen name whose followers are crawled
    seed: String,
    /// Database that receives the activity documents
    database: String,
    /// Collection (table) inside the database
    collection: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("follower_crawl=info".parse()?)
                .add_directive("twitter_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = CrawlConfig::from_env()?;
    config.log_redacted();

    let credentials = load_credentials(&config.credentials_file)?;
    let workers = pool_size(config.max_workers, credentials.len());

    let run_id = Uuid::new_v4();
    info!(
        seed = cli.seed.as_str(),
        database = cli.database.as_str(),
        collection = cli.collection.as_str(),
        %run_id,
        "Follower crawl starting"
    );

    let store = PgDocumentStore::connect(
        &config.database_url,
        &cli.database,
        &cli.collection,
        run_id,
        u32::try_from(workers + 1).unwrap_or(u32::MAX),
    )
    .await?;
    store.ensure_collection().await?;

    let crawler = Crawler::new(Arc::new(TwitterConnector), Arc::new(store))
        .with_policy(config.retry_policy())
        .with_max_workers(config.max_workers)
        .with_run_id(run_id);

    let cancel = crawler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping crawl");
            cancel.cancel();
        }
    });

    let report = crawler.run(&cli.seed, &credentials).await?;
    info!(%report, "Crawl finished");
    for failure in &report.failures {
        warn!(follower = %failure.follower, kind = ?failure.kind, "Follower not crawled");
    }
    report.ensure_finished()?;

    Ok(())
}
