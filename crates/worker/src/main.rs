use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockrate_core::config::Settings;
use stockrate_core::domain::rating::NewRating;
use stockrate_core::ingest::{self, FeedWalker, HttpFeedSource, RatingLoader, RatingWriter};
use stockrate_core::storage::{PgRatingWriter, RecordStore};

#[derive(Debug, Parser)]
#[command(name = "stockrate_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Walk the upstream rating feed and append every item to `stocks`.
    Download {
        /// Continuation token to resume from. Empty starts at the first page.
        #[arg(long, default_value = "")]
        next_page: String,

        /// Stop after this many upstream calls.
        #[arg(long)]
        max_pages: Option<u64>,

        /// Fetch and normalize, but write nothing.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Download {
            next_page,
            max_pages,
            dry_run,
        } => {
            let res = download(&settings, next_page, max_pages, dry_run).await;
            if let Err(err) = &res {
                sentry_anyhow::capture_anyhow(err);
                tracing::error!(error = %err, "download failed");
            }
            res
        }
    }
}

async fn download(
    settings: &Settings,
    start_token: String,
    max_pages: Option<u64>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let source = HttpFeedSource::from_settings(settings)?;

    let sink = if dry_run {
        tracing::info!(dry_run = true, "records will be normalized but not written");
        Sink::Discard
    } else {
        let store = RecordStore::connect(settings).await?;
        if settings.run_migrations {
            stockrate_core::storage::migrate(store.pool()).await?;
        }
        Sink::Postgres(PgRatingWriter::new(store))
    };

    let mut walker = FeedWalker::new(source, start_token).with_max_pages(max_pages);
    let loader = RatingLoader::new(sink);

    let res = ingest::run(&mut walker, &loader).await;
    let metrics = walker.metrics();

    println!("calls: {}", metrics.calls);
    println!("items: {}", metrics.items);
    println!("elapsed: {:.3}s", metrics.elapsed.as_secs_f64());

    match res {
        Ok(report) => {
            if !walker.token().is_empty() {
                println!("resume with: --next-page {}", walker.token());
            }
            tracing::info!(
                calls = report.calls,
                items = report.items_observed,
                inserted = report.items_inserted,
                elapsed_ms = report.elapsed.as_millis() as u64,
                dry_run,
                "download finished"
            );
            Ok(())
        }
        Err(err) => {
            if !walker.token().is_empty() {
                println!("failed at token: {}", walker.token());
            }
            Err(err.into())
        }
    }
}

/// Where normalized records go: the store, or nowhere on a dry run.
enum Sink {
    Postgres(PgRatingWriter),
    Discard,
}

#[async_trait::async_trait]
impl RatingWriter for Sink {
    async fn insert_all(&self, records: &[NewRating]) -> stockrate_core::Result<u64> {
        match self {
            Sink::Postgres(writer) => writer.insert_all(records).await,
            Sink::Discard => {
                tracing::debug!(records = records.len(), "dry run; discarding page");
                Ok(0)
            }
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
