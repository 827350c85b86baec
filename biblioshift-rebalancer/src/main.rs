//! Biblioshift command line
//!
//! - `rebalance`: plan (and optionally apply) a coverage rebalance
//! - `seed`: load a catalog dataset and starting holdings
//! - `intake`: add copies of books to one library
//! - `migrate`: run database migrations

use anyhow::{Context, Result};
use biblioshift_inventory::{
    record_intake, seed, Catalog, CatalogStore, Database, HoldingsScenario, IntakeRequest,
    SeedOptions,
};
use biblioshift_rebalancer::report::{preview_book_ids, render};
use biblioshift_rebalancer::{parse_author_ids, PriorityMode, RebalanceError, Rebalancer, RebalancerConfig};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "biblioshift")]
#[command(about = "Spread book copies across libraries")]
#[command(version)]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a rebalance; dry run unless --apply is given
    Rebalance {
        /// Write the planned moves
        #[arg(long)]
        apply: bool,

        /// Never move into a library without free capacity
        #[arg(long)]
        capacity_aware: bool,

        /// Candidate order: none, year_desc or author_first
        #[arg(long)]
        priority: Option<PriorityMode>,

        /// Comma-separated author ids promoted by author_first
        #[arg(long)]
        authors: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Moves listed in the text report
        #[arg(long)]
        preview: Option<usize>,
    },

    /// Load a catalog dataset
    Seed {
        /// JSON dataset path
        path: PathBuf,

        /// Delete existing catalog and holdings first
        #[arg(long)]
        flush: bool,

        /// Starting holdings: none, all_to_first or random
        #[arg(long, default_value = "none")]
        holdings: HoldingsScenario,

        /// Extra copies per book for the random scenario
        #[arg(long)]
        random_copies: Option<usize>,
    },

    /// Add copies of books to one library
    Intake {
        /// Receiving library (defaults to the lowest id)
        #[arg(long)]
        library_id: Option<i64>,

        /// Comma-separated book ids (random books when omitted)
        #[arg(long, value_delimiter = ',')]
        book_ids: Vec<i64>,

        /// Random books picked when no ids are given
        #[arg(long, default_value = "10")]
        random_count: usize,

        /// Copies added per book
        #[arg(long, default_value = "1")]
        copies: i64,
    },

    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = RebalancerConfig::from_env_with(cli.database_url.clone())
        .context("Failed to load configuration")?;

    let db = Database::new(config.db_config())
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Migrate => {
            db.migrate().await.context("Migration failed")?;
            println!("Migrations applied.");
        }

        Commands::Rebalance {
            apply,
            capacity_aware,
            priority,
            authors,
            json,
            preview,
        } => {
            let mut options = config.options.clone();
            options.dry_run = !apply;
            options.capacity_aware |= capacity_aware;
            if let Some(priority) = priority {
                options.priority = priority;
            }
            if let Some(authors) = authors {
                options.authors = parse_author_ids(&authors)?;
            }

            info!(
                dry_run = options.dry_run,
                capacity_aware = options.capacity_aware,
                priority = %options.priority,
                "Starting rebalance"
            );

            let db = Arc::new(db);
            let rebalancer = Rebalancer::new(db.clone(), options)?;
            let report = match rebalancer.rebalance().await {
                Ok(report) => report,
                Err(RebalanceError::Apply { plan, source }) => {
                    error!(
                        moves = plan.total_moves(),
                        error = %source,
                        "Apply failed; no holdings were changed"
                    );
                    return Err(source).context("Rebalance apply failed");
                }
                Err(e) => return Err(e).context("Rebalance failed"),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let limit = preview.unwrap_or(config.preview_limit);
                let ids = preview_book_ids(&report, limit);
                let titles: HashMap<_, _> = db
                    .books(&ids)
                    .await?
                    .into_iter()
                    .map(|b| (b.id, b.title))
                    .collect();
                print!("{}", render(&report, &titles, limit));
            }
        }

        Commands::Seed {
            path,
            flush,
            holdings,
            random_copies,
        } => {
            let catalog = Catalog::from_path(&path)
                .with_context(|| format!("Failed to load dataset {}", path.display()))?;
            let scenario = match (holdings, random_copies) {
                (HoldingsScenario::Random { .. }, Some(extra_copies)) => {
                    HoldingsScenario::Random { extra_copies }
                }
                (scenario, _) => scenario,
            };

            let mut rng = StdRng::from_entropy();
            let report = seed(&db, &catalog, SeedOptions { flush, scenario }, &mut rng)
                .await
                .context("Seeding failed")?;
            println!("{}", report.imported.summary());
            println!("Starting holdings created: {}", report.holdings);
        }

        Commands::Intake {
            library_id,
            book_ids,
            random_count,
            copies,
        } => {
            let request = IntakeRequest {
                library_id,
                book_ids,
                random_count,
                copies,
            };
            let mut rng = StdRng::from_entropy();
            let report = record_intake(&db, request, &mut rng)
                .await
                .context("Intake failed")?;
            println!("{}", report.summary());
        }
    }

    Ok(())
}
