//! Resale Scout command line
//!
//! Thin front over [`ComparisonService`]: every command loads the layered
//! configuration, initializes logging and prints its result as JSON on stdout.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use resale_scout::domain::{Marketplace, ProductRecord};
use resale_scout::error::Failure;
use resale_scout::infrastructure::config::ConfigManager;
use resale_scout::infrastructure::logging::{init_logging_with_config, log_system_info};
use resale_scout::matching::BatchProgress;
use resale_scout::services::ComparisonService;

/// Resale Scout CLI.
#[derive(Parser)]
#[command(name = "resale-scout")]
#[command(about = "Find the same product on other marketplaces and estimate resale profit")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the candidates extracted from a search results page
    Scan {
        url: Url,

        /// Treat the URL as a category page and list its source products
        #[arg(long)]
        category: bool,
    },

    /// Match one product against a search results page
    Match {
        url: Url,

        #[arg(long)]
        title: String,

        #[arg(long)]
        price: Option<Decimal>,

        #[arg(long)]
        brand: Option<String>,

        /// Marketplace the product comes from
        #[arg(long, default_value = "amazon")]
        marketplace: Marketplace,

        #[arg(long, default_value = "")]
        product_id: String,
    },

    /// Resolve a JSON list of products against one marketplace
    Batch {
        products: PathBuf,

        #[arg(long)]
        target: Marketplace,
    },

    /// Compare a JSON product against other marketplaces via the data API
    Compare {
        product: PathBuf,

        /// Comma separated, e.g. walmart,target
        #[arg(long, value_delimiter = ',', default_values_t = [Marketplace::Walmart, Marketplace::Target, Marketplace::HomeDepot])]
        targets: Vec<Marketplace>,
    },

    /// Remove every cached comparison
    CacheClear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_layered().await?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging_with_config(&config.logging)?;
    log_system_info();

    let service = ComparisonService::from_config(config)?;

    if let Err(e) = run(cli.command, &service).await {
        error!("Command failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(command: Commands, service: &ComparisonService) -> Result<()> {
    match command {
        Commands::Scan { url, category } => {
            if category {
                let products = service.scan_category_page(&url).await?;
                info!("{} source products on {}", products.len(), url);
                print_json(&products)
            } else {
                let page = service.load_page(&url).await?;
                match service.scan_page(page).await {
                    Ok(scan) => print_json(&scan),
                    Err(e) => print_json(&Failure::from(&e)),
                }
            }
        }
        Commands::Match {
            url,
            title,
            price,
            brand,
            marketplace,
            product_id,
        } => {
            let mut product = ProductRecord::new(marketplace, product_id, title);
            product.price = price;
            product.brand = brand;

            let page = service.load_page(&url).await?;
            let outcome = service.compare_on_page(&product, page).await?;
            print_json(&outcome)
        }
        Commands::Batch { products, target } => {
            let products: Vec<ProductRecord> = read_json(&products).await?;
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current product");
                    on_signal.cancel();
                }
            });

            let report = |progress: &BatchProgress| {
                info!(
                    "[{:>5.1}%] {}/{} '{}' -> {} matches",
                    progress.percentage, progress.completed, progress.total, progress.current_product, progress.matches_found
                );
            };
            let result = service.run_category_batch(&products, target, Some(&report), &cancel).await?;
            print_json(&result)
        }
        Commands::Compare { product, targets } => {
            let product: ProductRecord = read_json(&product).await?;
            match service.compare(&product, &targets).await {
                Ok(result) => print_json(&result),
                Err(e) => print_json(&Failure::from(&e)),
            }
        }
        Commands::CacheClear => {
            let removed = service.clear_cache().await?;
            println!("Removed {removed} cached entries");
            Ok(())
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
