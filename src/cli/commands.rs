use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pricewatch", about = "Retail price monitoring and storefront repricing")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the price of every monitored product once
    Check,
    /// Decide and publish a price for every (variant, region) group
    Aggregate,
    /// Check, wait for every check to finish, then aggregate
    Run,
    /// Run a full cycle on a fixed cadence until interrupted
    Serve {
        /// Seconds between cycles (defaults to PRICEWATCH_SCHEDULE_SECS)
        #[arg(long)]
        every: Option<u64>,
    },
    /// Start monitoring a retailer product page
    MonitorAdd {
        /// Product page URL
        url: String,
        /// Storefront variant id
        variant: String,
        /// Region id
        region: String,
        /// Retailer tag; resolved from the URL host when omitted
        #[arg(long)]
        retailer: Option<String>,
    },
    /// List monitored products
    MonitorList,
    /// Stop monitoring a product
    MonitorRemove {
        /// Monitored product id
        id: i64,
    },
    /// Show grouped price history
    History {
        #[arg(long)]
        variant: Option<String>,
        #[arg(long)]
        region: Option<String>,
        /// History window (all, latest, <n>h, <n>d); defaults to the configured one
        #[arg(long)]
        window: Option<String>,
    },
    /// Show proxy health
    Proxies,
    /// List retailer routes
    Retailers,
}
