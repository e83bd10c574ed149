use clap::Parser;
use pricewatch::cli::commands::{Cli, Commands};
use pricewatch::config::PipelineConfig;
use pricewatch::domain::error::DomainError;
use pricewatch::domain::ports::sample_store::HistoryFilter;
use pricewatch::domain::values::history_window::HistoryWindow;
use pricewatch::domain::values::ids::{RegionId, VariantId};
use pricewatch::PriceWatch;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricewatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match PipelineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let pw = match PriceWatch::new(&config) {
        Ok(pw) => pw,
        Err(e) => {
            eprintln!("Error initializing pricewatch: {e}");
            std::process::exit(1);
        }
    };

    let result = run_command(pw, &config, cli.command).await;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_command(
    pw: PriceWatch,
    config: &PipelineConfig,
    cmd: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Commands::Check => {
            let report = pw.run_checks().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Aggregate => {
            let report = pw.run_aggregation().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Run => {
            let report = pw.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve { every } => {
            let every = every.map(Duration::from_secs).unwrap_or(config.schedule);
            if every.is_zero() {
                return Err("--every must be positive".into());
            }
            pw.serve(every, async {
                tokio::signal::ctrl_c().await.ok();
            })
            .await;
        }
        Commands::MonitorAdd {
            url,
            variant,
            region,
            retailer,
        } => {
            let product = pw.add_monitored(&url, &variant, &region, retailer.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&product)?);
        }
        Commands::MonitorList => {
            let rows = pw.list_monitored()?;
            let json: Vec<serde_json::Value> = rows
                .into_iter()
                .map(|row| match row {
                    Ok(p) => serde_json::to_value(p),
                    Err(bad) => Ok(serde_json::json!({ "malformed": bad })),
                })
                .collect::<Result<_, _>>()?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Commands::MonitorRemove { id } => {
            pw.remove_monitored(id)?;
            println!("Stopped monitoring product {id}");
        }
        Commands::History {
            variant,
            region,
            window,
        } => {
            let window = match window {
                Some(w) => w.parse::<HistoryWindow>()?,
                None => pw.history_window(),
            };
            let filter = HistoryFilter {
                window,
                variant_id: variant.as_deref().map(VariantId::parse).transpose()?,
                region_id: region.as_deref().map(RegionId::parse).transpose()?,
            };
            // One JSON document per line, written as each group is read.
            pw.visit_history(&filter, &mut |group| {
                let line = serde_json::to_string(&group)
                    .map_err(|e| DomainError::InvalidInput(format!("history encode: {e}")))?;
                println!("{line}");
                Ok(())
            })?;
        }
        Commands::Proxies => {
            println!("{}", serde_json::to_string_pretty(&pw.proxies())?);
        }
        Commands::Retailers => {
            for route in pw.retailers() {
                println!(
                    "{}: {}{}",
                    route.retailer_id,
                    route.hosts.join(", "),
                    if route.has_adapter { "" } else { " (no adapter)" }
                );
            }
        }
    }
    Ok(())
}
