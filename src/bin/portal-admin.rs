use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portal::bootstrap::{build_state, open_cache, open_storage};
use portal::clock;
use portal::config::Config;
use portal::health::ServiceState;
use portal::models::{NewCampaign, NewLocation, Targeting};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "portal-admin")]
#[command(about = "Captive portal management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tables if they do not exist
    Init,
    /// Register a venue and its access point
    AddLocation {
        name: String,
        /// Access point identifier reported by the captive portal
        #[arg(long)]
        ap_id: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
        #[arg(long)]
        brand_id: Option<i64>,
    },
    /// Create a campaign
    AddCampaign {
        name: String,
        /// draft, active, ...
        #[arg(long, default_value = "draft")]
        status: String,
        /// Unix seconds
        #[arg(long)]
        start: Option<i64>,
        /// Unix seconds
        #[arg(long)]
        end: Option<i64>,
        /// Targeting document, e.g. '{"deviceTypes":["mobile"]}'
        #[arg(long)]
        targeting: Option<String>,
        /// JSON array of variants, e.g. '[{"content":"Hello"}]'
        #[arg(long)]
        variants: Option<String>,
        #[arg(long)]
        brand_id: Option<i64>,
    },
    /// Stamp the end time of a session
    CloseSession { session_id: i64 },
    /// Probe dependencies and print today's counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portal=warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage = open_storage(&config.database).await?;

    // Ensure database is initialized
    storage.init().await?;

    match cli.command {
        Commands::Init => {
            println!("✓ Database initialized at {}", config.database.url);
        }
        Commands::AddLocation {
            name,
            ap_id,
            lat,
            lng,
            brand_id,
        } => {
            let location = storage
                .create_location(
                    &NewLocation {
                        brand_id,
                        name,
                        ap_identifier: ap_id,
                        latitude: lat,
                        longitude: lng,
                    },
                    clock::now(),
                )
                .await?;
            println!("✓ Created location {} '{}'", location.id, location.name);
        }
        Commands::AddCampaign {
            name,
            status,
            start,
            end,
            targeting,
            variants,
            brand_id,
        } => {
            let targeting: Targeting = match targeting {
                Some(raw) => serde_json::from_str(&raw).context("--targeting is not valid JSON")?,
                None => Targeting::default(),
            };
            let ab_test_variants: Vec<Value> = match variants {
                Some(raw) => serde_json::from_str(&raw).context("--variants must be a JSON array")?,
                None => Vec::new(),
            };

            let campaign = storage
                .create_campaign(
                    &NewCampaign {
                        brand_id,
                        name,
                        status,
                        start_time: start,
                        end_time: end,
                        targeting,
                        ab_test_variants,
                    },
                    clock::now(),
                )
                .await?;
            println!(
                "✓ Created campaign {} '{}' ({})",
                campaign.id, campaign.name, campaign.status
            );
        }
        Commands::CloseSession { session_id } => {
            if storage.end_session(session_id, clock::now()).await? {
                println!("✓ Session {} closed", session_id);
            } else {
                println!("⚠ Session {} does not exist", session_id);
            }
        }
        Commands::Status => {
            let cache = open_cache(&config.cache).await?;
            let state = build_state(&config, Arc::clone(&storage), cache)?;

            let report = state.health.status().await;
            println!("{:<24} {}", "Service", "State");
            println!("{}", "-".repeat(32));
            for (name, service_state) in &report.services {
                let label = match service_state {
                    ServiceState::Up => "up",
                    ServiceState::Down => "down",
                };
                println!("{:<24} {}", name, label);
            }

            let kpi = state.reporting.kpi().await?;
            println!();
            println!(
                "Today: {} sessions, {} impressions, {} clicks",
                kpi.today.sessions, kpi.today.impressions, kpi.today.clicks
            );

            for alert in report.alerts {
                println!("⚠ {}", alert.message);
            }
        }
    }

    Ok(())
}
