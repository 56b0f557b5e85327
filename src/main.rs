use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use pageharvest::analysis::HarvestRequest;
use pageharvest::config::AppConfig;
use pageharvest::core::HarvestEngine;
use pageharvest::logging::init_logging;
use pageharvest::probe::StaticProbe;

#[derive(Parser)]
#[command(name = "pageharvest")]
#[command(about = "Selector discovery and harvest coordination over saved HTML")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, help = "Configuration file path")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank selector candidates for a saved HTML page
    Selectors {
        #[arg(help = "Path to an HTML file")]
        html: PathBuf,

        #[arg(short, long, help = "User-supplied selector to try first")]
        selector: Option<String>,
    },

    /// Analyze complexity and print the execution plan
    Plan {
        #[arg(help = "Path to an HTML file")]
        html: PathBuf,

        #[arg(short, long, help = "User-supplied selector to try first")]
        selector: Option<String>,

        #[arg(long, help = "Extraction will require page navigation")]
        navigation: bool,

        #[arg(long, help = "Extraction will require interactive steps")]
        interaction: bool,
    },

    /// Run the full harvest pipeline and print the consolidated dataset
    Harvest {
        #[arg(help = "Path to an HTML file")]
        html: PathBuf,

        #[arg(short, long, help = "User-supplied selector to try first")]
        selector: Option<String>,

        #[arg(short, long, help = "Write the consolidated result to this file")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path).await?,
        None => AppConfig::load().await?,
    };
    init_logging(&config.logging)?;

    info!("pageharvest v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Selectors { html, selector } => {
            let engine = engine_for(&config, &html).await?;
            let snapshot = engine.snapshot()?;
            let request = request_for(selector, false, false);

            match engine.build_strategy(&snapshot, &request) {
                Some(strategy) => println!("{}", serde_json::to_string_pretty(&strategy)?),
                None => anyhow::bail!("no selector matched any elements on this page"),
            }
        }

        Commands::Plan { html, selector, navigation, interaction } => {
            let engine = engine_for(&config, &html).await?;
            let snapshot = engine.snapshot()?;
            let request = request_for(selector, navigation, interaction);

            let (_, profile, plan) = engine.analyze_and_plan(&snapshot, &request);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "complexity": profile,
                    "plan": plan,
                }))?
            );
        }

        Commands::Harvest { html, selector, output } => {
            let engine = engine_for(&config, &html).await?;
            let request = request_for(selector, false, false);

            let report = engine.harvest(&request, None).await?;
            let rendered = serde_json::to_string_pretty(&report)?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, rendered).await?;
                    info!(path = %path.display(), items = report.result.items.len(), "result written");
                }
                None => println!("{}", rendered),
            }
        }
    }

    Ok(())
}

async fn engine_for(config: &AppConfig, html_path: &PathBuf) -> Result<HarvestEngine> {
    let html = tokio::fs::read_to_string(html_path).await?;
    Ok(HarvestEngine::new(config, Arc::new(StaticProbe::new(html))))
}

fn request_for(selector: Option<String>, navigation: bool, interaction: bool) -> HarvestRequest {
    let mut request = match selector {
        Some(selector) => HarvestRequest::with_manual_selector(selector),
        None => HarvestRequest::automatic(),
    };
    request.needs_navigation = navigation;
    request.needs_interaction = interaction;
    request
}
