//! Main binary for the promshard daemon (promshardd)

use clap::{Parser, Subcommand};
use promshard_agent::{init_agent, init_logging, AgentConfig, AgentError, Result};
use promshard_cache::{GenerationMetrics, GenerationService};
use promshard_core::{ConfigKind, LabelSet, NoopSink};
use promshard_render::relabel;
use promshard_render::schema::PrometheusConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "promshardd")]
#[command(about = "Sharded monitoring configuration generator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "PROMSHARDD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run,
    /// Run one cycle of every kind and print a summary
    Generate {
        /// Also print the generation metrics
        #[arg(long)]
        metrics: bool,
    },
    /// Run one cycle of every kind and print the document of one instance
    Show {
        /// scrape, alert_routing, alert_rules or record_rules
        #[arg(short, long, default_value = "scrape")]
        kind: ConfigKind,

        /// Instance address
        #[arg(short, long)]
        instance: String,
    },
    /// Show which targets a collector instance keeps
    Preview {
        /// Collector instance address
        #[arg(short, long)]
        instance: String,

        /// Target addresses to evaluate
        #[arg(short, long, required = true, num_args = 1..)]
        targets: Vec<String>,
    },
    /// Generate default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration and inventory
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run) | None => run_agent(&cli).await,
        Some(Commands::Generate { metrics }) => {
            let service = one_shot(&cli).await?;
            if metrics {
                print!("\n{}", service.metrics().export_text());
            }
            Ok(())
        }
        Some(Commands::Show { kind, ref instance }) => {
            let document = one_shot_document(&cli, kind, instance).await?;
            print!("\n{}", document);
            Ok(())
        }
        Some(Commands::Preview {
            ref instance,
            ref targets,
        }) => preview(&cli, instance, targets).await,
        Some(Commands::Config { ref output }) => generate_config(output.clone()),
        Some(Commands::Validate) => validate_config(&cli),
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = if let Some(config_path) = &cli.config {
        AgentConfig::from_file(config_path)?
    } else {
        AgentConfig::default()
    };

    if !cli.log_level.is_empty() {
        config.logging.level = cli.log_level.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run_agent(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let mut agent = init_agent(&config)?;

    if let Some(config_path) = &cli.config {
        info!("Loaded configuration from: {}", config_path.display());
    }

    if let Err(e) = agent.run().await {
        error!("Agent failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Build a service over the inventory file and run one cycle of every kind
async fn one_shot(cli: &Cli) -> Result<GenerationService> {
    let config = load_config(cli)?;
    init_logging(&config.logging)?;

    let inventory =
        promshard_agent::FileInventory::open(config.inventory.path.clone(), Arc::new(NoopSink))?;
    let service = GenerationService::new(
        inventory.store(),
        config.generator.clone(),
        Arc::new(GenerationMetrics::new()?),
    );

    let cancel = CancellationToken::new();
    for (kind, result) in service.generate_all(&cancel).await {
        match result {
            Ok(report) => println!(
                "{:<14} cycle {} pools {} documents {} skipped jobs {}",
                kind, report.cycle, report.pools, report.documents, report.skipped_units
            ),
            Err(e) if e.is_committed() => println!("{:<14} {}", kind, e),
            Err(e) => return Err(AgentError::Cache(e)),
        }
    }

    Ok(service)
}

/// Run one cycle and return the document of `instance`, failing when it has none
async fn one_shot_document(cli: &Cli, kind: ConfigKind, instance: &str) -> Result<String> {
    let document = one_shot(cli).await?.get_document(kind, instance);
    if document.is_empty() {
        return Err(AgentError::Service(format!(
            "No {} document for instance {}",
            kind, instance
        )));
    }
    Ok(document)
}

async fn preview(cli: &Cli, instance: &str, targets: &[String]) -> Result<()> {
    let document = one_shot_document(cli, ConfigKind::Scrape, instance).await?;
    let config: PrometheusConfig =
        serde_yaml::from_str(&document).map_err(promshard_core::Error::from)?;

    println!();
    for scrape in &config.scrape_configs {
        println!("job {}", scrape.job_name);
        for target in targets {
            let labels = LabelSet::new()
                .with_label("__address__", target.as_str())
                .with_label("job", scrape.job_name.as_str());
            let kept = relabel::process(&labels, &scrape.relabel_configs)
                .map_err(promshard_core::Error::from)?
                .is_some();
            println!("  {:<24} {}", target, if kept { "keep" } else { "drop" });
        }
    }

    Ok(())
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = AgentConfig::default();

    if let Some(output_path) = output {
        config.to_file(&output_path)?;
        println!("Generated configuration file: {}", output_path.display());
    } else {
        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))?;
        println!("{}", yaml);
    }

    Ok(())
}

fn validate_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    println!("Configuration is valid");
    println!("Output directory: {}", config.generator.config_dir.display());
    println!("Enabled kinds:");
    for kind in &config.scheduler.enabled_kinds {
        println!("  - {}", kind);
    }

    let inventory =
        promshard_agent::FileInventory::open(config.inventory.path.clone(), Arc::new(NoopSink))?
            .store()
            .inventory();
    println!("Inventory is valid: {}", config.inventory.path.display());
    println!("  scrape pools: {}", inventory.scrape_pools.len());
    println!("  scrape jobs: {}", inventory.scrape_jobs.len());
    println!("  alert manager pools: {}", inventory.alert_manager_pools.len());
    println!("  send groups: {}", inventory.send_groups.len());
    println!("  alert rules: {}", inventory.alert_rules.len());
    println!("  record rules: {}", inventory.record_rules.len());

    Ok(())
}
