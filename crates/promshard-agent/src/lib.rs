//! # promshard-agent
//!
//! The promshardd daemon.
//!
//! Loads the inventory from a YAML file, keeps it fresh, and regenerates the
//! collector, router and rule documents of every pool whenever the inventory
//! changes or the full refresh interval elapses.

pub mod agent;
pub mod config;
pub mod inventory;
pub mod scheduler;

// Re-export commonly used types
pub use agent::Agent;
pub use config::AgentConfig;
pub use inventory::FileInventory;
pub use scheduler::GenerationScheduler;

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] promshard_core::Error),

    #[error("Generation error: {0}")]
    Cache(#[from] promshard_cache::CacheError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Initialize logging and build the agent
pub fn init_agent(config: &AgentConfig) -> Result<Agent> {
    init_logging(&config.logging)?;

    tracing::info!("Initializing promshard agent with config: {:?}", config);

    Agent::new(config.clone())
}

/// Initialize logging and tracing
pub fn init_logging(logging_config: &config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging_config.show_target)
        .with_thread_ids(logging_config.show_thread_ids)
        .with_line_number(logging_config.show_line_numbers);

    let result = match logging_config.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };
    result.map_err(|e| AgentError::Config(format!("Failed to install logger: {}", e)))
}
