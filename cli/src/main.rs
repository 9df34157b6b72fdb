// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! # Guildhost Orchestrator CLI
//!
//! The `guildhost` binary runs the orchestrator daemon and manages its
//! configuration.
//!
//! ## Commands
//!
//! - `guildhost serve` - Run the orchestrator HTTP API
//! - `guildhost config validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use guildhost_orchestrator_core::application::admission::AdmissionController;
use guildhost_orchestrator_core::application::deprovisioning::{
    DeprovisioningService, StandardDeprovisioningService,
};
use guildhost_orchestrator_core::application::operations::{
    OperationsService, StandardOperationsService,
};
use guildhost_orchestrator_core::application::provisioning::{
    ProvisioningService, StandardProvisioningService,
};
use guildhost_orchestrator_core::domain::clock::SystemClock;
use guildhost_orchestrator_core::domain::platform::MachinePlatform;
use guildhost_orchestrator_core::domain::repository::{
    CapacityStore, DeploymentRepository, GuildRepository, SubscriptionStore, UserRepository,
};
use guildhost_orchestrator_core::infrastructure::billing::StripeBilling;
use guildhost_orchestrator_core::infrastructure::config::OrchestratorConfig;
use guildhost_orchestrator_core::infrastructure::identity::HttpIdentityProvider;
use guildhost_orchestrator_core::infrastructure::machines_client::HttpMachinePlatform;
use guildhost_orchestrator_core::infrastructure::repositories::memory::{
    InMemoryCapacityStore, InMemoryDeploymentRepository, InMemoryGuildRepository,
    InMemorySubscriptionStore, InMemoryUserRepository,
};
use guildhost_orchestrator_core::infrastructure::repositories::postgres::{
    PostgresCapacityStore, PostgresDeploymentRepository, PostgresGuildRepository,
    PostgresSubscriptionStore, PostgresUserRepository,
};
use guildhost_orchestrator_core::infrastructure::secrets::EnvSecretStore;
use guildhost_orchestrator_core::presentation::api;

/// Guildhost orchestrator - provision and operate guild workloads
#[derive(Parser)]
#[command(name = "guildhost")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "GUILDHOST_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "GUILDHOST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator HTTP API
    Serve,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./guildhost-config.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve => serve(cli.config).await,
        Commands::Config { command } => match command {
            ConfigCommand::Validate { file } => validate_config(file.or(cli.config)),
            ConfigCommand::Generate { output } => generate_config(output),
        },
    }
}

/// Repository set: Postgres when a database URL is configured,
/// in-memory otherwise.
struct Stores {
    guilds: Arc<dyn GuildRepository>,
    deployments: Arc<dyn DeploymentRepository>,
    capacity: Arc<dyn CapacityStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    users: Arc<dyn UserRepository>,
}

async fn build_stores(config: &OrchestratorConfig) -> Result<Stores> {
    match &config.database_url {
        Some(url) => {
            info!("connecting to PostgreSQL");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            Ok(Stores {
                guilds: Arc::new(PostgresGuildRepository::new(pool.clone())),
                deployments: Arc::new(PostgresDeploymentRepository::new(pool.clone())),
                capacity: Arc::new(PostgresCapacityStore::new(pool.clone())),
                subscriptions: Arc::new(PostgresSubscriptionStore::new(pool.clone())),
                users: Arc::new(PostgresUserRepository::new(pool)),
            })
        }
        None => {
            warn!("no database configured, using in-memory stores");
            Ok(Stores {
                guilds: Arc::new(InMemoryGuildRepository::default()),
                deployments: Arc::new(InMemoryDeploymentRepository::default()),
                capacity: Arc::new(InMemoryCapacityStore::empty()),
                subscriptions: Arc::new(InMemorySubscriptionStore::default()),
                users: Arc::new(InMemoryUserRepository::default()),
            })
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = OrchestratorConfig::load(config_path).context("Failed to load configuration")?;
    let stores = build_stores(&config).await?;

    let secrets = Arc::new(EnvSecretStore);
    let platform: Arc<dyn MachinePlatform> = Arc::new(HttpMachinePlatform::new(
        config.platform.base_url.clone(),
        secrets.clone(),
        config.platform.api_token_secret.clone(),
    ));
    let clock = Arc::new(SystemClock);
    let admission = Arc::new(AdmissionController::new(stores.capacity.clone()));

    let provisioning: Arc<dyn ProvisioningService> = Arc::new(StandardProvisioningService::new(
        stores.guilds.clone(),
        stores.deployments.clone(),
        stores.subscriptions.clone(),
        admission,
        platform.clone(),
        secrets.clone(),
        clock.clone(),
        config.workload_settings(),
        config.poll_policy(),
    ));

    let operations: Arc<dyn OperationsService> = Arc::new(StandardOperationsService::new(
        stores.guilds.clone(),
        platform.clone(),
        secrets.clone(),
        clock,
        config.workload_settings(),
    ));

    let billing = Arc::new(StripeBilling::new(
        config.billing.base_url.clone(),
        secrets.clone(),
        config.billing.api_key_secret.clone(),
    ));
    let identity = Arc::new(HttpIdentityProvider::new(
        config.identity.base_url.clone(),
        secrets.clone(),
        config.identity.admin_token_secret.clone(),
    ));
    let deprovisioning: Arc<dyn DeprovisioningService> =
        Arc::new(StandardDeprovisioningService::new(
            stores.guilds.clone(),
            stores.deployments.clone(),
            stores.users.clone(),
            platform,
            billing,
            identity,
        ));

    let app = api::app(provisioning, operations, deprovisioning);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    info!("orchestrator listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("shutdown signal received");
}

fn validate_config(path: Option<PathBuf>) -> Result<()> {
    let config = OrchestratorConfig::load(path).context("Failed to load configuration")?;
    println!("Configuration is valid");
    println!("  platform: {}", config.platform.base_url);
    println!("  workload image: {}", config.workload.image);
    println!("  region: {}", config.workload.region);
    println!(
        "  persistence: {}",
        if config.database_url.is_some() {
            "postgres"
        } else {
            "in-memory"
        }
    );
    Ok(())
}

fn generate_config(output: PathBuf) -> Result<()> {
    let sample = OrchestratorConfig::from_yaml_str(
        r#"
platform:
  base_url: https://machines.example.com
workload:
  image: registry.example.com/guild-bot:v1
  service_url: https://svc.example.com
"#,
    )?;
    let yaml = serde_yaml::to_string(&sample)?;
    std::fs::write(&output, yaml)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Sample configuration written to {}", output.display());
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
