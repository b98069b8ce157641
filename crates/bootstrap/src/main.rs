//! Coldstart bootstrap binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coldstart_bootstrap::{
    AppClient, BootstrapError, Collaborators, CommandInstaller, CommandRestarter, Pipeline,
    ProvisionState,
};
use coldstart_core::config::AppConfig;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Coldstart - cold-start bootstrap and credential self-healing
#[derive(Parser, Debug)]
#[command(name = "coldstartd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "COLDSTART_CONFIG",
        default_value = "/etc/coldstart/coldstart.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Bootstrap, heal key material and provision client credentials (default)
    Run,
    /// Classify key consistency once
    Probe,
    /// Probe and remediate key material
    Heal,
    /// Provision the dependent-service client credentials
    Provision {
        /// Skip the fast path and always register a new client
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    // COLDSTART_CONFIG only names the file.
    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("COLDSTART_") && key != "COLDSTART_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: coldstartd --config /path/to/coldstart.toml\n  \
             2. Environment variables: COLDSTART_DATABASE__HOST=db \
             COLDSTART_DATABASE__PASSWORD=... coldstartd\n\n\
             Set COLDSTART_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("COLDSTART_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn build_collaborators(config: &AppConfig) -> Result<Collaborators> {
    let db = coldstart_database::from_config(&config.database)
        .await
        .context("failed to initialize database client")?;
    tracing::info!(backend = db.backend_name(), "Database client initialized");

    let secrets = coldstart_secrets::from_config(&config.secrets)
        .await
        .context("failed to initialize secret store")?;
    match &secrets {
        Some(store) => tracing::info!(backend = store.backend_name(), "Secret store initialized"),
        None => tracing::warn!("No secret store configured, credentials will only be kept locally"),
    }

    let app = AppClient::new(&config.app).context("failed to build application client")?;
    let app_restarter = CommandRestarter::new("application", config.app.restart_command.clone())?;
    let dependent_restarter =
        CommandRestarter::new("dependent", config.oauth.dependent_restart_command.clone())?;

    Ok(Collaborators {
        db,
        app: Arc::new(app),
        secrets,
        installer: Arc::new(CommandInstaller::from_config(&config.installer)),
        app_restarter: Arc::new(app_restarter),
        dependent_restarter: Arc::new(dependent_restarter),
    })
}

/// Log a fatal bootstrap error and exit with its code.
fn exit_with(err: BootstrapError) -> ! {
    tracing::error!(class = %err.class(), error = %err, "Bootstrap failed");
    std::process::exit(err.exit_code());
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Coldstart v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    let overrides = config.settings.resolve(std::env::vars());
    let collab = build_collaborators(&config).await?;
    let pipeline = Pipeline::new(config, collab, overrides);

    match args.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            if let Err(err) = pipeline.run().await {
                exit_with(err);
            }
        }
        Commands::Probe => {
            let report = pipeline.probe().await;
            println!("{}", report.outcome);
        }
        Commands::Heal => {
            let (probe, remediation) = pipeline.heal().await;
            println!(
                "probe={} attempts={} final={}",
                probe.outcome, remediation.attempts, remediation.final_outcome
            );
        }
        Commands::Provision { force } => {
            let report = pipeline.provision(force).await;
            println!("{}", report.state);
            if report.state == ProvisionState::Failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
