use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::TransactionFilter;
use crate::AppState;

#[derive(Parser)]
#[command(name = "paygate-core")]
#[command(about = "Paygate Core - payment gateway and reconciliation engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction inspection commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Print the ledger record for a caller reference
    Show {
        #[arg(value_name = "PY_REF")]
        py_ref: String,
    },

    /// Reconcile a transaction against its provider
    Status {
        #[arg(value_name = "PY_REF")]
        py_ref: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_show(state: &AppState, py_ref: &str) -> anyhow::Result<()> {
    match state
        .context
        .transactions
        .find_one(&TransactionFilter::py_ref(py_ref))
        .await?
    {
        Some(tx) => {
            println!("{}", serde_json::to_string_pretty(&tx)?);
            Ok(())
        }
        None => {
            tracing::warn!("Transaction {} not found", py_ref);
            anyhow::bail!("Transaction {} not found", py_ref)
        }
    }
}

pub async fn handle_tx_status(state: &AppState, py_ref: &str) -> anyhow::Result<()> {
    let response = state
        .engine
        .check_transaction_status(Uuid::new_v4(), py_ref)
        .await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.success {
        anyhow::bail!("status check returned {}", response.code);
    }
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required to run migrations"))?;

    let pool = crate::db::create_pool(url).await?;
    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!(
        "  Database URL: {}",
        config
            .database_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(unset, in-memory ledger)".to_string())
    );
    println!("  Providers File: {}", config.providers_file.display());
    println!("  Request Timeout: {}s", config.request_timeout.as_secs());

    let providers = match config.load_providers() {
        Ok(providers) => Some(providers),
        Err(e) => {
            tracing::error!("{:#}", e);
            None
        }
    };
    let pool = match &config.database_url {
        Some(url) => crate::db::create_pool(url).await.ok(),
        None => None,
    };

    let report =
        crate::startup::validate_environment(config, providers.as_ref(), pool.as_ref()).await;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("configuration is invalid");
    }
    tracing::info!("Configuration is valid");
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
