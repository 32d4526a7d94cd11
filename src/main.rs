use clap::Parser;
use paygate_core::cli::{Cli, Commands, DbCommands, TxCommands};
use paygate_core::config::{Config, LogFormat};
use paygate_core::{build_state, cli, create_app};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match Cli::parse().command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
        Commands::Tx(command) => {
            let providers = config.load_providers()?;
            let state = build_state(&config, &providers).await?;
            match command {
                TxCommands::Show { py_ref } => cli::handle_tx_show(&state, &py_ref).await,
                TxCommands::Status { py_ref } => cli::handle_tx_status(&state, &py_ref).await,
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let providers = config.load_providers()?;
    let state = build_state(&config, &providers).await?;
    tracing::info!(providers = ?state.registry.codes(), "Provider registry ready");

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
