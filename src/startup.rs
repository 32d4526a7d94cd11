use crate::config::{Config, ProvidersConfig};
use crate::providers::registry::factory_for;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: Option<bool>,
    pub providers: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database.unwrap_or(true) && self.providers
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        match self.database {
            Some(ok) => println!("Database Connectivity: {}", status(ok)),
            None => println!("Database Connectivity: skipped (in-memory ledger)"),
        }
        println!("Provider Configuration: {}", status(self.providers));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(
    config: &Config,
    providers: Option<&ProvidersConfig>,
    pool: Option<&PgPool>,
) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: None,
        providers: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Some(pool) = pool {
        let ok = match validate_database(pool).await {
            Ok(()) => true,
            Err(e) => {
                report.errors.push(format!("Database: {:#}", e));
                false
            }
        };
        report.database = Some(ok);
    }

    match providers {
        Some(providers) => {
            if let Err(e) = validate_providers(providers) {
                report.providers = false;
                report.errors.push(format!("Providers: {:#}", e));
            }
        }
        None => {
            report.providers = false;
            report.errors.push(format!(
                "Providers: could not load {}",
                config.providers_file.display()
            ));
        }
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.request_timeout.is_zero() {
        anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
    }
    if let Some(url) = &config.database_url {
        url::Url::parse(url).context("DATABASE_URL is not a valid URL")?;
    }
    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

/// Every configured code must have a factory and every URL must parse.
pub fn validate_providers(providers: &ProvidersConfig) -> Result<()> {
    if providers.providers.is_empty() {
        anyhow::bail!("no providers configured");
    }
    for (code, provider) in &providers.providers {
        if factory_for(code).is_none() {
            anyhow::bail!("unknown provider code {:?}", code);
        }
        url::Url::parse(&provider.base_url)
            .with_context(|| format!("{}: base_url is not a valid URL", code))?;
        for (field, value) in [
            ("auth_base_url", &provider.auth_base_url),
            ("callback_url", &provider.callback_url),
            ("redirect_url", &provider.redirect_url),
        ] {
            if let Some(value) = value {
                url::Url::parse(value)
                    .with_context(|| format!("{}: {} is not a valid URL", code, field))?;
            }
        }
    }
    Ok(())
}
