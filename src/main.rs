// ABOUTME: CLI entry point for managing CDC publications and replication slots
// ABOUTME: Every command loads and validates the YAML config first

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{error, info};

use pg_cdc_manager::executor::{BatchReport, ProfileExecutor, ProfileReport};
use pg_cdc_manager::postgres::{PgConnector, TlsOptions};
use pg_cdc_manager::replication::ddl;
use pg_cdc_manager::Config;

#[derive(Parser)]
#[command(name = "pg-cdc")]
#[command(about = "Manage PostgreSQL publications and logical replication slots for CDC")]
#[command(version)]
struct Cli {
    /// Path to the replication YAML config file
    #[arg(long, global = true, env = "PG_CDC_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Log at debug level, including every statement sent to the server
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Accept self-signed or otherwise unverifiable server certificates
    #[arg(long, global = true)]
    accept_invalid_certs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(rename_all = "snake_case")]
enum Commands {
    /// Validate the replication YAML configuration file
    ValidateConfig,

    /// Create publications and replication slots for all profiles
    CreateAll,

    /// Create the publication and replication slot of one profile
    CreateProfile {
        /// Replication profile name
        profile_name: String,
    },

    /// Drop publications and replication slots for all profiles
    DropAll {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Drop the publication and replication slot of one profile
    DropProfile {
        /// Replication profile name
        profile_name: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show whether each profile's publication and slot exist on the server
    Status {
        /// Only this replication profile
        profile_name: Option<String>,
    },

    /// Print the statements create_profile would run, without connecting
    ShowDdl {
        /// Only this replication profile
        profile_name: Option<String>,
    },

    /// Grant a replication role read access to the replicated schemas
    GrantPrivileges {
        /// Role that will consume the replication slots
        role: String,

        /// Only the schemas of this replication profile
        #[arg(long)]
        profile: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn confirm_drop(what: &str, yes: bool) -> Result<bool> {
    if yes || !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(format!("Drop {}? Consumers of these slots will stop receiving changes", what))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

fn finish_profile(report: ProfileReport) -> Result<()> {
    print!("{}", report);
    if !report.is_success() {
        anyhow::bail!("Replication profile '{}' failed", report.profile);
    }
    Ok(())
}

fn finish_batch(batch: BatchReport) -> Result<()> {
    for report in &batch.profiles {
        print!("{}", report);
    }
    let failed = batch.failed().count();
    if failed > 0 {
        anyhow::bail!(
            "{} of {} replication profiles failed",
            failed,
            batch.profiles.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    dotenvy::dotenv().ok();

    let config = Config::load(&cli.config)
        .with_context(|| format!("YAML validation failed for {}", cli.config.display()))?;

    let connector = PgConnector::new(TlsOptions {
        accept_invalid_certs: cli.accept_invalid_certs,
    });
    let mut executor = ProfileExecutor::new(&config, connector);

    match cli.command {
        Commands::ValidateConfig => {
            println!(
                "YAML validation successful: {} connection profiles, {} replication profiles",
                config.connections().len(),
                config.replication_profiles().len()
            );
        }
        Commands::CreateAll => {
            info!("Creating publications and replication slots for all profiles");
            finish_batch(executor.create_all().await)?;
        }
        Commands::CreateProfile { profile_name } => {
            finish_profile(executor.create_profile(&profile_name).await?)?;
        }
        Commands::DropAll { yes } => {
            if !confirm_drop("all replication slots and publications in the config", yes)? {
                info!("Aborted");
                return Ok(());
            }
            info!("Dropping all replication slots and publications");
            finish_batch(executor.drop_all().await)?;
        }
        Commands::DropProfile { profile_name, yes } => {
            let profile = executor.profile(&profile_name)?;
            let what = format!(
                "replication slot {} and publication {}",
                profile.slot_name, profile.publication_name
            );
            if !confirm_drop(&what, yes)? {
                info!("Aborted");
                return Ok(());
            }
            finish_profile(executor.drop_profile(&profile_name).await?)?;
        }
        Commands::Status { profile_name } => {
            let profiles = match &profile_name {
                Some(name) => vec![executor.profile(name)?],
                None => config.replication_profiles().iter().collect(),
            };

            let mut failed = 0;
            for profile in profiles {
                match executor.status(profile).await {
                    Ok(status) => print!("{}", status),
                    Err(e) => {
                        failed += 1;
                        error!("Failed to inspect profile {}: {:#}", profile.name, e);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("Could not inspect {} replication profiles", failed);
            }
        }
        Commands::ShowDdl { profile_name } => {
            let profiles = match &profile_name {
                Some(name) => vec![executor.profile(name)?],
                None => config.replication_profiles().iter().collect(),
            };
            for profile in profiles {
                println!("-- {} ({})", profile.name, profile.connection);
                for statement in ddl::create_statements(profile) {
                    println!("{};", statement);
                }
            }
        }
        Commands::GrantPrivileges { role, profile } => {
            let executed = executor.grant_privileges(&role, profile.as_deref()).await?;
            for statement in executed {
                println!("{};", statement);
            }
        }
    }

    Ok(())
}
