//! PhotoSync CLI - back up a photo directory to a self-hosted server.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;
mod lock;
#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::account::{run_login, run_logout, run_register, run_verify};
use crate::commands::common::CliContext;
use crate::commands::init::{run_init, run_keys};
use crate::commands::queue::{run_add, run_auto_upload, run_retry};
use crate::commands::scan::{run_pull, run_scan};
use crate::commands::status::{run_list, run_status};
use crate::commands::upload::{run_upload, run_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "photosync=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let context = CliContext::resolve(cli.profile.as_deref(), cli.data_dir, cli.server)?;

    match cli.command {
        Commands::Init => run_init(&context).await?,
        Commands::Keys => run_keys(&context).await?,
        Commands::Register { username, password } => {
            run_register(&context, &username, password).await?;
        }
        Commands::Verify { username, code } => run_verify(&context, &username, &code).await?,
        Commands::Login { username, password } => {
            run_login(&context, &username, password).await?;
        }
        Commands::Logout => run_logout(&context).await?,
        Commands::Scan { dir, full } => run_scan(&context, &dir, full).await?,
        Commands::Pull => run_pull(&context).await?,
        Commands::Add { paths } => run_add(&context, &paths).await?,
        Commands::Upload { json } => run_upload(&context, json).await?,
        Commands::Status { json } => run_status(&context, json).await?,
        Commands::List {
            status,
            limit,
            json,
        } => run_list(&context, status.as_deref(), limit, json).await?,
        Commands::Retry { id } => run_retry(&context, &id).await?,
        Commands::AutoUpload { state } => run_auto_upload(&context, state.enabled()).await?,
        Commands::Watch { dir } => run_watch(&context, dir).await?,
    }

    Ok(())
}
