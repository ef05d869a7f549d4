use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_init(context: &CliContext) -> Result<(), CliError> {
    let server_url = context
        .server_url
        .clone()
        .ok_or(CliError::ServerNotConfigured)?;

    let engine = context.open_engine().await?;
    let fingerprint = engine.connect_server().await?;
    let config_path = context.update_profile(|profile| {
        profile.server_url = Some(server_url.clone());
    })?;

    println!("Profile '{}' uses {}", context.profile_name, server_url);
    println!("Server key fingerprint: {fingerprint}");
    println!("Saved config to {}", config_path.display());
    Ok(())
}

pub async fn run_keys(context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    println!("{}", engine.device_public_key_pem()?);
    match engine.server_key_fingerprint()? {
        Some(fingerprint) => println!("Server key fingerprint: {fingerprint}"),
        None => println!("Server key: not exchanged (run `photosync init`)"),
    }
    Ok(())
}
