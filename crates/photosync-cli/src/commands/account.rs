use crate::commands::common::{resolve_password, CliContext};
use crate::error::CliError;

pub async fn run_register(
    context: &CliContext,
    username: &str,
    password: Option<String>,
) -> Result<(), CliError> {
    let password = resolve_password(password)?;
    let engine = context.open_engine().await?;
    let code = engine.register(username, &password).await?;
    println!("Registered '{username}'. Verification code: {code}");
    println!("Confirm with `photosync verify {username} {code}`");
    Ok(())
}

pub async fn run_verify(context: &CliContext, username: &str, code: &str) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    let message = engine.verify_registration(username, code).await?;
    println!("{}", message.unwrap_or_else(|| format!("Verified '{username}'")));
    Ok(())
}

pub async fn run_login(
    context: &CliContext,
    username: &str,
    password: Option<String>,
) -> Result<(), CliError> {
    let password = resolve_password(password)?;
    let engine = context.open_engine().await?;
    engine.login(username, &password).await?;

    if let Err(error) = engine.register_client_key(username).await {
        tracing::warn!("Client key registration failed: {}", error);
    }
    context.update_profile(|profile| profile.username = Some(username.to_string()))?;

    println!("Logged in profile '{}' as {username}", context.profile_name);
    Ok(())
}

pub async fn run_logout(context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    if engine.is_logged_in()? {
        engine.logout()?;
        println!("Logged out profile '{}'", context.profile_name);
    } else {
        println!("Profile '{}' is not logged in.", context.profile_name);
    }
    Ok(())
}
