//! Signing in for commands that act on the user's account.

use clap::Args;
use hwmarket_client::MarketClient;
use hwmarket_core::UserId;
use secrecy::SecretString;
use tracing::debug;

use super::CliError;

/// Account credentials, from flags or the environment.
#[derive(Args)]
pub struct Credentials {
    /// Account email
    #[arg(long, env = "MARKET_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "MARKET_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,
}

/// Build a client from the environment and sign in.
///
/// # Errors
///
/// Returns an error if configuration or credentials are missing, or the
/// backend refuses the sign-in.
pub async fn sign_in(credentials: &Credentials) -> Result<(MarketClient, UserId), CliError> {
    let (Some(email), Some(password)) = (&credentials.email, &credentials.password) else {
        return Err(CliError::MissingCredentials);
    };

    let config = hwmarket_client::ClientConfig::from_env()?;
    let client = MarketClient::new(config)?;
    let session = client
        .auth()
        .sign_in_with_password(email, &SecretString::from(password.clone()))
        .await?;
    debug!(user_id = %session.user.id, "Signed in");
    Ok((client, session.user.id))
}
