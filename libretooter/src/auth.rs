//! Authentication bootstrap
//!
//! Either opens a verified session with the credentials from the environment or,
//! when they are missing or rejected, registers a new application and walks the
//! operator through the OAuth authorization-code flow. The freshly minted
//! credentials are handed back as [`AuthOutcome::Bootstrapped`]; printing them and
//! ending the run is up to the caller.

use std::io::{self, BufRead, Write};

use tracing::{info, warn};

use crate::config::{Configuration, Credentials, API_BASE_URL};
use crate::error::{ApiError, ConfigError, Result, RetooterError};
use crate::platforms::{Connector, Instance};

/// Name the application is registered under
pub const APPLICATION_NAME: &str = "Retooter";

/// Source of the authorization code during the bootstrap flow
pub trait Prompt: Send + Sync {
    /// Show `authorization_url` to the operator and return the code they enter
    fn authorization_code(&self, authorization_url: &str) -> Result<String>;
}

/// Reads the authorization code from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn authorization_code(&self, authorization_url: &str) -> Result<String> {
        print!(
            "Visit {}, authenticate with your credentials, \
             and copy-and-paste the returned authentication code here: ",
            authorization_url
        );
        io::stdout().flush().map_err(RetooterError::Prompt)?;

        let mut code = String::new();
        io::stdin()
            .lock()
            .read_line(&mut code)
            .map_err(RetooterError::Prompt)?;
        Ok(code.trim().to_string())
    }
}

/// Result of [`authenticate`]
pub enum AuthOutcome {
    /// A verified session, ready for reposting
    Authenticated(Box<dyn Instance>),

    /// New credentials were minted; the operator has to store them before the
    /// next run, and nothing else should happen in this one
    Bootstrapped(Credentials),
}

/// Establish an authenticated session or bootstrap new credentials
///
/// `interactive` is false when nobody can answer a prompt; in that case missing
/// or rejected credentials are fatal instead of starting the bootstrap flow.
///
/// # Errors
///
/// - `RetooterError::NotAuthenticated` when credentials are unusable and the run
///   is not interactive, or the operator enters no code
/// - `ConfigError::UnsupportedInstance` when the base URL does not serve a
///   compatible API
/// - `RetooterError::Api` for any other remote failure
pub async fn authenticate(
    config: &Configuration,
    credentials: Option<Credentials>,
    connector: &dyn Connector,
    prompt: &dyn Prompt,
    interactive: bool,
) -> Result<AuthOutcome> {
    let reason = match credentials {
        None => "no complete set of CLIENT_ID, CLIENT_SECRET and ACCESS_TOKEN".to_string(),
        Some(credentials) => {
            let instance = connector.connect(&config.api_base_url, &credentials)?;
            match instance.verify_app_credentials().await {
                Ok(()) => {
                    info!(api_base_url = %config.api_base_url, "Authenticated");
                    return Ok(AuthOutcome::Authenticated(instance));
                }
                Err(RetooterError::Api(ApiError::Unauthorized(msg))) => msg,
                Err(RetooterError::Api(ApiError::UnsupportedVersion(msg))) => {
                    warn!("{}", msg);
                    return Err(ConfigError::UnsupportedInstance {
                        url: config.api_base_url.clone(),
                        variable: API_BASE_URL.to_string(),
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
    };

    if !interactive {
        return Err(RetooterError::NotAuthenticated(format!(
            "No sufficient authentication found ({}), please obtain CLIENT_ID, \
             CLIENT_SECRET, and ACCESS_TOKEN interactively and define them in the \
             environment",
            reason
        )));
    }

    info!(%reason, "No sufficient authentication found, requesting a new access token");
    bootstrap(config, connector, prompt).await.map(AuthOutcome::Bootstrapped)
}

async fn bootstrap(
    config: &Configuration,
    connector: &dyn Connector,
    prompt: &dyn Prompt,
) -> Result<Credentials> {
    let api_base_url = &config.api_base_url;
    let app = connector.register_app(api_base_url, APPLICATION_NAME).await?;
    let authorization_url = connector.authorization_url(api_base_url, &app)?;

    let code = prompt.authorization_code(&authorization_url)?;
    if code.is_empty() {
        return Err(RetooterError::NotAuthenticated(
            "No authorization code entered".to_string(),
        ));
    }

    let access_token = connector.exchange_code(api_base_url, &app, &code).await?;
    info!(client_id = %app.client_id, "Obtained new access token");

    Ok(Credentials::new(app.client_id, app.client_secret, access_token))
}
