//! Instance API abstraction and implementations
//!
//! Retooter talks to the remote instance only through the two traits below.
//! [`Connector`] covers everything that happens before a session exists (app
//! registration and the OAuth code exchange) and opens sessions; [`Instance`] is
//! an authenticated session used by the reposting engine.
//!
//! # Examples
//!
//! ```no_run
//! use libretooter::config::Credentials;
//! use libretooter::platforms::{mastodon::MastodonConnector, Connector};
//!
//! # async fn example() -> libretooter::error::Result<()> {
//! let credentials = Credentials::new("id".into(), "secret".into(), "token".into());
//! let instance = MastodonConnector.connect("https://mastodon.social", &credentials)?;
//!
//! instance.verify_app_credentials().await?;
//! for mention in instance.mentions_since(None).await? {
//!     println!("{:?}", mention.status_id());
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::config::Credentials;
use crate::error::Result;
use crate::types::{AppRegistration, Mention, StatusId};

pub mod mastodon;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Redirect URI for the out-of-band flow: the instance shows the code to the user
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Scopes requested when registering the application
pub const SCOPES: &[&str] = &["read", "write"];

/// An authenticated session against one instance
#[async_trait]
pub trait Instance: Send + Sync {
    /// Check that the app credentials and token are accepted
    ///
    /// # Errors
    ///
    /// `ApiError::Unauthorized` if the instance rejects the credentials,
    /// `ApiError::UnsupportedVersion` if the instance does not offer the API.
    async fn verify_app_credentials(&self) -> Result<()>;

    /// All mention notifications newer than `since_id`
    ///
    /// Implementations follow pagination themselves; the result order is
    /// unspecified.
    async fn mentions_since(&self, since_id: Option<StatusId>) -> Result<Vec<Mention>>;

    /// Handles of the accounts that reblogged `status_id`
    async fn reblogged_by(&self, status_id: StatusId) -> Result<Vec<String>>;

    /// Reblog `status_id` as the authenticated account
    async fn reblog(&self, status_id: StatusId) -> Result<()>;
}

/// Entry point to an instance before authentication
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session with existing credentials; performs no network call
    fn connect(&self, api_base_url: &str, credentials: &Credentials) -> Result<Box<dyn Instance>>;

    /// Register a new application named `app_name`
    async fn register_app(&self, api_base_url: &str, app_name: &str) -> Result<AppRegistration>;

    /// Exchange an authorization code for an access token
    async fn exchange_code(
        &self,
        api_base_url: &str,
        app: &AppRegistration,
        code: &str,
    ) -> Result<String>;

    /// URL the operator visits to authorize `app`
    fn authorization_url(&self, api_base_url: &str, app: &AppRegistration) -> Result<String> {
        authorization_url(api_base_url, app)
    }
}

/// Build the standard `/oauth/authorize` URL for an application
pub fn authorization_url(api_base_url: &str, app: &AppRegistration) -> Result<String> {
    let mut url = url::Url::parse(api_base_url)
        .and_then(|base| base.join("/oauth/authorize"))
        .map_err(|e| {
            crate::error::ConfigError::InvalidApiBaseUrl(format!(
                "{} ({}: {})",
                crate::config::API_BASE_URL,
                api_base_url,
                e
            ))
        })?;

    url.query_pairs_mut()
        .append_pair("client_id", &app.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &app.redirect_uri)
        .append_pair("scope", &SCOPES.join(" "));

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> AppRegistration {
        AppRegistration {
            client_id: "abc123".to_string(),
            client_secret: "s3cret".to_string(),
            redirect_uri: OOB_REDIRECT_URI.to_string(),
        }
    }

    #[test]
    fn test_authorization_url() {
        let url = authorization_url("https://example.social", &app()).unwrap();
        assert!(url.starts_with("https://example.social/oauth/authorize?"));
        assert!(url.contains("client_id=abc123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("redirect_uri=urn%3Aietf%3Awg%3Aoauth%3A2.0%3Aoob"));
        assert!(url.contains("scope=read+write"));
        assert!(!url.contains("s3cret"));
    }

    #[test]
    fn test_authorization_url_ignores_base_path() {
        let url = authorization_url("https://example.social/some/path/", &app()).unwrap();
        assert!(url.starts_with("https://example.social/oauth/authorize?"));
    }
}
