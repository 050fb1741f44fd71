//! Configuration management for Retooter
//!
//! All settings come from the process environment. The environment is captured
//! once into an [`Environment`] snapshot and resolved into an immutable
//! [`Configuration`], so nothing is looked up lazily later in the run.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::{ConfigError, Result};

pub const ACCOUNT_NAME: &str = "RETOOTER_ACCOUNT_NAME";
pub const ALLOWED_ACCOUNTS: &str = "RETOOTER_ALLOWED_ACCOUNTS";
pub const API_BASE_URL: &str = "RETOOTER_API_BASE_URL";
pub const DRY_RUN: &str = "RETOOTER_DRY_RUN";
pub const CLIENT_ID: &str = "CLIENT_ID";
pub const CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const GITHUB_ACTIONS: &str = "GITHUB_ACTIONS";

/// Every variable retooter reads
pub const VARIABLES: [&str; 8] = [
    ACCOUNT_NAME,
    ALLOWED_ACCOUNTS,
    API_BASE_URL,
    DRY_RUN,
    CLIENT_ID,
    CLIENT_SECRET,
    ACCESS_TOKEN,
    GITHUB_ACTIONS,
];

/// Snapshot of environment variables
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotUnicode` if one of [`VARIABLES`] holds a value
    /// that is not valid UTF-8.
    pub fn from_process() -> Result<Self> {
        Self::from_os_vars(std::env::vars_os())
    }

    /// Build a snapshot from raw OS strings
    ///
    /// Entries that are not valid UTF-8 are left out, unless they are one of
    /// [`VARIABLES`].
    pub fn from_os_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut snapshot = HashMap::new();
        for (name, value) in vars {
            match (name.into_string(), value.into_string()) {
                (Ok(name), Ok(value)) => {
                    snapshot.insert(name, value);
                }
                (Ok(name), Err(_)) if VARIABLES.contains(&name.as_str()) => {
                    return Err(ConfigError::NotUnicode(name).into());
                }
                (name, _) => {
                    tracing::debug!(?name, "Ignoring environment variable that is not UTF-8");
                }
            }
        }

        Ok(Self { vars: snapshot })
    }

    /// Look up a variable, `None` if unset
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Look up a variable, treating blank values as unset
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// A fully qualified account handle, `user@domain`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountName {
    handle: String,
    split: usize,
}

impl AccountName {
    /// Parse a handle, requiring exactly one `@` with text on both sides
    pub fn parse(raw: &str) -> Option<Self> {
        let handle = raw.trim();
        let mut parts = handle.split('@');
        let (local, domain) = (parts.next()?, parts.next()?);
        if parts.next().is_some() || local.is_empty() || domain.is_empty() {
            return None;
        }

        Some(Self {
            handle: handle.to_string(),
            split: local.len(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.handle
    }

    /// The part before the `@`
    pub fn local_part(&self) -> &str {
        &self.handle[..self.split]
    }

    /// The instance domain after the `@`
    pub fn domain(&self) -> &str {
        &self.handle[self.split + 1..]
    }

    /// Whether `acct` names this account
    ///
    /// Instances report local accounts without the domain, so a bare local part
    /// matches as well as the full handle.
    pub fn matches(&self, acct: &str) -> bool {
        acct == self.handle || acct == self.local_part()
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.handle)
    }
}

/// Resolved, immutable run configuration
#[derive(Debug, Clone)]
pub struct Configuration {
    pub account_name: AccountName,
    pub allowed_accounts: Vec<String>,
    pub api_base_url: String,
    pub dry_run: bool,
    /// Running under CI, where nobody can answer an interactive prompt
    pub ci: bool,
}

impl Configuration {
    /// Resolve configuration from the current process environment
    pub fn from_process() -> Result<Self> {
        Self::resolve(&Environment::from_process()?)
    }

    /// Resolve configuration from an environment snapshot
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the account name is missing or lacks an instance
    /// domain, the allow-list is empty, or an explicit API base URL is malformed.
    pub fn resolve(env: &Environment) -> Result<Self> {
        let account_name = resolve_account_name(env)?;
        let allowed_accounts = resolve_allowed_accounts(env)?;
        let api_base_url = resolve_api_base_url(env, &account_name)?;

        Ok(Self {
            account_name,
            allowed_accounts,
            api_base_url,
            dry_run: env.get(DRY_RUN).map(parse_flag).unwrap_or(false),
            ci: env.contains(GITHUB_ACTIONS),
        })
    }

    /// Whether mentions by `acct` may be reblogged
    pub fn is_allowed(&self, acct: &str) -> bool {
        self.allowed_accounts.iter().any(|allowed| allowed == acct)
    }
}

fn resolve_account_name(env: &Environment) -> Result<AccountName> {
    env.non_empty(ACCOUNT_NAME)
        .and_then(AccountName::parse)
        .ok_or_else(|| ConfigError::NoAccountNameDefined(ACCOUNT_NAME.to_string()).into())
}

fn resolve_allowed_accounts(env: &Environment) -> Result<Vec<String>> {
    let allowed: Vec<String> = env
        .get(ALLOWED_ACCOUNTS)
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if allowed.is_empty() {
        return Err(ConfigError::NoAllowedAccountsDefined(ALLOWED_ACCOUNTS.to_string()).into());
    }
    Ok(allowed)
}

fn resolve_api_base_url(env: &Environment, account_name: &AccountName) -> Result<String> {
    let Some(raw) = env.non_empty(API_BASE_URL) else {
        return Ok(format!("https://{}", account_name.domain()));
    };

    match Url::parse(raw) {
        Ok(url) if !url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty()) => {
            Ok(raw.to_string())
        }
        _ => Err(ConfigError::InvalidApiBaseUrl(API_BASE_URL.to_string()).into()),
    }
}

/// Boolean-like environment values: `true`, `t`, `yes`, `y`, any case
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "t" | "yes" | "y"
    )
}

/// API session credentials
pub struct Credentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub access_token: SecretString,
}

impl Credentials {
    pub fn new(client_id: String, client_secret: String, access_token: String) -> Self {
        Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            access_token: SecretString::from(access_token),
        }
    }

    /// Read credentials from the environment
    ///
    /// Returns `None` unless all three values are present and non-empty.
    pub fn resolve(env: &Environment) -> Option<Self> {
        Some(Self::new(
            env.non_empty(CLIENT_ID)?.to_string(),
            env.non_empty(CLIENT_SECRET)?.to_string(),
            env.non_empty(ACCESS_TOKEN)?.to_string(),
        ))
    }

    /// Render the credentials as environment assignments for the operator
    pub fn to_env_lines(&self) -> String {
        format!(
            "{}: {}\n{}: {}\n{}: {}\n",
            CLIENT_ID,
            self.client_id,
            CLIENT_SECRET,
            self.client_secret.expose_secret(),
            ACCESS_TOKEN,
            self.access_token.expose_secret(),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}
