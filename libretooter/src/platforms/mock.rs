//! Mock instance implementation for testing
//!
//! Simulates an instance in memory so the reposting engine and the auth
//! bootstrapper can be exercised without network access. State lives behind an
//! `Arc<Mutex<_>>`, so a test keeps a cloned handle for inspection while the
//! code under test owns a boxed copy.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::Credentials;
use crate::error::{ApiError, Result};
use crate::platforms::{Connector, Instance, OOB_REDIRECT_URI};
use crate::types::{AppRegistration, Mention, StatusId};

/// Server-side state of the mock instance
#[derive(Debug, Default)]
pub struct MockState {
    /// Mentions in the order the server returns them
    pub mentions: Vec<Mention>,

    /// Reblogger handles per status
    pub rebloggers: HashMap<StatusId, Vec<String>>,

    /// Every successful reblog, in call order
    pub reblog_calls: Vec<StatusId>,

    /// `since_id` of every mentions fetch
    pub fetch_calls: Vec<Option<StatusId>>,

    /// Number of reblogger lookups
    pub reblogged_by_calls: usize,

    /// Error returned by `verify_app_credentials`
    pub verify_error: Option<ApiError>,

    /// Error returned when reblogging this status
    pub reblog_error: Option<(StatusId, ApiError)>,
}

/// Mock authenticated session
#[derive(Clone)]
pub struct MockInstance {
    /// Handle the instance reports for the authenticated account
    acct: String,
    state: Arc<Mutex<MockState>>,
}

impl MockInstance {
    /// Create a mock session for the account reported as `acct`
    pub fn new(acct: &str) -> Self {
        Self {
            acct: acct.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Add a mention to the server's notification list
    pub fn with_mention(self, mention: Mention) -> Self {
        self.push_mention(mention);
        self
    }

    /// Mark `status_id` as already reblogged by `acct`
    pub fn with_reblogger(self, status_id: StatusId, acct: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rebloggers
            .entry(status_id)
            .or_default()
            .push(acct.to_string());
        self
    }

    /// Make credential verification fail
    pub fn with_verify_error(self, error: ApiError) -> Self {
        self.state.lock().unwrap().verify_error = Some(error);
        self
    }

    /// Make reblogging `status_id` fail
    pub fn with_reblog_error(self, status_id: StatusId, error: ApiError) -> Self {
        self.state.lock().unwrap().reblog_error = Some((status_id, error));
        self
    }

    pub fn push_mention(&self, mention: Mention) {
        self.state.lock().unwrap().mentions.push(mention);
    }

    /// Stop failing reblogs
    pub fn clear_reblog_error(&self) {
        self.state.lock().unwrap().reblog_error = None;
    }

    /// Statuses reblogged so far
    pub fn reblog_calls(&self) -> Vec<StatusId> {
        self.state.lock().unwrap().reblog_calls.clone()
    }

    /// `since_id` passed to each mentions fetch
    pub fn fetch_calls(&self) -> Vec<Option<StatusId>> {
        self.state.lock().unwrap().fetch_calls.clone()
    }

    pub fn reblogged_by_calls(&self) -> usize {
        self.state.lock().unwrap().reblogged_by_calls
    }
}

#[async_trait]
impl Instance for MockInstance {
    async fn verify_app_credentials(&self) -> Result<()> {
        match &self.state.lock().unwrap().verify_error {
            Some(error) => Err(error.clone().into()),
            None => Ok(()),
        }
    }

    async fn mentions_since(&self, since_id: Option<StatusId>) -> Result<Vec<Mention>> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls.push(since_id);

        Ok(state
            .mentions
            .iter()
            .filter(|mention| match (since_id, mention.status_id()) {
                (None, _) => true,
                (Some(floor), Some(id)) => id > floor,
                (Some(_), None) => false,
            })
            .cloned()
            .collect())
    }

    async fn reblogged_by(&self, status_id: StatusId) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.reblogged_by_calls += 1;
        Ok(state.rebloggers.get(&status_id).cloned().unwrap_or_default())
    }

    async fn reblog(&self, status_id: StatusId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some((failing, error)) = &state.reblog_error {
            if *failing == status_id {
                return Err(error.clone().into());
            }
        }

        state.reblog_calls.push(status_id);
        let acct = self.acct.clone();
        state.rebloggers.entry(status_id).or_default().push(acct);
        Ok(())
    }
}

/// Mock connector handing out a [`MockInstance`]
#[derive(Clone)]
pub struct MockConnector {
    instance: MockInstance,
    registration: AppRegistration,
    access_token: String,
    register_error: Option<ApiError>,
    calls: Arc<Mutex<ConnectorCalls>>,
}

/// What the code under test asked the connector to do
#[derive(Debug, Default, Clone)]
pub struct ConnectorCalls {
    /// Access tokens sessions were opened with
    pub connected_with: Vec<String>,
    pub registered: Vec<String>,
    /// Authorization codes exchanged
    pub exchanged: Vec<String>,
}

impl MockConnector {
    pub fn new(instance: MockInstance) -> Self {
        Self {
            instance,
            registration: AppRegistration {
                client_id: "mock-client-id".to_string(),
                client_secret: "mock-client-secret".to_string(),
                redirect_uri: OOB_REDIRECT_URI.to_string(),
            },
            access_token: "mock-access-token".to_string(),
            register_error: None,
            calls: Arc::new(Mutex::new(ConnectorCalls::default())),
        }
    }

    /// Make application registration fail
    pub fn with_register_error(mut self, error: ApiError) -> Self {
        self.register_error = Some(error);
        self
    }

    pub fn calls(&self) -> ConnectorCalls {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn connect(&self, _api_base_url: &str, credentials: &Credentials) -> Result<Box<dyn Instance>> {
        self.calls
            .lock()
            .unwrap()
            .connected_with
            .push(credentials.access_token.expose_secret().to_string());
        Ok(Box::new(self.instance.clone()))
    }

    async fn register_app(&self, _api_base_url: &str, app_name: &str) -> Result<AppRegistration> {
        self.calls
            .lock()
            .unwrap()
            .registered
            .push(app_name.to_string());

        match &self.register_error {
            Some(error) => Err(error.clone().into()),
            None => Ok(self.registration.clone()),
        }
    }

    async fn exchange_code(
        &self,
        _api_base_url: &str,
        _app: &AppRegistration,
        code: &str,
    ) -> Result<String> {
        self.calls.lock().unwrap().exchanged.push(code.to_string());
        Ok(self.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_filters_by_since_id() {
        let instance = MockInstance::new("bot")
            .with_mention(Mention::of(100, "alice@example.social"))
            .with_mention(Mention::new("n-deleted", None))
            .with_mention(Mention::of(200, "alice@example.social"));

        assert_eq!(instance.mentions_since(None).await.unwrap().len(), 3);

        let newer = instance.mentions_since(Some(100)).await.unwrap();
        assert_eq!(newer, vec![Mention::of(200, "alice@example.social")]);
        assert_eq!(instance.fetch_calls(), vec![None, Some(100)]);
    }

    #[tokio::test]
    async fn test_mock_reblog_records_reblogger() {
        let instance = MockInstance::new("bot");

        instance.reblog(42).await.unwrap();
        assert_eq!(instance.reblog_calls(), vec![42]);
        assert_eq!(instance.reblogged_by(42).await.unwrap(), vec!["bot"]);
        assert_eq!(instance.reblogged_by_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_reblog_failure() {
        let instance =
            MockInstance::new("bot").with_reblog_error(7, ApiError::RateLimit("slow".to_string()));

        let err = instance.reblog(7).await.unwrap_err();
        assert!(err.to_string().contains("slow"));
        assert!(instance.reblog_calls().is_empty());

        instance.reblog(8).await.unwrap();
        assert_eq!(instance.reblog_calls(), vec![8]);
    }

    #[tokio::test]
    async fn test_mock_connector_shares_instance_state() {
        let instance = MockInstance::new("bot");
        let connector = MockConnector::new(instance.clone());
        let credentials = Credentials::new("id".into(), "secret".into(), "token".into());

        let session = connector.connect("https://example.social", &credentials).unwrap();
        session.reblog(5).await.unwrap();

        assert_eq!(instance.reblog_calls(), vec![5]);
        assert_eq!(connector.calls().connected_with, vec!["token"]);
    }
}
