//! Mastodon instance implementation
//!
//! Talks to Mastodon-compatible instances through the megalodon library.

use std::future::Future;

use async_trait::async_trait;
use megalodon::entities::notification::NotificationType;
use megalodon::entities::Notification;
use megalodon::error::{Error as MegalodonError, Kind, OwnError};
use megalodon::megalodon::{AppInputOptions, GetNotificationsInputOptions};
use megalodon::{Megalodon, SNS};
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::config::Credentials;
use crate::error::{ApiError, Result};
use crate::platforms::{Connector, Instance, OOB_REDIRECT_URI, SCOPES};
use crate::types::{AppRegistration, Mention, MentionedStatus, StatusId};

/// Page size requested from the notifications endpoint (Mastodon's maximum)
const PAGE_LIMIT: u32 = 40;

/// Notification types excluded server-side so mostly mentions come back
fn excluded_types() -> Vec<NotificationType> {
    vec![
        NotificationType::Follow,
        NotificationType::FollowRequest,
        NotificationType::Reblog,
        NotificationType::Favourite,
    ]
}

type Client = Box<dyn Megalodon + Send + Sync>;

fn client(api_base_url: &str, access_token: Option<String>) -> Result<Client> {
    megalodon::generator(SNS::Mastodon, api_base_url.to_string(), access_token, None)
        .map_err(|e| map_megalodon_error(e, "create client").into())
}

/// Authenticated Mastodon session
pub struct MastodonInstance {
    client: Client,
}

impl MastodonInstance {
    /// Create a session for `api_base_url` using `access_token`
    pub fn new(api_base_url: &str, access_token: String) -> Result<Self> {
        Ok(Self {
            client: client(api_base_url, Some(access_token))?,
        })
    }

    async fn mentions_page(
        &self,
        since_id: Option<StatusId>,
        max_id: Option<String>,
    ) -> Result<Vec<Notification>> {
        let options = GetNotificationsInputOptions {
            limit: Some(PAGE_LIMIT),
            since_id: since_id.map(|id| id.to_string()),
            max_id,
            exclude_types: Some(excluded_types()),
            ..Default::default()
        };

        let response = self
            .client
            .get_notifications(Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "list notifications"))?;
        Ok(response.json)
    }
}

#[async_trait]
impl Instance for MastodonInstance {
    async fn verify_app_credentials(&self) -> Result<()> {
        self.client
            .verify_app_credentials()
            .await
            .map_err(map_verification_error)?;
        Ok(())
    }

    async fn mentions_since(&self, since_id: Option<StatusId>) -> Result<Vec<Mention>> {
        let mentions = collect_mentions(|max_id| self.mentions_page(since_id, max_id)).await?;

        debug!(count = mentions.len(), ?since_id, "Fetched mentions");
        Ok(mentions)
    }

    async fn reblogged_by(&self, status_id: StatusId) -> Result<Vec<String>> {
        let response = self
            .client
            .get_status_reblogged_by(status_id.to_string())
            .await
            .map_err(|e| map_megalodon_error(e, "list rebloggers"))?;

        Ok(response.json.into_iter().map(|account| account.acct).collect())
    }

    async fn reblog(&self, status_id: StatusId) -> Result<()> {
        self.client
            .reblog_status(status_id.to_string())
            .await
            .map_err(|e| map_megalodon_error(e, "reblog status"))?;
        Ok(())
    }
}

/// Walk notification pages newest to oldest and keep the mentions
///
/// `fetch_page` receives the `max_id` to continue from (`None` for the first
/// page). Paging stops at the first page shorter than [`PAGE_LIMIT`].
async fn collect_mentions<F, Fut>(mut fetch_page: F) -> Result<Vec<Mention>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Vec<Notification>>>,
{
    let mut mentions = Vec::new();
    let mut max_id = None;

    loop {
        let page = fetch_page(max_id.take()).await?;
        let Some(last) = page.last() else {
            break;
        };
        let next_max_id = last.id.clone();
        let full_page = page.len() >= PAGE_LIMIT as usize;

        mentions.extend(
            page.into_iter()
                .filter(|notification| matches!(notification.r#type, NotificationType::Mention))
                .map(to_mention),
        );

        if !full_page {
            break;
        }
        max_id = Some(next_max_id);
    }

    Ok(mentions)
}

fn to_mention(notification: Notification) -> Mention {
    let status = notification.status.and_then(|status| match status.id.parse() {
        Ok(id) => Some(MentionedStatus {
            id,
            acct: status.account.acct,
        }),
        Err(_) => {
            warn!(status_id = %status.id, "Skipping status with non-numeric id");
            None
        }
    });

    Mention::new(notification.id, status)
}

/// Opens megalodon sessions and runs the OAuth application flow
#[derive(Debug, Clone, Copy, Default)]
pub struct MastodonConnector;

#[async_trait]
impl Connector for MastodonConnector {
    fn connect(&self, api_base_url: &str, credentials: &Credentials) -> Result<Box<dyn Instance>> {
        let instance = MastodonInstance::new(
            api_base_url,
            credentials.access_token.expose_secret().to_string(),
        )?;
        Ok(Box::new(instance))
    }

    async fn register_app(&self, api_base_url: &str, app_name: &str) -> Result<AppRegistration> {
        let options = AppInputOptions {
            scopes: Some(SCOPES.iter().map(|scope| scope.to_string()).collect()),
            redirect_uris: Some(OOB_REDIRECT_URI.to_string()),
            ..Default::default()
        };

        let app = client(api_base_url, None)?
            .register_app(app_name.to_string(), &options)
            .await
            .map_err(|e| map_megalodon_error(e, "register app"))?;

        Ok(AppRegistration {
            client_id: app.client_id,
            client_secret: app.client_secret,
            redirect_uri: OOB_REDIRECT_URI.to_string(),
        })
    }

    async fn exchange_code(
        &self,
        api_base_url: &str,
        app: &AppRegistration,
        code: &str,
    ) -> Result<String> {
        let token = client(api_base_url, None)?
            .fetch_access_token(
                app.client_id.clone(),
                app.client_secret.clone(),
                code.to_string(),
                app.redirect_uri.clone(),
            )
            .await
            .map_err(|e| map_megalodon_error(e, "fetch access token"))?;

        Ok(token.access_token)
    }
}

/// Map errors from the credential check
///
/// A missing endpoint or an unparseable answer at verification time means the
/// base URL does not point at a compatible API, which is reported separately
/// from ordinary failures.
fn map_verification_error(error: MegalodonError) -> ApiError {
    match http_status(&error) {
        Some(404) | Some(410) | Some(501) => ApiError::UnsupportedVersion(format!(
            "Mastodon API not available (verify credentials): {}",
            error
        )),
        _ => match map_megalodon_error(error, "verify credentials") {
            ApiError::Response(msg) => ApiError::UnsupportedVersion(msg),
            other => other,
        },
    }
}

/// HTTP status carried by a megalodon error
///
/// Uses the structured status when megalodon reports one and falls back to
/// scanning the message otherwise.
fn http_status(error: &MegalodonError) -> Option<u16> {
    match error {
        MegalodonError::OwnError(OwnError {
            status: Some(code), ..
        }) => Some(*code),
        MegalodonError::RequestError(e) => e
            .status()
            .map(|status| status.as_u16())
            .or_else(|| extract_http_status(&e.to_string())),
        other => extract_http_status(&other.to_string()),
    }
}

fn is_parse_error(error: &MegalodonError) -> bool {
    matches!(
        error,
        MegalodonError::JsonError(_)
            | MegalodonError::OwnError(OwnError {
                kind: Kind::ParseError,
                ..
            })
    )
}

/// Map megalodon errors to ApiError
///
/// # Error Mapping
///
/// - HTTP 401/403 → `ApiError::Unauthorized`
/// - HTTP 429 → `ApiError::RateLimit`
/// - HTTP 5xx → `ApiError::Server`
/// - Parse errors → `ApiError::Response`
/// - Other errors → `ApiError::Network`
fn map_megalodon_error(error: MegalodonError, context: &str) -> ApiError {
    let error_str = error.to_string();
    let error_lower = error_str.to_lowercase();

    match http_status(&error) {
        Some(401) | Some(403) => {
            ApiError::Unauthorized(format!("Mastodon rejected credentials ({}): {}", context, error_str))
        }
        Some(429) => ApiError::RateLimit(format!(
            "Mastodon rate limit exceeded ({}): {}. \
                    Suggestion: Run less often or wait before the next run.",
            context, error_str
        )),
        Some(500..=599) => ApiError::Server(format!("Mastodon server error ({}): {}", context, error_str)),
        Some(_) => ApiError::Network(format!("Mastodon HTTP error ({}): {}", context, error_str)),
        None => {
            if is_parse_error(&error)
                || error_lower.contains("parse")
                || error_lower.contains("deserialize")
            {
                ApiError::Response(format!(
                    "Mastodon response parse error ({}): {}. \
                        Suggestion: The instance may run an incompatible version.",
                    context, error_str
                ))
            } else if error_lower.contains("unauthorized") || error_lower.contains("forbidden") {
                ApiError::Unauthorized(format!(
                    "Mastodon rejected credentials ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("rate limit") || error_lower.contains("too many requests")
            {
                ApiError::RateLimit(format!("Mastodon rate limit exceeded ({}): {}", context, error_str))
            } else {
                ApiError::Network(format!(
                    "Mastodon error ({}): {}. \
                        Suggestion: Check your network connection and instance availability.",
                    context, error_str
                ))
            }
        }
    }
}

/// Extract an HTTP status code from an error message
///
/// Looks for patterns like "HTTP 401", "status 403", a standalone "429:" or a
/// trailing code as in megalodon's "http status error: ... 401".
fn extract_http_status(error_str: &str) -> Option<u16> {
    let prefixes = ["HTTP ", "status ", "code: ", "status_code: "];

    for prefix in &prefixes {
        if let Some(pos) = error_str.find(prefix) {
            let after_prefix = &error_str[pos + prefix.len()..];
            if let Some(code) = after_prefix.get(0..3).and_then(|s| s.parse::<u16>().ok()) {
                if (100..=599).contains(&code) {
                    return Some(code);
                }
            }
        }
    }

    let bytes = error_str.as_bytes();
    for (i, window) in bytes.windows(3).enumerate() {
        let terminated = matches!(bytes.get(i + 3), None | Some(b':') | Some(b' '));
        if window.iter().all(u8::is_ascii_digit)
            && terminated
            && (i == 0 || !bytes[i - 1].is_ascii_digit())
        {
            let code = std::str::from_utf8(window).ok()?.parse::<u16>().ok()?;
            if (100..=599).contains(&code) {
                return Some(code);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    const VERIFY_URL: &str = "https://example.social/api/v1/apps/verify_credentials";

    fn http_error(status: u16) -> MegalodonError {
        MegalodonError::new_own(
            r#"{"error":"The access token is invalid"}"#.to_string(),
            Kind::HTTPStatusError,
            Some(VERIFY_URL.to_string()),
            Some(status),
            None,
        )
    }

    fn account(acct: &str) -> Value {
        json!({
            "id": "1",
            "username": acct.split('@').next().unwrap_or(acct),
            "acct": acct,
            "display_name": "",
            "locked": false,
            "created_at": "2024-05-01T12:00:00.000Z",
            "followers_count": 0,
            "following_count": 0,
            "statuses_count": 0,
            "note": "",
            "url": "https://example.social/@someone",
            "avatar": "",
            "avatar_static": "",
            "header": "",
            "header_static": "",
            "emojis": [],
            "fields": [],
            "bot": false
        })
    }

    fn notification(kind: &str, status: Option<(&str, &str)>) -> Notification {
        let status = status.map(|(id, acct)| {
            json!({
                "id": id,
                "uri": format!("https://example.social/statuses/{}", id),
                "account": account(acct),
                "content": "<p>@bot hello</p>",
                "created_at": "2024-05-01T12:00:00.000Z",
                "emojis": [],
                "replies_count": 0,
                "reblogs_count": 0,
                "favourites_count": 0,
                "sensitive": false,
                "spoiler_text": "",
                "visibility": "public",
                "media_attachments": [],
                "mentions": [],
                "tags": [],
                "quote": false
            })
        });
        let id = status
            .as_ref()
            .and_then(|status| status["id"].as_str().map(|id| format!("n{}", id)))
            .unwrap_or_else(|| format!("n-{}", kind));

        serde_json::from_value(json!({
            "id": id,
            "type": kind,
            "created_at": "2024-05-01T12:00:00.000Z",
            "status": status,
        }))
        .unwrap()
    }

    fn mention(status_id: u64) -> Notification {
        notification("mention", Some((&status_id.to_string(), "alice@example.social")))
    }

    /// Serves `pages` in order and records the `max_id` of every request
    struct Pages {
        pages: RefCell<VecDeque<Vec<Notification>>>,
        requests: RefCell<Vec<Option<String>>>,
    }

    impl Pages {
        fn new(pages: Vec<Vec<Notification>>) -> Self {
            Self {
                pages: RefCell::new(pages.into()),
                requests: RefCell::new(Vec::new()),
            }
        }

        fn fetch(&self, max_id: Option<String>) -> std::future::Ready<Result<Vec<Notification>>> {
            self.requests.borrow_mut().push(max_id);
            std::future::ready(Ok(self.pages.borrow_mut().pop_front().unwrap_or_default()))
        }

        fn requests(&self) -> Vec<Option<String>> {
            self.requests.borrow().clone()
        }
    }

    #[tokio::test]
    async fn test_collect_mentions_follows_max_id_until_short_page() {
        let full_page: Vec<Notification> = (1000..1040).rev().map(mention).collect();
        assert_eq!(full_page.len(), PAGE_LIMIT as usize);
        let short_page = vec![mention(900), mention(899)];
        let pages = Pages::new(vec![full_page, short_page]);

        let mentions = collect_mentions(|max_id| pages.fetch(max_id)).await.unwrap();

        assert_eq!(pages.requests(), vec![None, Some("n1000".to_string())]);
        assert_eq!(mentions.len(), 42);
        assert_eq!(mentions.first().and_then(Mention::status_id), Some(1039));
        assert_eq!(mentions.last().and_then(Mention::status_id), Some(899));
    }

    #[tokio::test]
    async fn test_collect_mentions_empty_first_page() {
        let pages = Pages::new(vec![Vec::new()]);

        let mentions = collect_mentions(|max_id| pages.fetch(max_id)).await.unwrap();

        assert!(mentions.is_empty());
        assert_eq!(pages.requests(), vec![None]);
    }

    #[tokio::test]
    async fn test_collect_mentions_drops_other_notification_types() {
        let pages = Pages::new(vec![vec![
            notification("update", Some(("120", "alice@example.social"))),
            mention(110),
            notification("status", Some(("105", "alice@example.social"))),
            notification("poll_expired", None),
            notification("mention", None),
        ]]);

        let mentions = collect_mentions(|max_id| pages.fetch(max_id)).await.unwrap();

        assert_eq!(pages.requests(), vec![None]);
        assert_eq!(mentions.len(), 2);
        assert_eq!(
            mentions[0].status,
            Some(MentionedStatus {
                id: 110,
                acct: "alice@example.social".to_string()
            })
        );
        assert_eq!(mentions[1].status, None);
    }

    #[tokio::test]
    async fn test_collect_mentions_propagates_page_error() {
        let failing = |_: Option<String>| {
            let page: Result<Vec<Notification>> =
                Err(map_megalodon_error(http_error(503), "list notifications").into());
            std::future::ready(page)
        };

        let result = collect_mentions(failing).await;

        assert!(matches!(
            result,
            Err(crate::error::RetooterError::Api(ApiError::Server(_)))
        ));
    }

    #[test]
    fn test_non_numeric_status_id_has_no_status() {
        let mention = to_mention(notification("mention", Some(("AbC9", "alice@pleroma.example"))));
        assert_eq!(mention.status, None);
        assert_eq!(mention.notification_id, "nAbC9");
    }

    #[test]
    fn test_verification_unauthorized_status() {
        for status in [401, 403] {
            assert!(matches!(
                map_verification_error(http_error(status)),
                ApiError::Unauthorized(_)
            ));
        }
    }

    #[test]
    fn test_verification_missing_endpoint_is_unsupported() {
        for status in [404, 410, 501] {
            assert!(matches!(
                map_verification_error(http_error(status)),
                ApiError::UnsupportedVersion(_)
            ));
        }
    }

    #[test]
    fn test_verification_parse_error_is_unsupported() {
        let error = MegalodonError::new_own(
            "unexpected body".to_string(),
            Kind::ParseError,
            Some(VERIFY_URL.to_string()),
            None,
            None,
        );
        assert!(matches!(
            map_verification_error(error),
            ApiError::UnsupportedVersion(_)
        ));

        let json_error = serde_json::from_str::<u32>("<html>").unwrap_err();
        assert!(matches!(
            map_verification_error(MegalodonError::JsonError(json_error)),
            ApiError::UnsupportedVersion(_)
        ));
    }

    #[test]
    fn test_map_megalodon_error_uses_status_field() {
        assert!(matches!(
            map_megalodon_error(http_error(429), "reblog status"),
            ApiError::RateLimit(_)
        ));
        assert!(matches!(
            map_megalodon_error(http_error(503), "reblog status"),
            ApiError::Server(_)
        ));
        assert!(matches!(
            map_megalodon_error(http_error(422), "reblog status"),
            ApiError::Network(_)
        ));
        assert!(matches!(
            map_megalodon_error(http_error(401), "reblog status"),
            ApiError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_extract_http_status_trailing_code() {
        assert_eq!(extract_http_status(&http_error(401).to_string()), Some(401));
        assert_eq!(extract_http_status("http status error: gone 410"), Some(410));
    }

    #[test]
    fn test_extract_http_status_prefixed() {
        assert_eq!(extract_http_status("HTTP 401 Unauthorized"), Some(401));
        assert_eq!(extract_http_status("request failed with status 429"), Some(429));
        assert_eq!(extract_http_status("code: 503, message: down"), Some(503));
    }

    #[test]
    fn test_extract_http_status_standalone() {
        assert_eq!(extract_http_status("404: Record not found"), Some(404));
        assert_eq!(extract_http_status("error 502 bad gateway"), Some(502));
    }

    #[test]
    fn test_extract_http_status_ignores_longer_numbers() {
        assert_eq!(extract_http_status("status id 1094123 missing"), None);
        assert_eq!(extract_http_status("no status here"), None);
    }

    #[test]
    fn test_mastodon_instance_creation() {
        assert!(MastodonInstance::new("https://mastodon.social", "token".to_string()).is_ok());
    }

    #[test]
    fn test_connector_opens_session_without_network() {
        let credentials = Credentials::new("id".into(), "secret".into(), "token".into());
        assert!(MastodonConnector
            .connect("https://mastodon.social", &credentials)
            .is_ok());
    }

    #[test]
    fn test_excluded_types_keep_mentions() {
        assert!(!excluded_types()
            .iter()
            .any(|kind| matches!(kind, NotificationType::Mention)));
    }
}
