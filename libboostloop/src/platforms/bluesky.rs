//! Bluesky platform implementation
//!
//! Talks XRPC to the account's PDS directly over HTTPS. The access token is
//! refreshed (or the session recreated) once when the PDS reports it expired.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::ExposeSecret;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::{Credentials, ServiceConfig};
use crate::error::{PlatformError, Result};
use crate::platforms::SocialClient;
use crate::types::{Page, Post, Profile};

const FOLLOW_COLLECTION: &str = "app.bsky.graph.follow";
const REPOST_COLLECTION: &str = "app.bsky.feed.repost";

/// A failed XRPC exchange, before classification
#[derive(Debug)]
enum XrpcError {
    Transport(reqwest::Error),
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    Decode(String),
}

impl XrpcError {
    fn is_expired_token(&self) -> bool {
        matches!(self, XrpcError::Status { code: Some(code), .. } if code == "ExpiredToken")
    }
}

impl std::fmt::Display for XrpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            XrpcError::Transport(e) => write!(f, "{}", e),
            XrpcError::Status {
                status,
                code: Some(code),
                message,
            } => write!(f, "{} {}: {}", status, code, message),
            XrpcError::Status {
                status, message, ..
            } => write!(f, "{}: {}", status, message),
            XrpcError::Decode(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Map an XRPC failure to PlatformError
///
/// Uses the HTTP status first and the AT Protocol error code second.
fn map_bluesky_error(error: &XrpcError, context: &str) -> PlatformError {
    let (status, code) = match error {
        XrpcError::Transport(e) => {
            let kind = if e.is_timeout() {
                "timed out"
            } else if e.is_connect() {
                "could not connect"
            } else {
                "request failed"
            };
            return PlatformError::Network(format!(
                "Network error while contacting the Bluesky PDS during {} ({}): {}",
                context, kind, error
            ));
        }
        XrpcError::Decode(_) => {
            return PlatformError::Decode(format!(
                "Bluesky returned an unexpected response during {}: {}",
                context, error
            ));
        }
        XrpcError::Status { status, code, .. } => (*status, code.as_deref().unwrap_or("")),
    };

    if context == "authentication"
        && (status == 401 || code == "AuthenticationRequired" || code == "InvalidCredentials")
    {
        return PlatformError::Authentication(format!(
            "Invalid Bluesky credentials: {}. Please check your handle and app password.",
            error
        ));
    }

    if status == 401
        || status == 403
        || matches!(
            code,
            "AuthenticationRequired" | "InvalidToken" | "ExpiredToken" | "AccountTakedown"
        )
    {
        return PlatformError::Authentication(format!(
            "Bluesky authentication failed during {}: {}. Please check your credentials.",
            context, error
        ));
    }

    if status == 429 || code == "RateLimitExceeded" {
        return PlatformError::RateLimit(format!(
            "Bluesky rate limit exceeded during {}: {}",
            context, error
        ));
    }

    if (400..500).contains(&status) {
        return PlatformError::Request(format!(
            "Bluesky rejected the request during {}: {}",
            context, error
        ));
    }

    if status >= 500 {
        return PlatformError::Network(format!(
            "Bluesky PDS unavailable during {}: {}",
            context, error
        ));
    }

    PlatformError::Action(format!(
        "Bluesky operation failed during {}: {}",
        context, error
    ))
}

async fn execute(request: reqwest::RequestBuilder) -> std::result::Result<String, XrpcError> {
    let resp = request.send().await.map_err(XrpcError::Transport)?;
    let status = resp.status();
    let body = resp.text().await.map_err(XrpcError::Transport)?;

    if !status.is_success() {
        let parsed: Option<XrpcErrorBody> = serde_json::from_str(&body).ok();
        let (code, message) = match parsed {
            Some(b) => (b.error, b.message.unwrap_or_default()),
            None => (None, body),
        };
        return Err(XrpcError::Status {
            status: status.as_u16(),
            code,
            message,
        });
    }

    Ok(body)
}

fn parse<T: DeserializeOwned>(body: &str) -> std::result::Result<T, XrpcError> {
    serde_json::from_str(body).map_err(|e| XrpcError::Decode(e.to_string()))
}

/// Split `at://<repo>/<collection>/<rkey>`
fn parse_at_uri(uri: &str) -> Option<(&str, &str, &str)> {
    let rest = uri.strip_prefix("at://")?;
    let mut parts = rest.splitn(3, '/');
    let repo = parts.next().filter(|s| !s.is_empty())?;
    let collection = parts.next().filter(|s| !s.is_empty())?;
    let rkey = parts.next().filter(|s| !s.is_empty() && !s.contains('/'))?;
    Some((repo, collection, rkey))
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Wire types

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
    handle: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewerState {
    following: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView {
    did: String,
    handle: String,
    viewer: Option<ViewerState>,
}

impl From<ProfileView> for Profile {
    fn from(view: ProfileView) -> Self {
        Profile {
            did: view.did,
            handle: view.handle,
            following_uri: view.viewer.and_then(|v| v.following),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FollowersOutput {
    followers: Vec<ProfileView>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FollowsOutput {
    follows: Vec<ProfileView>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimelineOutput {
    feed: Vec<FeedViewPost>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedViewPost {
    post: PostView,
    reply: Option<IgnoredAny>,
    reason: Option<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    cid: String,
    author: AuthorView,
    record: PostRecord,
    like_count: Option<u64>,
    repost_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AuthorView {
    handle: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord {
    #[serde(default)]
    text: String,
    created_at: Option<String>,
    reply: Option<IgnoredAny>,
}

impl FeedViewPost {
    /// Convert to a domain post; entries without a usable timestamp are dropped
    fn into_post(self) -> Option<Post> {
        let created_at = self
            .post
            .record
            .created_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let Some(created_at) = created_at else {
            debug!("Skipping {}: no parsable createdAt", self.post.uri);
            return None;
        };

        Some(Post {
            is_reply: self.post.record.reply.is_some() || self.reply.is_some(),
            is_repost: self.reason.is_some(),
            uri: self.post.uri,
            cid: self.post.cid,
            author: self.post.author.handle,
            text: self.post.record.text,
            created_at,
            like_count: self.post.like_count.unwrap_or(0),
            repost_count: self.post.repost_count.unwrap_or(0),
        })
    }
}

pub struct BlueskyClient {
    http: reqwest::Client,
    service: String,
    credentials: Credentials,
    session: RwLock<Option<Session>>,
}

impl BlueskyClient {
    /// Create a new Bluesky client
    ///
    /// No network traffic happens until [`SocialClient::authenticate`].
    pub fn new(config: &ServiceConfig, credentials: Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("boostloop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            service: config.url.trim_end_matches('/').to_string(),
            credentials,
            session: RwLock::new(None),
        })
    }

    fn xrpc_url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service, nsid)
    }

    /// The logged-in account's DID
    pub async fn did(&self) -> Result<String> {
        Ok(self.current_session().await?.did)
    }

    async fn current_session(&self) -> Result<Session> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| PlatformError::Authentication("Not authenticated".to_string()).into())
    }

    async fn create_session(&self) -> Result<Session> {
        debug!(
            "Creating Bluesky session for handle: {}",
            self.credentials.identifier
        );

        let request = self
            .http
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.credentials.identifier,
                "password": self.credentials.password.expose_secret(),
            }));

        let session: Session = execute(request)
            .await
            .and_then(|body| parse(&body))
            .map_err(|e| map_bluesky_error(&e, "authentication"))?;

        debug!("Bluesky session created for {} ({})", session.handle, session.did);
        Ok(session)
    }

    /// Refresh the access token, falling back to a fresh login
    async fn renew_session(&self) -> Result<()> {
        let refresh_jwt = self.current_session().await?.refresh_jwt;

        let request = self
            .http
            .post(self.xrpc_url("com.atproto.server.refreshSession"))
            .bearer_auth(refresh_jwt);

        let session = match execute(request).await.and_then(|body| parse::<Session>(&body)) {
            Ok(session) => {
                debug!("Refreshed Bluesky session");
                session
            }
            Err(e) => {
                debug!("Session refresh failed ({}), logging in again", e);
                self.create_session().await?
            }
        };

        *self.session.write().await = Some(session);
        Ok(())
    }

    /// Send an authenticated XRPC request, renewing the session once if expired
    async fn call<F>(&self, context: &str, build: F) -> Result<String>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.current_session().await?.access_jwt;
        match execute(build(&token)).await {
            Err(e) if e.is_expired_token() => {
                debug!("Access token expired during {}", context);
                self.renew_session().await?;
                let token = self.current_session().await?.access_jwt;
                execute(build(&token))
                    .await
                    .map_err(|e| map_bluesky_error(&e, context).into())
            }
            other => other.map_err(|e| map_bluesky_error(&e, context).into()),
        }
    }

    async fn query<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, String)],
        context: &str,
    ) -> Result<T> {
        let url = self.xrpc_url(nsid);
        let body = self
            .call(context, |token| {
                self.http.get(&url).query(params).bearer_auth(token)
            })
            .await?;
        parse(&body).map_err(|e| map_bluesky_error(&e, context).into())
    }

    async fn procedure(&self, nsid: &str, input: serde_json::Value, context: &str) -> Result<()> {
        let url = self.xrpc_url(nsid);
        self.call(context, |token| {
            self.http.post(&url).json(&input).bearer_auth(token)
        })
        .await?;
        Ok(())
    }

    async fn page_params(
        &self,
        cursor: Option<&str>,
        limit: u32,
        with_actor: bool,
    ) -> Result<Vec<(&'static str, String)>> {
        let mut params = vec![("limit", limit.to_string())];
        if with_actor {
            params.push(("actor", self.did().await?));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        Ok(params)
    }

    async fn create_record(
        &self,
        collection: &str,
        record: serde_json::Value,
        context: &str,
    ) -> Result<()> {
        let repo = self.did().await?;
        self.procedure(
            "com.atproto.repo.createRecord",
            json!({
                "repo": repo,
                "collection": collection,
                "record": record,
            }),
            context,
        )
        .await
    }
}

#[async_trait]
impl SocialClient for BlueskyClient {
    async fn authenticate(&mut self) -> Result<()> {
        let session = self.create_session().await?;
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn list_followers(&self, cursor: Option<&str>, limit: u32) -> Result<Page<Profile>> {
        let params = self.page_params(cursor, limit, true).await?;
        let out: FollowersOutput = self
            .query("app.bsky.graph.getFollowers", &params, "listing followers")
            .await?;
        Ok(Page::new(
            out.followers.into_iter().map(Profile::from).collect(),
            out.cursor,
        ))
    }

    async fn list_following(&self, cursor: Option<&str>, limit: u32) -> Result<Page<Profile>> {
        let params = self.page_params(cursor, limit, true).await?;
        let out: FollowsOutput = self
            .query("app.bsky.graph.getFollows", &params, "listing follows")
            .await?;
        Ok(Page::new(
            out.follows.into_iter().map(Profile::from).collect(),
            out.cursor,
        ))
    }

    async fn timeline(&self, cursor: Option<&str>, limit: u32) -> Result<Page<Post>> {
        let params = self.page_params(cursor, limit, false).await?;
        let out: TimelineOutput = self
            .query("app.bsky.feed.getTimeline", &params, "reading timeline")
            .await?;
        Ok(Page::new(
            out.feed.into_iter().filter_map(FeedViewPost::into_post).collect(),
            out.cursor,
        ))
    }

    async fn follow(&self, did: &str) -> Result<()> {
        self.create_record(
            FOLLOW_COLLECTION,
            json!({
                "$type": FOLLOW_COLLECTION,
                "subject": did,
                "createdAt": now_timestamp(),
            }),
            "follow",
        )
        .await
    }

    async fn unfollow(&self, following_uri: &str) -> Result<()> {
        let (repo, collection, rkey) = parse_at_uri(following_uri).ok_or_else(|| {
            PlatformError::Request(format!("Not a follow record URI: {}", following_uri))
        })?;
        self.procedure(
            "com.atproto.repo.deleteRecord",
            json!({
                "repo": repo,
                "collection": collection,
                "rkey": rkey,
            }),
            "unfollow",
        )
        .await
    }

    async fn repost(&self, post: &Post) -> Result<()> {
        self.create_record(
            REPOST_COLLECTION,
            json!({
                "$type": REPOST_COLLECTION,
                "subject": { "uri": post.uri, "cid": post.cid },
                "createdAt": now_timestamp(),
            }),
            "repost",
        )
        .await
    }

    fn name(&self) -> &str {
        "bluesky"
    }
}
