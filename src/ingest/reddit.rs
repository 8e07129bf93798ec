use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::reddit::RedditCredentials;
use crate::ingest::types::{CandidateItem, ItemPayload, SourceProvider};

pub const AUTH_BASE: &str = "https://www.reddit.com";
pub const API_BASE: &str = "https://oauth.reddit.com";
const PERMALINK_BASE: &str = "https://reddit.com";

/// What a source identifier points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedditSource {
    /// `r/<sub>`
    SubredditPosts(String),
    /// `r/<sub>/comments`
    SubredditComments(String),
    /// `me/comments`
    MyComments,
    /// `inbox` (unread only)
    Inbox,
}

impl FromStr for RedditSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let t = s.trim().trim_matches('/');
        if t.eq_ignore_ascii_case("inbox") {
            return Ok(RedditSource::Inbox);
        }
        if t.eq_ignore_ascii_case("me/comments") {
            return Ok(RedditSource::MyComments);
        }
        let Some(rest) = t.strip_prefix("r/") else {
            bail!("unknown reddit source {s:?} (expected r/<sub>, r/<sub>/comments, me/comments, inbox)");
        };
        let (sub, tail) = match rest.split_once('/') {
            Some((sub, tail)) => (sub, Some(tail)),
            None => (rest, None),
        };
        if sub.is_empty() || !sub.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("invalid subreddit name in {s:?}");
        }
        match tail {
            None => Ok(RedditSource::SubredditPosts(sub.to_string())),
            Some("comments") => Ok(RedditSource::SubredditComments(sub.to_string())),
            Some(other) => bail!("unknown subreddit listing {other:?} in {s:?}"),
        }
    }
}

impl RedditSource {
    fn listing_path(&self, username: &str) -> String {
        match self {
            RedditSource::SubredditPosts(sub) => format!("/r/{sub}/new"),
            RedditSource::SubredditComments(sub) => format!("/r/{sub}/comments"),
            RedditSource::MyComments => format!("/user/{username}/comments"),
            RedditSource::Inbox => "/message/unread".to_string(),
        }
    }
}

// --- listing wire types ---

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: ThingData,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ThingData {
    name: Option<String>,
    created_utc: Option<f64>,
    subreddit: Option<String>,
    author: Option<String>,
    permalink: Option<String>,
    context: Option<String>,
    title: Option<String>,
    selftext: Option<String>,
    link_flair_text: Option<String>,
    body: Option<String>,
    link_id: Option<String>,
    link_title: Option<String>,
    subject: Option<String>,
}

fn decoded(s: Option<String>) -> Option<String> {
    s.map(|v| html_escape::decode_html_entities(&v).to_string())
        .filter(|v| !v.trim().is_empty())
}

fn absolute_permalink(p: Option<String>) -> String {
    match p {
        Some(p) if p.starts_with("http") => p,
        Some(p) => format!("{PERMALINK_BASE}{p}"),
        None => String::new(),
    }
}

fn to_datetime(created_utc: f64) -> Option<DateTime<Utc>> {
    if !created_utc.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis((created_utc * 1000.0).round() as i64)
}

fn thing_to_item(thing: Thing, source: &str) -> Option<CandidateItem> {
    let d = thing.data;
    let id = d.name?;
    let created_at = d.created_utc.and_then(to_datetime)?;
    let payload = match thing.kind.as_str() {
        "t3" => ItemPayload::Post {
            subreddit: d.subreddit.unwrap_or_default(),
            title: decoded(d.title),
            body: decoded(d.selftext),
            author: d.author,
            flair: decoded(d.link_flair_text),
            permalink: absolute_permalink(d.permalink),
        },
        "t1" => ItemPayload::Comment {
            subreddit: d.subreddit.unwrap_or_default(),
            body: decoded(d.body),
            author: d.author,
            post_id: d.link_id,
            post_title: decoded(d.link_title),
            permalink: absolute_permalink(d.permalink.or(d.context)),
        },
        "t4" => ItemPayload::Message {
            subject: decoded(d.subject),
            body: decoded(d.body),
            author: d.author,
            permalink: absolute_permalink(
                d.context
                    .filter(|c| !c.is_empty())
                    .or_else(|| Some(format!("/message/messages/{}", id.trim_start_matches("t4_")))),
            ),
        },
        _ => return None,
    };
    Some(CandidateItem {
        id,
        source: source.to_string(),
        created_at,
        payload,
    })
}

/// Parse a Reddit listing body into candidates, keeping listing order.
/// Children of unknown kinds or without id/timestamp are skipped.
pub fn parse_listing(body: &str, source: &str) -> Result<Vec<CandidateItem>> {
    let listing: Listing = serde_json::from_str(body).context("parsing reddit listing json")?;
    let total = listing.data.children.len();
    let items: Vec<CandidateItem> = listing
        .data
        .children
        .into_iter()
        .filter_map(|t| thing_to_item(t, source))
        .collect();
    if items.len() < total {
        tracing::debug!(target: "reddit", %source, skipped = total - items.len(), "listing children skipped");
    }
    Ok(items)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

struct Inner {
    http: Client,
    creds: RedditCredentials,
    auth_base: String,
    api_base: String,
    token: Mutex<Option<AccessToken>>,
}

/// Reddit script-app client (password grant).
#[derive(Clone)]
pub struct RedditClient {
    inner: Arc<Inner>,
    limit: u32,
}

impl RedditClient {
    /// Authenticate against reddit.com. Fails if the credentials are rejected.
    pub async fn connect(creds: RedditCredentials) -> Result<Self> {
        Self::connect_with(creds, AUTH_BASE, API_BASE).await
    }

    /// Like [`connect`](Self::connect) with explicit base URLs.
    pub async fn connect_with(creds: RedditCredentials, auth_base: &str, api_base: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(creds.user_agent.clone())
            .timeout(Duration::from_secs(20))
            .build()
            .context("building reddit http client")?;
        let client = Self {
            inner: Arc::new(Inner {
                http,
                creds,
                auth_base: auth_base.trim_end_matches('/').to_string(),
                api_base: api_base.trim_end_matches('/').to_string(),
                token: Mutex::new(None),
            }),
            limit: 25,
        };
        client.bearer().await.context("reddit authentication")?;
        tracing::info!(target: "reddit", user = %client.inner.creds.username, "authenticated with reddit");
        Ok(client)
    }

    /// Same session, different listing page size.
    pub fn with_limit(&self, limit: u32) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            limit: limit.clamp(1, 100),
        }
    }

    async fn bearer(&self) -> Result<String> {
        let mut guard = self.inner.token.lock().await;
        if let Some(t) = guard.as_ref() {
            if Instant::now() < t.expires_at {
                return Ok(t.value.clone());
            }
        }
        let fresh = self.fetch_token().await?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.inner.token.lock().await = None;
    }

    async fn fetch_token(&self) -> Result<AccessToken> {
        let c = &self.inner.creds;
        let url = format!("{}/api/v1/access_token", self.inner.auth_base);
        let rsp = self
            .inner
            .http
            .post(&url)
            .basic_auth(&c.client_id, Some(&c.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", c.username.as_str()),
                ("password", c.password.as_str()),
            ])
            .send()
            .await
            .context("reddit token request")?
            .error_for_status()
            .context("reddit token non-2xx")?;
        let tr: TokenResponse = rsp.json().await.context("reddit token json")?;
        if let Some(err) = tr.error {
            bail!("reddit rejected credentials: {err}");
        }
        let value = tr
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("reddit token response without access_token"))?;
        // Refresh a minute early.
        let ttl = tr.expires_in.unwrap_or(3600).saturating_sub(60).max(1);
        Ok(AccessToken {
            value,
            expires_at: Instant::now() + Duration::from_secs(ttl),
        })
    }

    async fn api_post(&self, path: &str, form: &[(&str, &str)]) -> Result<String> {
        let token = self.bearer().await?;
        let rsp = self
            .inner
            .http
            .post(format!("{}{path}", self.inner.api_base))
            .bearer_auth(token)
            .form(form)
            .send()
            .await
            .with_context(|| format!("reddit POST {path}"))?;
        if rsp.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
        }
        let rsp = rsp
            .error_for_status()
            .with_context(|| format!("reddit POST {path} non-2xx"))?;
        rsp.text().await.context("reddit response body")
    }
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    json: CommentJson,
}

#[derive(Debug, Deserialize)]
struct CommentJson {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[async_trait]
impl SourceProvider for RedditClient {
    async fn fetch_latest(&self, source: &str) -> Result<Vec<CandidateItem>> {
        let target: RedditSource = source.parse()?;
        let path = target.listing_path(&self.inner.creds.username);
        let token = self.bearer().await?;
        let limit = self.limit.to_string();
        let rsp = self
            .inner
            .http
            .get(format!("{}{path}", self.inner.api_base))
            .bearer_auth(token)
            .query(&[("limit", limit.as_str())])
            .send()
            .await
            .with_context(|| format!("reddit GET {path}"))?;
        if rsp.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
        }
        let body = rsp
            .error_for_status()
            .with_context(|| format!("reddit GET {path} non-2xx"))?
            .text()
            .await
            .context("reddit listing body")?;
        parse_listing(&body, source)
    }

    async fn acknowledge(&self, item: &CandidateItem) -> Result<()> {
        if !matches!(item.source.parse::<RedditSource>(), Ok(RedditSource::Inbox)) {
            return Ok(());
        }
        self.api_post("/api/read_message", &[("id", item.id.as_str())])
            .await
            .map(|_| ())
    }

    async fn post_reply(&self, item: &CandidateItem, text: &str) -> Result<()> {
        let body = self
            .api_post(
                "/api/comment",
                &[("api_type", "json"), ("thing_id", item.id.as_str()), ("text", text)],
            )
            .await?;
        if let Ok(r) = serde_json::from_str::<CommentResponse>(&body) {
            if !r.json.errors.is_empty() {
                bail!("reddit rejected reply: {:?}", r.json.errors);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}
