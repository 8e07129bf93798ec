// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One unit fetched from a source. Ephemeral: evaluated, maybe relayed, dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub id: String,     // stable across fetches, e.g. "t3_abc123"
    pub source: String, // identifier it was fetched from, e.g. "r/solar", "inbox"
    pub created_at: DateTime<Utc>,
    pub payload: ItemPayload,
}

/// Origin-specific content. Serialized with a `type` discriminator so the
/// webhook receiver can branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemPayload {
    Post {
        subreddit: String,
        title: Option<String>,
        body: Option<String>,
        author: Option<String>,
        flair: Option<String>,
        permalink: String,
    },
    Comment {
        subreddit: String,
        body: Option<String>,
        author: Option<String>,
        post_id: Option<String>,
        post_title: Option<String>,
        permalink: String,
    },
    Message {
        subject: Option<String>,
        body: Option<String>,
        author: Option<String>,
        permalink: String,
    },
}

impl ItemPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemPayload::Post { .. } => "post",
            ItemPayload::Comment { .. } => "comment",
            ItemPayload::Message { .. } => "message",
        }
    }

    /// Text fields the relevance gate looks at. Absent fields are skipped.
    pub fn text_fields(&self) -> Vec<&str> {
        let fields: [Option<&String>; 3] = match self {
            ItemPayload::Post {
                title, body, flair, ..
            } => [title.as_ref(), body.as_ref(), flair.as_ref()],
            ItemPayload::Comment {
                body, post_title, ..
            } => [body.as_ref(), post_title.as_ref(), None],
            ItemPayload::Message { subject, body, .. } => [subject.as_ref(), body.as_ref(), None],
        };
        fields.into_iter().flatten().map(String::as_str).collect()
    }

    /// Short human label for logs.
    pub fn headline(&self) -> &str {
        let s = match self {
            ItemPayload::Post { title, .. } => title.as_deref(),
            ItemPayload::Comment { body, .. } => body.as_deref(),
            ItemPayload::Message { subject, body, .. } => subject.as_deref().or(body.as_deref()),
        };
        s.unwrap_or("(untitled)")
    }
}

/// Fetches candidates from one origin system and accepts feedback into it.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Items for `source`, in the order the origin returns them.
    async fn fetch_latest(&self, source: &str) -> Result<Vec<CandidateItem>>;

    /// Called once per accepted item (e.g. mark an inbox message read).
    async fn acknowledge(&self, _item: &CandidateItem) -> Result<()> {
        Ok(())
    }

    /// Post `text` as a reply to `item` in the origin system.
    async fn post_reply(&self, item: &CandidateItem, text: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_text_fields_include_flair() {
        let p = ItemPayload::Post {
            subreddit: "solar".into(),
            title: Some("hello".into()),
            body: None,
            author: None,
            flair: Some("Solar Quote".into()),
            permalink: "https://reddit.com/r/solar/x".into(),
        };
        assert_eq!(p.text_fields(), vec!["hello", "Solar Quote"]);
        assert_eq!(p.kind(), "post");
    }

    #[test]
    fn message_headline_falls_back_to_body() {
        let m = ItemPayload::Message {
            subject: None,
            body: Some("hi there".into()),
            author: Some("someone".into()),
            permalink: "https://reddit.com/message/x".into(),
        };
        assert_eq!(m.headline(), "hi there");
    }
}
