// src/ingest/mod.rs
pub mod reddit;
pub mod types;

pub use reddit::{RedditClient, RedditSource};
pub use types::{CandidateItem, ItemPayload, SourceProvider};
