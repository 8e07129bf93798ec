// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod admission;
pub mod app;
pub mod clock;
pub mod config;
pub mod controller;
pub mod ingest;
pub mod metrics;
pub mod relevance;
pub mod scheduler;

// Outbound delivery & inbound webhooks
pub mod notify;
pub mod receiver;
pub mod relay;

// ---- Re-exports for stable public API ----
pub use crate::admission::{admit, SeenSet};
pub use crate::controller::{CycleReport, GroupController, GroupSettings, OverlapPolicy, WindowState};
pub use crate::ingest::{CandidateItem, ItemPayload, SourceProvider};
pub use crate::relay::{Relay, ReplyInstruction, RetryPolicy};
pub use crate::relevance::is_relevant;
