//! SIEM core: a streaming log-enrichment and alerting pipeline.
//!
//! ```text
//! Collector (per source, file tail)
//!   -> Orchestrator batch (<=100 events)
//!     -> Enricher (heuristic, optional LLM override)
//!     -> AnomalyScorer (Isolation Forest)
//!     -> StorageAdapter (Elasticsearch-style bulk index)
//!     -> RuleEngine + anomaly gate -> AlertSink
//! ```
//!
//! The Admin API (`router`) exposes `/configure`, `/alerts`, `/logs`, and
//! `/health` over the same orchestrator.

pub mod auth;
pub mod collector;
pub mod config;
pub mod enricher;
pub mod error;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod router;
pub mod rules;
pub mod scorer;
pub mod storage;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Result, SiemError};
    pub use crate::models::{Alert, Event, KeyEntity, Rule, Sentiment, SentimentLabel, Severity};
    pub use crate::pipeline::{AlertSink, LifecycleState, PipelineOrchestrator};
}
