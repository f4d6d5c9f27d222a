//! Pipeline orchestrator: lifecycle, per-source batching, and the strict
//! enrich → score → store → alert batch-processing order.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::collector::Collector;
use crate::config::Config;
use crate::enricher::{self, EnrichmentProvider};
use crate::metrics::MetricsCollector;
use crate::models::{Alert, Event};
use crate::rules::RuleEngine;
use crate::scorer::AnomalyScorer;
use crate::storage::StorageAdapter;

const BATCH_CAPACITY: usize = 100;
const HISTORICAL_EVENT_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Initializing,
    Running,
    Stopping,
}

/// Pluggable alert delivery. `LogSink` (the default) is the only one the
/// core relies on; webhook/email are best-effort extensions.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert);
}

pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, alert: &Alert) {
        info!(
            severity = ?alert.severity,
            source = %alert.source,
            rule = ?alert.rule_name,
            anomaly_score = ?alert.anomaly_score,
            recommendation = %alert.recommendation,
            "alert: {}",
            alert.summary
        );
    }
}

pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, alert: &Alert) {
        if let Err(e) = self.client.post(&self.url).json(alert).send().await {
            warn!(error = %e, url = %self.url, "failed to deliver alert to webhook sink");
        }
    }
}

pub struct EmailSink {
    address: String,
}

impl EmailSink {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl AlertSink for EmailSink {
    async fn deliver(&self, alert: &Alert) {
        // no SMTP client is wired in this core; this stub records intent to
        // deliver so the extension point is exercised end to end.
        info!(to = %self.address, summary = %alert.summary, "would deliver alert by email");
    }
}

struct SourceTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Lifecycle: Idle → Initializing → Running → Stopping → Idle.
pub struct PipelineOrchestrator {
    config: Config,
    storage: Arc<StorageAdapter>,
    scorer: Arc<SyncMutex<AnomalyScorer>>,
    rules: Arc<RuleEngine>,
    metrics: Arc<MetricsCollector>,
    provider: Arc<dyn EnrichmentProvider>,
    sinks: Vec<Arc<dyn AlertSink>>,
    state: Arc<SyncMutex<LifecycleState>>,
    sources: Arc<Mutex<Vec<String>>>,
    tasks: Arc<Mutex<Vec<SourceTask>>>,
}

impl PipelineOrchestrator {
    pub fn new(config: Config, storage: Arc<StorageAdapter>, metrics: Arc<MetricsCollector>, provider: Arc<dyn EnrichmentProvider>) -> Self {
        let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink)];
        if let Some(webhook) = &config.alert_webhook {
            sinks.push(Arc::new(WebhookSink::new(webhook.clone())));
        }
        if let Some(email) = &config.alert_email {
            sinks.push(Arc::new(EmailSink::new(email.clone())));
        }

        Self {
            config,
            storage,
            scorer: Arc::new(SyncMutex::new(AnomalyScorer::new())),
            rules: Arc::new(RuleEngine::with_default_rules()),
            metrics,
            provider,
            sinks,
            state: Arc::new(SyncMutex::new(LifecycleState::Idle)),
            sources: Arc::new(Mutex::new(Vec::new())),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Installs the storage index, records the source list, and loads
    /// historical events to fit the scorer. Absence of historical data
    /// leaves the scorer unfit, not fatal.
    pub async fn initialize(&self, sources: Vec<String>) -> anyhow::Result<()> {
        *self.state.lock() = LifecycleState::Initializing;

        if let Err(e) = self.storage.ensure_index().await {
            warn!(error = %e, "failed to ensure storage index exists, continuing anyway");
        }

        let start = Utc::now() - chrono::Duration::days(self.config.training_days);
        let historical = self.storage.query_range(start, HISTORICAL_EVENT_LIMIT).await;
        if historical.is_empty() {
            info!("no historical events available, anomaly scorer will remain unfit until more data accumulates");
        } else {
            match self.scorer.lock().fit(&historical) {
                Ok(()) => info!(events = historical.len(), "anomaly scorer fit on historical events"),
                Err(e) => warn!(error = %e, "anomaly scorer failed to fit, continuing unfit"),
            }
        }

        *self.sources.lock().await = sources;
        *self.state.lock() = LifecycleState::Idle;
        Ok(())
    }

    /// Spawns one task per source. If already running, stops first.
    pub async fn start_monitoring(self: &Arc<Self>) -> anyhow::Result<()> {
        if self.state() == LifecycleState::Running {
            self.stop_monitoring().await;
        }

        let sources = self.sources.lock().await.clone();
        let mut tasks = Vec::with_capacity(sources.len());

        for source in sources {
            let (event_tx, event_rx) = mpsc::channel(BATCH_CAPACITY);
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

            let collector = Collector::new(source.clone(), source.clone());
            let collector_source = source.clone();

            tokio::spawn(async move {
                collector.run(event_tx, shutdown_rx).await;
                info!(source = %collector_source, "collector task exited");
            });

            let orchestrator_for_batching = Arc::clone(self);
            let batch_source = source.clone();
            let handle = tokio::spawn(async move {
                orchestrator_for_batching.run_batching_loop(batch_source, event_rx).await;
            });

            self.metrics.active_sources.inc();
            tasks.push(SourceTask { shutdown_tx, handle });
        }

        *self.tasks.lock().await = tasks;
        *self.state.lock() = LifecycleState::Running;
        Ok(())
    }

    /// Accumulates events into batches of `BATCH_CAPACITY` and processes a
    /// batch whenever it fills or the channel closes (cancellation drains
    /// the remainder before returning).
    async fn run_batching_loop(self: Arc<Self>, source: String, mut event_rx: mpsc::Receiver<Event>) {
        let mut batch = Vec::with_capacity(BATCH_CAPACITY);

        loop {
            match event_rx.recv().await {
                Some(event) => {
                    self.metrics.events_ingested.inc();
                    batch.push(event);
                    if batch.len() >= BATCH_CAPACITY {
                        self.process_batch(std::mem::take(&mut batch)).await;
                    }
                }
                None => {
                    if !batch.is_empty() {
                        self.process_batch(std::mem::take(&mut batch)).await;
                    }
                    info!(source = %source, "batching loop exiting, channel closed");
                    return;
                }
            }
        }
    }

    /// Strict order: enrich every event, score the batch, persist it, then
    /// emit anomaly and rule alerts in collection order.
    async fn process_batch(&self, mut batch: Vec<Event>) {
        for event in &mut batch {
            if enricher::enrich(event, self.provider.as_ref()).await {
                self.metrics.provider_fallbacks.inc();
            }
            self.metrics.events_enriched.inc();
        }

        let scores = {
            let scorer = self.scorer.lock();
            if scorer.is_fit() {
                scorer.score(&batch)
            } else {
                vec![0.0; batch.len()]
            }
        };
        for (event, score) in batch.iter_mut().zip(scores.iter()) {
            event.anomaly_score = *score;
            event.recommendation = Some(recommendation_for(event));
            self.metrics.events_scored.inc();
        }

        if let Err(e) = self.storage.bulk_index(&batch).await {
            error!(error = %e, "failed to persist batch, alerts from this batch still proceed");
            self.metrics.storage_failures.inc();
        } else {
            self.metrics.events_stored.inc_by(batch.len() as f64);
        }

        for event in &batch {
            let mut alerts = Vec::new();
            if event.anomaly_score < self.config.anomaly_threshold {
                alerts.push(Alert::from_event_anomaly(event));
            }
            alerts.extend(self.rules.evaluate(event));

            for alert in alerts {
                self.metrics.alerts_emitted.inc();
                for sink in &self.sinks {
                    sink.deliver(&alert).await;
                }
            }
        }
    }

    /// Cancels each source task and awaits completion, draining any
    /// partial in-flight batch first.
    pub async fn stop_monitoring(&self) {
        *self.state.lock() = LifecycleState::Stopping;

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            let _ = task.shutdown_tx.send(()).await;
            if let Err(e) = task.handle.await {
                warn!(error = %e, "source task panicked during shutdown");
            }
            self.metrics.active_sources.dec();
        }

        *self.state.lock() = LifecycleState::Idle;
    }

    pub async fn is_storage_reachable(&self) -> bool {
        self.storage.ping().await
    }
}

fn recommendation_for(event: &Event) -> String {
    let lower = event.message.to_lowercase();
    if ["denied", "blocked", "unauthorized"].iter().any(|k| lower.contains(k)) {
        "Investigate potential unauthorized access attempt. Check source IP and user.".to_string()
    } else if ["error", "fail", "exception"].iter().any(|k| lower.contains(k)) {
        "Check system health and application logs for root cause of this error.".to_string()
    } else if matches!(event.severity, crate::models::Severity::Critical) {
        "Immediate investigation required - potential system crash or security incident.".to_string()
    } else {
        "Monitor for similar patterns and investigate if recurring.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enricher::NoneProvider;

    fn test_config() -> Config {
        Config {
            es_host: "localhost".to_string(),
            es_port: 9200,
            es_user: None,
            es_password: None,
            es_index_name: "test-events".to_string(),
            log_sources: vec![],
            anomaly_threshold: -0.5,
            training_days: 7,
            alert_webhook: None,
            alert_email: None,
            api_key: "test-key".to_string(),
            llm_provider: "local".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
        }
    }

    #[test]
    fn recommendation_precedence_unauthorized_wins_over_error() {
        let mut event = Event::new(Utc::now(), "auth".to_string(), "raw".to_string(), "access denied due to error".to_string(), None);
        event.severity = crate::models::Severity::High;
        let recommendation = recommendation_for(&event);
        assert!(recommendation.contains("unauthorized access"));
    }

    #[test]
    fn recommendation_falls_back_to_monitor() {
        let mut event = Event::new(Utc::now(), "app".to_string(), "raw".to_string(), "routine heartbeat".to_string(), None);
        event.severity = crate::models::Severity::Low;
        let recommendation = recommendation_for(&event);
        assert!(recommendation.contains("Monitor"));
    }

    #[tokio::test]
    async fn lifecycle_starts_idle() {
        let config = test_config();
        let storage = Arc::new(StorageAdapter::new(&config));
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let provider: Arc<dyn EnrichmentProvider> = Arc::new(NoneProvider);
        let orchestrator = PipelineOrchestrator::new(config, storage, metrics, provider);
        assert_eq!(orchestrator.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn stop_monitoring_on_idle_orchestrator_is_a_no_op() {
        let config = test_config();
        let storage = Arc::new(StorageAdapter::new(&config));
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let provider: Arc<dyn EnrichmentProvider> = Arc::new(NoneProvider);
        let orchestrator = Arc::new(PipelineOrchestrator::new(config, storage, metrics, provider));
        orchestrator.stop_monitoring().await;
        assert_eq!(orchestrator.state(), LifecycleState::Idle);
    }
}
