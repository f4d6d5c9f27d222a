//! Elasticsearch-style HTTP document store client. Every operation may
//! fail; failures are logged by the caller and never abort the pipeline.

use serde_json::{json, Value};
use tracing::{error, warn};

use crate::config::Config;
use crate::models::{Event, Sentiment, SentimentLabel, Severity};

pub struct StorageAdapter {
    client: reqwest::Client,
    base_url: String,
    index_name: String,
    auth: (Option<String>, Option<String>),
}

impl StorageAdapter {
    pub fn new(config: &Config) -> Self {
        let base_url = format!("http://{}:{}", config.es_host, config.es_port);
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url,
            index_name: config.es_index_name.clone(),
            auth: (config.es_user.clone(), config.es_password.clone()),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let mut req = self.client.request(method, url);
        if let (Some(user), Some(password)) = &self.auth {
            req = req.basic_auth(user, Some(password));
        }
        req
    }

    /// Idempotent mapping install.
    pub async fn ensure_index(&self) -> anyhow::Result<()> {
        let mapping = json!({
            "mappings": {
                "properties": {
                    "timestamp": { "type": "date" },
                    "source": { "type": "keyword" },
                    "message": { "type": "text" },
                    "ip": { "type": "ip" },
                    "severity": { "type": "keyword" },
                    "anomaly_score": { "type": "float" },
                    "raw_log": { "type": "text", "index": false },
                    "ai_analysis": { "type": "object", "enabled": false }
                }
            }
        });

        let response = self
            .request(reqwest::Method::PUT, &self.index_name)
            .json(&mapping)
            .send()
            .await?;

        if !response.status().is_success() && response.status().as_u16() != 400 {
            anyhow::bail!("failed to create index: {}", response.status());
        }
        Ok(())
    }

    /// Bulk-indexes `events` via the `_bulk` NDJSON endpoint.
    pub async fn bulk_index(&self, events: &[Event]) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for event in events {
            let action = json!({ "index": { "_index": self.index_name } });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&event_to_document(event).to_string());
            body.push('\n');
        }

        let response = self
            .request(reqwest::Method::POST, "_bulk")
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("bulk index request failed: {}", response.status());
        }
        Ok(())
    }

    /// Multi-field text search, sorted descending by timestamp. Returns an
    /// empty `Vec` on any error rather than propagating a storage failure.
    pub async fn search(&self, query: &str, size: usize) -> Vec<Event> {
        let body = json!({
            "size": size,
            "sort": [{ "timestamp": "desc" }],
            "query": {
                "multi_match": {
                    "query": query,
                    "fields": ["message", "raw_log", "source", "ip"]
                }
            }
        });

        let result = async {
            let response = self
                .request(reqwest::Method::POST, &format!("{}/_search", self.index_name))
                .json(&body)
                .send()
                .await?;
            let value: Value = response.json().await?;
            anyhow::Ok(value)
        }
        .await;

        match result {
            Ok(value) => documents_to_events(&value),
            Err(e) => {
                warn!(error = %e, "search query failed, returning empty result set");
                Vec::new()
            }
        }
    }

    /// Loads up to `limit` events timestamped at or after `start`, sorted
    /// descending. Used both to seed the anomaly scorer at orchestrator
    /// `initialize` time and to back `/alerts`' time-range filter: a range
    /// query rather than a text search, so it matches every document in
    /// range instead of requiring (and failing on) search terms.
    pub async fn query_range(&self, start: chrono::DateTime<chrono::Utc>, limit: usize) -> Vec<Event> {
        let body = json!({
            "size": limit,
            "sort": [{ "timestamp": "desc" }],
            "query": {
                "range": { "timestamp": { "gte": start.to_rfc3339() } }
            }
        });

        let result = async {
            let response = self
                .request(reqwest::Method::POST, &format!("{}/_search", self.index_name))
                .json(&body)
                .send()
                .await?;
            let value: Value = response.json().await?;
            anyhow::Ok(value)
        }
        .await;

        match result {
            Ok(value) => documents_to_events(&value),
            Err(e) => {
                error!(error = %e, "historical range query failed, scorer will remain unfit");
                Vec::new()
            }
        }
    }

    /// Cluster reachability check, used by `/health`.
    pub async fn ping(&self) -> bool {
        self.request(reqwest::Method::GET, "")
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

fn event_to_document(event: &Event) -> Value {
    json!({
        "timestamp": event.timestamp.to_rfc3339(),
        "source": event.source,
        "message": event.message,
        "ip": event.ip,
        "severity": severity_str(event.severity),
        "anomaly_score": event.anomaly_score,
        "raw_log": event.raw_log,
        "ai_analysis": {
            "sentiment": sentiment_label_str(event.sentiment.label),
            "sentiment_score": event.sentiment.score,
            "summary": event.summary,
            "recommendation": event.recommendation,
        }
    })
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
        Severity::Unknown => "unknown",
    }
}

fn sentiment_label_str(label: SentimentLabel) -> &'static str {
    match label {
        SentimentLabel::Positive => "positive",
        SentimentLabel::Negative => "negative",
        SentimentLabel::Neutral => "neutral",
    }
}

fn documents_to_events(response: &Value) -> Vec<Event> {
    let hits = response
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(|h| h.as_array());

    let Some(hits) = hits else {
        return Vec::new();
    };

    hits.iter().filter_map(|hit| hit.get("_source")).filter_map(document_to_event).collect()
}

fn document_to_event(doc: &Value) -> Option<Event> {
    let timestamp = doc
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))?;
    let source = doc.get("source").and_then(|v| v.as_str())?.to_string();
    let message = doc.get("message").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let raw_log = doc.get("raw_log").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let ip = doc.get("ip").and_then(|v| v.as_str()).map(|s| s.to_string());

    let mut event = Event::new(timestamp, source, raw_log, message, ip);
    event.anomaly_score = doc.get("anomaly_score").and_then(|v| v.as_f64()).unwrap_or(0.0);
    if let Some(sev) = doc.get("severity").and_then(|v| v.as_str()) {
        event.severity = match sev {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Unknown,
        };
    }
    if let Some(analysis) = doc.get("ai_analysis") {
        if let Some(label) = analysis.get("sentiment").and_then(|v| v.as_str()) {
            event.sentiment = Sentiment {
                label: match label {
                    "positive" => SentimentLabel::Positive,
                    "negative" => SentimentLabel::Negative,
                    _ => SentimentLabel::Neutral,
                },
                score: analysis.get("sentiment_score").and_then(|v| v.as_f64()).unwrap_or(0.0),
            };
        }
        if let Some(summary) = analysis.get("summary").and_then(|v| v.as_str()) {
            event.summary = summary.to_string();
        }
        if let Some(rec) = analysis.get("recommendation").and_then(|v| v.as_str()) {
            event.recommendation = Some(rec.to_string());
        }
    }
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_to_document_round_trips_core_fields() {
        let event = Event::new(chrono::Utc::now(), "auth".to_string(), "raw".to_string(), "login failed".to_string(), Some("1.2.3.4".to_string()));
        let doc = event_to_document(&event);
        assert_eq!(doc["source"], "auth");
        assert_eq!(doc["ip"], "1.2.3.4");
    }

    #[test]
    fn documents_to_events_handles_missing_hits() {
        let response = json!({});
        assert!(documents_to_events(&response).is_empty());
    }
}
