//! Heuristic enrichment (sentiment, severity, entities, summary) plus an
//! optional LLM provider path that overrides the heuristic judgment on
//! success and falls back to it silently on any failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::models::{EntityTag, Event, KeyEntity, Sentiment, SentimentLabel, Severity};
use crate::parser::is_ipv4;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

const POSITIVE_WORDS: &[&str] = &[
    "success", "successful", "connected", "accepted", "completed", "ok", "good", "healthy", "resolved", "allowed",
];
const NEGATIVE_WORDS: &[&str] = &[
    "error", "fail", "failed", "failure", "denied", "blocked", "attack", "exception", "unauthorized", "critical",
    "fatal", "panic", "crash", "timeout", "refused", "suspicious", "unusual",
];

/// Runs the heuristic path, then (if configured) a provider path that may
/// override its results. Never fails. Returns `true` when the provider
/// path was not applied and the heuristic result was kept (no provider
/// configured, or the provider call failed).
pub async fn enrich(event: &mut Event, provider: &dyn EnrichmentProvider) -> bool {
    apply_heuristics(event);

    match provider.analyze(event).await {
        Ok(result) => {
            event.sentiment = result.sentiment;
            event.severity = result.severity;
            event.key_entities = result.key_entities;
            event.summary = result.summary;
            false
        }
        Err(e) => {
            debug!(source = %event.source, error = %e, "enrichment provider unavailable, keeping heuristic result");
            true
        }
    }
}

fn apply_heuristics(event: &mut Event) {
    event.sentiment = heuristic_sentiment(&event.message);
    event.severity = heuristic_severity(&event.message);
    event.key_entities = heuristic_entities(&event.message);
    event.summary = heuristic_summary(&event.message);
}

fn heuristic_sentiment(message: &str) -> Sentiment {
    let lower = message.to_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    if tokens.is_empty() {
        return Sentiment {
            label: SentimentLabel::Neutral,
            score: 0.0,
        };
    }

    let mut hits = 0i64;
    for token in &tokens {
        let t = token.trim_matches(|c: char| !c.is_alphanumeric());
        if POSITIVE_WORDS.contains(&t) {
            hits += 1;
        } else if NEGATIVE_WORDS.contains(&t) {
            hits -= 1;
        }
    }
    let score = hits as f64 / tokens.len() as f64;

    let label = if score >= 0.05 {
        SentimentLabel::Positive
    } else if score <= -0.05 {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };

    Sentiment { label, score }
}

fn heuristic_severity(message: &str) -> Severity {
    let lower = message.to_lowercase();
    const CRITICAL: &[&str] = &["critical", "fatal", "panic", "crash", "segmentation fault"];
    const HIGH: &[&str] = &["error", "fail", "denied", "blocked", "attack", "exception", "unauthorized"];
    const MEDIUM: &[&str] = &["warning", "unusual", "suspicious", "timeout", "refused", "non-fatal"];
    const LOW: &[&str] = &["info", "debug", "normal", "success", "accepted", "connected"];

    if CRITICAL.iter().any(|k| lower.contains(k)) {
        Severity::Critical
    } else if HIGH.iter().any(|k| lower.contains(k)) {
        Severity::High
    } else if MEDIUM.iter().any(|k| lower.contains(k)) {
        Severity::Medium
    } else if LOW.iter().any(|k| lower.contains(k)) {
        Severity::Low
    } else {
        Severity::Low
    }
}

fn heuristic_entities(message: &str) -> Vec<KeyEntity> {
    let mut entities = Vec::new();
    for token in message.split_whitespace() {
        let cleaned = token.trim_matches(|c: char| c == ',' || c == ';' || c == ':' || c == '"');
        let lower = cleaned.to_lowercase();

        if is_ipv4(cleaned) {
            entities.push(KeyEntity {
                tag: EntityTag::Ip,
                value: cleaned.to_string(),
            });
        } else if cleaned.contains('/') || cleaned.contains('\\') {
            entities.push(KeyEntity {
                tag: EntityTag::File,
                value: cleaned.to_string(),
            });
        } else if lower.starts_with("user:") || lower.contains("username") {
            entities.push(KeyEntity {
                tag: EntityTag::User,
                value: cleaned.to_string(),
            });
        }
    }
    entities
}

fn heuristic_summary(message: &str) -> String {
    if message.len() <= 100 {
        message.to_string()
    } else {
        let mut truncated: String = message.chars().take(97).collect();
        truncated.push_str("...");
        truncated
    }
}

/// Output of a provider's judgment, overriding the heuristic path wholesale
/// on success.
pub struct ProviderResult {
    pub sentiment: Sentiment,
    pub severity: Severity,
    pub key_entities: Vec<KeyEntity>,
    pub summary: String,
}

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn analyze(&self, event: &Event) -> anyhow::Result<ProviderResult>;
}

/// The default provider: always falls through to the heuristic path
/// already applied by `enrich`.
pub struct NoneProvider;

#[async_trait]
impl EnrichmentProvider for NoneProvider {
    async fn analyze(&self, _event: &Event) -> anyhow::Result<ProviderResult> {
        anyhow::bail!("no provider configured")
    }
}

#[derive(Deserialize)]
struct LlmJudgment {
    severity: String,
    sentiment: String,
    #[serde(default)]
    sentiment_score: f64,
    #[serde(default)]
    entities: Vec<LlmEntity>,
    summary: String,
}

#[derive(Deserialize)]
struct LlmEntity {
    tag: String,
    value: String,
}

fn judgment_into_result(judgment: LlmJudgment) -> ProviderResult {
    let severity = match judgment.severity.to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "medium" => Severity::Medium,
        "low" => Severity::Low,
        _ => Severity::Unknown,
    };
    let label = match judgment.sentiment.to_lowercase().as_str() {
        "positive" => SentimentLabel::Positive,
        "negative" => SentimentLabel::Negative,
        _ => SentimentLabel::Neutral,
    };
    let key_entities = judgment
        .entities
        .into_iter()
        .map(|e| KeyEntity {
            tag: match e.tag.to_uppercase().as_str() {
                "IP" => EntityTag::Ip,
                "FILE" => EntityTag::File,
                _ => EntityTag::User,
            },
            value: e.value,
        })
        .collect();

    ProviderResult {
        sentiment: Sentiment {
            label,
            score: judgment.sentiment_score,
        },
        severity,
        key_entities,
        summary: judgment.summary,
    }
}

fn analysis_prompt(message: &str) -> String {
    format!(
        "Analyze this log message and respond with a JSON object with fields \
         severity (one of critical/high/medium/low), sentiment (positive/negative/neutral), \
         sentiment_score (float -1..1), entities (array of {{tag, value}} where tag is IP/FILE/USER), \
         and summary (<=100 chars). Message: {}",
        message
    )
}

/// Queries a local Ollama server's `/api/generate` endpoint.
pub struct OllamaProvider {
    client: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(host: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, host, model }
    }
}

#[async_trait]
impl EnrichmentProvider for OllamaProvider {
    async fn analyze(&self, event: &Event) -> anyhow::Result<ProviderResult> {
        let url = format!("{}/api/generate", self.host);
        let body = json!({
            "model": self.model,
            "prompt": analysis_prompt(&event.message),
            "stream": false,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let raw: serde_json::Value = response.json().await?;
        let text = raw
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("ollama response missing 'response' field"))?;
        let judgment: LlmJudgment = serde_json::from_str(text)?;
        Ok(judgment_into_result(judgment))
    }
}

/// Queries the Generative Language API's `generateContent` endpoint.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, api_key, model }
    }
}

#[async_trait]
impl EnrichmentProvider for GeminiProvider {
    async fn analyze(&self, event: &Event) -> anyhow::Result<ProviderResult> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": analysis_prompt(&event.message) }] }]
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let raw: serde_json::Value = response.json().await?;
        let text = raw
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("gemini response missing expected text field"))?;
        let judgment: LlmJudgment = serde_json::from_str(text)?;
        Ok(judgment_into_result(judgment))
    }
}

/// Builds the configured provider, logging a warning and falling back to
/// `NoneProvider` for any unrecognized value.
pub fn provider_from_env() -> Box<dyn EnrichmentProvider> {
    match std::env::var("LLM_PROVIDER").as_deref() {
        Ok("ollama") => {
            let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());
            let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3".to_string());
            Box::new(OllamaProvider::new(host, model))
        }
        Ok("gemini") => match std::env::var("LLM_API_KEY") {
            Ok(api_key) => {
                let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());
                Box::new(GeminiProvider::new(api_key, model))
            }
            Err(_) => {
                warn!("LLM_PROVIDER=gemini set but LLM_API_KEY missing, falling back to heuristic enrichment");
                Box::new(NoneProvider)
            }
        },
        _ => Box::new(NoneProvider),
    }
}
