//! Core data model: `Event`, `Alert`, `Rule`, and their constituent types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity ordered from least to most urgent; `Unknown` is the parser's
/// fallback when no keyword precedence applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl Default for SentimentLabel {
    fn default() -> Self {
        SentimentLabel::Neutral
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
}

/// A tagged entity pulled from a log message. Order reflects token order;
/// duplicates are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEntity {
    pub tag: EntityTag,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityTag {
    Ip,
    File,
    User,
}

/// A single parsed, enriched, scored log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub raw_log: String,
    pub message: String,
    pub ip: Option<String>,
    pub severity: Severity,
    pub sentiment: Sentiment,
    pub key_entities: Vec<KeyEntity>,
    pub summary: String,
    /// Signed; more negative means more anomalous. `0.0` is the unscored
    /// sentinel and is never itself treated as an anomaly.
    pub anomaly_score: f64,
    pub recommendation: Option<String>,
}

impl Event {
    /// A bare event carrying only what the parser knows; enrichment,
    /// scoring, and recommendation fields are filled in by later stages.
    pub fn new(timestamp: DateTime<Utc>, source: String, raw_log: String, message: String, ip: Option<String>) -> Self {
        Self {
            timestamp,
            source,
            raw_log,
            message,
            ip,
            severity: Severity::Unknown,
            sentiment: Sentiment::default(),
            key_entities: Vec::new(),
            summary: String::new(),
            anomaly_score: 0.0,
            recommendation: None,
        }
    }
}

/// An alert emitted by the anomaly gate or a correlation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub source: String,
    pub message: String,
    pub anomaly_score: Option<f64>,
    pub rule_name: Option<String>,
    pub recommendation: String,
    pub summary: String,
    /// Back-reference to the originating event, since events carry no id.
    pub event_timestamp: DateTime<Utc>,
    pub event_source: String,
    pub event_raw_log: String,
}

impl Alert {
    pub fn from_event_anomaly(event: &Event) -> Self {
        Self {
            timestamp: Utc::now(),
            severity: event.severity,
            source: event.source.clone(),
            message: event.message.clone(),
            anomaly_score: Some(event.anomaly_score),
            rule_name: None,
            recommendation: event
                .recommendation
                .clone()
                .unwrap_or_else(|| "Monitor for similar patterns and investigate if recurring.".to_string()),
            summary: event.summary.clone(),
            event_timestamp: event.timestamp,
            event_source: event.source.clone(),
            event_raw_log: event.raw_log.clone(),
        }
    }

    /// `count` events of `rule_name` landed within `window` seconds for
    /// `group_by group_key`; the alert message spells this out verbatim
    /// per the rule engine's trigger-message contract.
    pub fn from_rule_match(event: &Event, rule_name: &str, count: usize, window: chrono::Duration, group_by: &str, group_key: &str) -> Self {
        let message = format!(
            "Rule '{}' triggered: {} events in {}s for {} {}",
            rule_name,
            count,
            window.num_seconds(),
            group_by,
            group_key
        );
        Self {
            timestamp: Utc::now(),
            severity: Severity::High,
            source: event.source.clone(),
            message,
            anomaly_score: None,
            rule_name: Some(rule_name.to_string()),
            recommendation: event
                .recommendation
                .clone()
                .unwrap_or_else(|| "Monitor for similar patterns and investigate if recurring.".to_string()),
            summary: event.summary.clone(),
            event_timestamp: event.timestamp,
            event_source: event.source.clone(),
            event_raw_log: event.raw_log.clone(),
        }
    }
}

/// A predicate against which incoming events are matched before they count
/// toward a rule's windowed threshold. Data, not closures, so rules stay
/// serializable and testable in isolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches if the lowercased message contains any of the given
    /// lowercased substrings.
    Contains(Vec<String>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// A named, hand-coded predicate not expressible as substring matching
    /// (kept as a tag rather than a function pointer, so the type stays
    /// serializable).
    Custom(String),
}

impl Predicate {
    pub fn matches(&self, message_lower: &str) -> bool {
        match self {
            Predicate::Contains(needles) => needles.iter().any(|n| message_lower.contains(n.as_str())),
            Predicate::And(preds) => preds.iter().all(|p| p.matches(message_lower)),
            Predicate::Or(preds) => preds.iter().any(|p| p.matches(message_lower)),
            Predicate::Custom(_tag) => false,
        }
    }
}

/// A correlation rule. Immutable after process startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub predicate: Predicate,
    pub threshold: usize,
    pub window: chrono::Duration,
    pub group_by: String,
}

impl Rule {
    pub fn brute_force_detection() -> Self {
        Self {
            name: "Brute Force Detection".to_string(),
            predicate: Predicate::Contains(vec!["failed".to_string(), "auth failure".to_string()]),
            threshold: 3,
            window: chrono::Duration::seconds(60),
            group_by: "ip".to_string(),
        }
    }
}
