//! Windowed, debounced correlation rule engine.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::{Alert, Event, Rule};

/// Per-`(rule_name, group_key)` ordered arrival-instant state, serialized
/// behind a single mutex since evaluation order within and across source
/// tasks determines debounce correctness.
pub struct RuleEngine {
    rules: Vec<Rule>,
    state: Mutex<HashMap<(String, String), VecDeque<DateTime<Utc>>>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_rules() -> Self {
        Self::new(vec![Rule::brute_force_detection()])
    }

    /// Evaluates `event` against every rule in registration order, reading
    /// wall-clock `now` once. Rules missing a group key for this event are
    /// skipped. A rule's threshold reaching `threshold` within `window`
    /// clears that rule's timestamps for this group (debounce) and emits
    /// one alert.
    pub fn evaluate(&self, event: &Event) -> Vec<Alert> {
        let now = Utc::now();
        let message_lower = event.message.to_lowercase();
        let mut alerts = Vec::new();
        let mut state = self.state.lock();

        for rule in &self.rules {
            if !rule.predicate.matches(&message_lower) {
                continue;
            }

            let Some(group_key) = group_key_for(rule, event) else {
                continue;
            };
            if group_key.is_empty() {
                continue;
            }

            let key = (rule.name.clone(), group_key);
            let timestamps = state.entry(key.clone()).or_insert_with(VecDeque::new);
            timestamps.push_back(now);

            let cutoff = now - rule.window;
            while timestamps.front().map(|t| *t < cutoff).unwrap_or(false) {
                timestamps.pop_front();
            }

            if timestamps.len() >= rule.threshold {
                let count = timestamps.len();
                alerts.push(Alert::from_rule_match(event, &rule.name, count, rule.window, &rule.group_by, &key.1));
                state.remove(&key);
            }
        }

        alerts
    }
}

fn group_key_for(rule: &Rule, event: &Event) -> Option<String> {
    match rule.group_by.as_str() {
        "ip" => event.ip.clone(),
        "source" => Some(event.source.clone()),
        other => {
            tracing::warn!(field = other, rule = %rule.name, "unrecognized rule group_by field, skipping rule for this event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Predicate, Severity};
    use chrono::Duration;

    fn make_event(ip: &str, message: &str) -> Event {
        let mut event = Event::new(Utc::now(), "auth".to_string(), message.to_string(), message.to_string(), Some(ip.to_string()));
        event.severity = Severity::High;
        event
    }

    fn test_rule() -> Rule {
        Rule {
            name: "test-rule".to_string(),
            predicate: Predicate::Contains(vec!["failed".to_string()]),
            threshold: 3,
            window: Duration::seconds(60),
            group_by: "ip".to_string(),
        }
    }

    /// Scenario 2: threshold 2, window 1s. One matching event, wait past
    /// the window, then another matching event. The first instant must
    /// have been pruned from the front, so the second event alone never
    /// reaches the threshold.
    #[test]
    fn events_older_than_window_are_pruned_and_never_trigger() {
        let rule = Rule {
            name: "short-window".to_string(),
            predicate: Predicate::Contains(vec!["failed".to_string()]),
            threshold: 2,
            window: Duration::seconds(1),
            group_by: "ip".to_string(),
        };
        let engine = RuleEngine::new(vec![rule]);

        let alerts = engine.evaluate(&make_event("6.6.6.6", "login failed"));
        assert!(alerts.is_empty());

        std::thread::sleep(std::time::Duration::from_millis(1100));

        let alerts = engine.evaluate(&make_event("6.6.6.6", "login failed"));
        assert!(alerts.is_empty());
    }

    #[test]
    fn triggers_after_threshold_events() {
        let engine = RuleEngine::new(vec![test_rule()]);
        let mut total_alerts = 0;
        for _ in 0..3 {
            total_alerts += engine.evaluate(&make_event("1.2.3.4", "login failed")).len();
        }
        assert_eq!(total_alerts, 1);
    }

    #[test]
    fn debounce_clears_after_trigger() {
        let engine = RuleEngine::new(vec![test_rule()]);
        for _ in 0..3 {
            engine.evaluate(&make_event("1.2.3.4", "login failed"));
        }
        for _ in 0..2 {
            let alerts = engine.evaluate(&make_event("1.2.3.4", "login failed"));
            assert!(alerts.is_empty());
        }
        let alerts = engine.evaluate(&make_event("1.2.3.4", "login failed"));
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn alert_count_equals_floor_n_over_threshold() {
        let engine = RuleEngine::new(vec![test_rule()]);
        let mut total_alerts = 0;
        for _ in 0..10 {
            total_alerts += engine.evaluate(&make_event("9.9.9.9", "login failed")).len();
        }
        assert_eq!(total_alerts, 10 / 3);
    }

    #[test]
    fn events_missing_group_key_are_skipped() {
        let engine = RuleEngine::new(vec![test_rule()]);
        let mut event = make_event("1.2.3.4", "login failed");
        event.ip = None;
        for _ in 0..5 {
            let alerts = engine.evaluate(&event);
            assert!(alerts.is_empty());
        }
    }

    #[test]
    fn different_group_keys_are_independent() {
        let engine = RuleEngine::new(vec![test_rule()]);
        engine.evaluate(&make_event("1.1.1.1", "login failed"));
        engine.evaluate(&make_event("1.1.1.1", "login failed"));
        let alerts = engine.evaluate(&make_event("2.2.2.2", "login failed"));
        assert!(alerts.is_empty());
    }

    #[test]
    fn brute_force_alert_message_names_count_and_group_key() {
        let engine = RuleEngine::with_default_rules();
        let mut alerts = Vec::new();
        for _ in 0..3 {
            alerts.extend(engine.evaluate(&make_event("192.168.1.5", "password failed for user admin")));
        }
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.rule_name.as_deref(), Some("Brute Force Detection"));
        assert!(alert.message.contains("3 events"));
        assert!(alert.message.contains("192.168.1.5"));
    }

    #[test]
    fn non_matching_messages_never_trigger() {
        let engine = RuleEngine::new(vec![test_rule()]);
        for _ in 0..10 {
            let alerts = engine.evaluate(&make_event("1.2.3.4", "login successful"));
            assert!(alerts.is_empty());
        }
    }
}
