//! Pure line-to-`Event` translation. Never fails: malformed input still
//! produces an `Event`, with the parse oddity logged rather than dropped.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::models::Event;

static IPV4_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").expect("static IPv4 pattern is valid"));

/// Parses one raw log line from `source` into an `Event`. `timestamp`
/// defaults to now when the line carries none; `raw_log` is always the
/// untouched input.
pub fn parse_log_line(line: &str, source: &str) -> Event {
    let trimmed = line.trim();

    if trimmed.starts_with('{') {
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) => return parse_json_line(&value, line, source),
            Err(e) => {
                warn!(source, error = %e, "log line looked like JSON but failed to parse, falling back to text parse");
            }
        }
    }

    parse_text_line(trimmed, line, source)
}

fn parse_json_line(value: &serde_json::Value, raw_log: &str, source: &str) -> Event {
    let message = value
        .get("message")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| raw_log.to_string());

    let ip = value
        .get("ip")
        .and_then(|v| v.as_str())
        .filter(|s| is_ipv4(s))
        .map(|s| s.to_string());

    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Event::new(timestamp, source.to_string(), raw_log.to_string(), message, ip)
}

fn parse_text_line(trimmed: &str, raw_log: &str, source: &str) -> Event {
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");

    let (ip, message) = if is_ipv4(first) {
        let rest = parts.next().unwrap_or("").trim_start();
        (Some(first.to_string()), rest.to_string())
    } else {
        (None, trimmed.to_string())
    };

    Event::new(Utc::now(), source.to_string(), raw_log.to_string(), message, ip)
}

/// True if `candidate` is a dotted IPv4 quad with every octet in `0..=255`.
pub fn is_ipv4(candidate: &str) -> bool {
    let Some(captures) = IPV4_RE.captures(candidate) else {
        return false;
    };
    (1..=4).all(|i| captures[i].parse::<u16>().map(|o| o <= 255).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_text_without_ip() {
        let event = parse_log_line("something went wrong", "app");
        assert_eq!(event.source, "app");
        assert_eq!(event.raw_log, "something went wrong");
        assert_eq!(event.message, "something went wrong");
        assert!(event.ip.is_none());
    }

    #[test]
    fn parses_leading_ip() {
        let event = parse_log_line("192.168.1.10 login failed for user admin", "auth");
        assert_eq!(event.ip.as_deref(), Some("192.168.1.10"));
        assert_eq!(event.message, "login failed for user admin");
    }

    #[test]
    fn rejects_malformed_quad_as_ip() {
        let event = parse_log_line("999.1.2.3 something happened", "app");
        assert!(event.ip.is_none());
        assert_eq!(event.message, "999.1.2.3 something happened");
    }

    #[test]
    fn parses_json_line() {
        let line = r#"{"message": "disk full", "ip": "10.0.0.5"}"#;
        let event = parse_log_line(line, "json-src");
        assert_eq!(event.message, "disk full");
        assert_eq!(event.ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(event.raw_log, line);
    }

    #[test]
    fn malformed_json_falls_back_to_text() {
        let line = "{not actually json";
        let event = parse_log_line(line, "app");
        assert_eq!(event.raw_log, line);
        assert_eq!(event.message, line);
    }

    #[test]
    fn always_has_nonempty_source_and_raw_log() {
        let event = parse_log_line("", "src");
        assert_eq!(event.source, "src");
        assert_eq!(event.raw_log, "");
    }
}
