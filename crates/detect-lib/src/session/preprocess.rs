//! Raw session payload normalization

use super::{async_trait, CanonicalSession, Preprocessor, SessionEvent};
use crate::error::{DetectError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const UNKNOWN_SESSION: &str = "unknown";

#[derive(Debug, Deserialize)]
struct RawSession {
    user_id: Option<String>,
    session_id: Option<String>,
    role: Option<String>,
    request_id: Option<String>,
    events: Option<Vec<RawEvent>>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    timestamp: RawTimestamp,
    action: String,
    resource: Option<String>,
    #[serde(default = "default_success")]
    success: bool,
}

fn default_success() -> bool {
    true
}

/// RFC 3339 text or Unix seconds
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(f64),
    Text(String),
}

impl RawTimestamp {
    fn parse(&self) -> std::result::Result<DateTime<Utc>, String> {
        match self {
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(text.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("invalid timestamp '{}': {}", text, e)),
            RawTimestamp::Seconds(secs) if secs.is_finite() => {
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9) as u32;
                DateTime::from_timestamp(whole as i64, nanos)
                    .ok_or_else(|| format!("timestamp {} out of range", secs))
            }
            RawTimestamp::Seconds(secs) => Err(format!("timestamp {} is not finite", secs)),
        }
    }
}

/// Default preprocessor for JSON session payloads
///
/// Expects an object with `user_id`, a non-empty `events` array and optional
/// `session_id`, `role` and `request_id`. Events are sorted by timestamp;
/// events sharing a timestamp keep their payload order.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionPreprocessor;

impl SessionPreprocessor {
    pub fn new() -> Self {
        Self
    }

    fn normalize(raw: &Value) -> std::result::Result<CanonicalSession, String> {
        if !raw.is_object() {
            return Err("session payload must be a JSON object".to_string());
        }
        let session: RawSession = serde_json::from_value(raw.clone())
            .map_err(|e| format!("invalid session payload: {}", e))?;

        let user_id = non_empty(session.user_id).ok_or("missing user_id")?;
        let raw_events = session.events.unwrap_or_default();
        if raw_events.is_empty() {
            return Err("session has no events".to_string());
        }

        let mut events = Vec::with_capacity(raw_events.len());
        for (index, event) in raw_events.into_iter().enumerate() {
            let timestamp = event
                .timestamp
                .parse()
                .map_err(|e| format!("event {}: {}", index, e))?;
            let action = event.action.trim().to_lowercase();
            if action.is_empty() {
                return Err(format!("event {}: empty action", index));
            }
            events.push(SessionEvent {
                timestamp,
                action,
                resource: non_empty(event.resource),
                success: event.success,
            });
        }
        events.sort_by_key(|e| e.timestamp);

        Ok(CanonicalSession {
            user_id,
            session_id: non_empty(session.session_id).unwrap_or_else(|| UNKNOWN_SESSION.to_string()),
            role: non_empty(session.role),
            request_id: non_empty(session.request_id),
            events,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl Preprocessor for SessionPreprocessor {
    async fn preprocess_session(&self, raw: &Value) -> Result<CanonicalSession> {
        let session = Self::normalize(raw).map_err(DetectError::Preprocessing)?;
        debug!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            events = session.events.len(),
            "Session preprocessed"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn preprocess(raw: Value) -> Result<CanonicalSession> {
        SessionPreprocessor::new().preprocess_session(&raw).await
    }

    #[tokio::test]
    async fn test_sorts_and_normalizes_events() {
        let session = preprocess(json!({
            "user_id": "u1",
            "role": "engineer",
            "events": [
                {"timestamp": "2024-03-04T10:05:00Z", "action": " USB ", "resource": "disk1"},
                {"timestamp": 1709546400, "action": "logon", "success": false},
                {"timestamp": "2024-03-04T10:05:00+00:00", "action": "email", "resource": ""}
            ]
        }))
        .await
        .unwrap();

        assert_eq!(session.session_id, "unknown");
        assert_eq!(session.role.as_deref(), Some("engineer"));
        let actions: Vec<&str> = session.events.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["logon", "usb", "email"]);
        assert!(!session.events[0].success);
        assert_eq!(session.events[1].resource.as_deref(), Some("disk1"));
        assert_eq!(session.events[2].resource, None);
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let raw = json!({
            "user_id": "u1",
            "session_id": "s9",
            "events": [
                {"timestamp": "2024-03-04T10:05:00Z", "action": "usb"},
                {"timestamp": "2024-03-04T10:05:00Z", "action": "email"},
                {"timestamp": 1709546400, "action": "logon"}
            ]
        });

        let first = tokio_test::block_on(preprocess(raw.clone())).unwrap();
        let second = tokio_test::block_on(preprocess(raw)).unwrap();
        assert_eq!(first, second);
        let actions: Vec<&str> = first.events.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["logon", "usb", "email"]);
    }

    #[tokio::test]
    async fn test_missing_user_id() {
        let err = preprocess(json!({"events": [{"timestamp": 0, "action": "logon"}]}))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::Preprocessing(ref m) if m.contains("user_id")));
    }

    #[tokio::test]
    async fn test_empty_events() {
        let err = preprocess(json!({"user_id": "u1", "events": []})).await.unwrap_err();
        assert!(matches!(err, DetectError::Preprocessing(_)));
    }

    #[tokio::test]
    async fn test_malformed_event() {
        let err = preprocess(json!({
            "user_id": "u1",
            "events": [{"timestamp": "yesterday", "action": "logon"}]
        }))
        .await
        .unwrap_err();
        assert!(err.to_string().contains("event 0"));

        assert!(preprocess(json!([1, 2, 3])).await.is_err());
    }

    #[tokio::test]
    async fn test_deterministic() {
        let raw = json!({
            "user_id": "u1",
            "session_id": "s9",
            "events": [
                {"timestamp": 20, "action": "b"},
                {"timestamp": 10, "action": "a"}
            ]
        });
        assert_eq!(preprocess(raw.clone()).await.unwrap(), preprocess(raw).await.unwrap());
    }
}
