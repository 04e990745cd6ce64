//! Session feature derivation
//!
//! Produces the eight base tabular features plus per-action counts and the
//! ordered action list. Time-of-day features use UTC.

use super::{async_trait, CanonicalSession, FeatureBundle, FeatureEngineer, FEATURE_SCHEMA_VERSION};
use crate::error::{DetectError, Result};
use chrono::{Datelike, Timelike, Weekday};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// First hour of the working day (UTC)
const WORK_START_HOUR: u32 = 8;

/// Hour at which the working day ends (UTC, exclusive)
const WORK_END_HOUR: u32 = 18;

/// Default feature engineer
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionFeatureEngineer;

impl SessionFeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    fn derive(session: &CanonicalSession) -> std::result::Result<FeatureBundle, String> {
        let events = &session.events;
        let (first, last) = match (events.first(), events.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err("session has no events".to_string()),
        };

        let count = events.len() as f64;
        let duration_secs = (last.timestamp - first.timestamp).num_milliseconds().max(0) as f64 / 1000.0;
        let minutes = (duration_secs / 60.0).max(1.0);

        let mut action_counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut resources = BTreeSet::new();
        let mut after_hours = 0usize;
        let mut weekend = 0usize;
        let mut failures = 0usize;

        for event in events {
            *action_counts.entry(event.action.clone()).or_insert(0) += 1;
            if let Some(resource) = &event.resource {
                resources.insert(resource.as_str());
            }
            let hour = event.timestamp.hour();
            if !(WORK_START_HOUR..WORK_END_HOUR).contains(&hour) {
                after_hours += 1;
            }
            if matches!(event.timestamp.weekday(), Weekday::Sat | Weekday::Sun) {
                weekend += 1;
            }
            if !event.success {
                failures += 1;
            }
        }

        let mut tabular = BTreeMap::new();
        tabular.insert("event_count".to_string(), count);
        tabular.insert("unique_actions".to_string(), action_counts.len() as f64);
        tabular.insert("unique_resources".to_string(), resources.len() as f64);
        tabular.insert("session_duration_secs".to_string(), duration_secs);
        tabular.insert("events_per_minute".to_string(), count / minutes);
        tabular.insert("after_hours_ratio".to_string(), after_hours as f64 / count);
        tabular.insert("weekend_ratio".to_string(), weekend as f64 / count);
        tabular.insert("failure_ratio".to_string(), failures as f64 / count);

        Ok(FeatureBundle {
            schema_version: FEATURE_SCHEMA_VERSION.to_string(),
            user_id: session.user_id.clone(),
            session_id: session.session_id.clone(),
            role: session.role.clone(),
            request_id: session.request_id.clone(),
            tabular,
            action_counts,
            actions: events.iter().map(|e| e.action.clone()).collect(),
        })
    }
}

#[async_trait]
impl FeatureEngineer for SessionFeatureEngineer {
    async fn extract_features(&self, session: &CanonicalSession) -> Result<FeatureBundle> {
        let bundle = Self::derive(session).map_err(DetectError::FeatureExtraction)?;
        debug!(
            user_id = %bundle.user_id,
            features = bundle.tabular.len(),
            actions = bundle.actions.len(),
            "Features extracted"
        );
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionEvent;
    use chrono::{DateTime, Utc};

    fn event(ts: &str, action: &str, resource: Option<&str>, success: bool) -> SessionEvent {
        SessionEvent {
            timestamp: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
            action: action.to_string(),
            resource: resource.map(String::from),
            success,
        }
    }

    fn session(events: Vec<SessionEvent>) -> CanonicalSession {
        CanonicalSession {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            role: Some("engineer".to_string()),
            request_id: None,
            events,
        }
    }

    #[tokio::test]
    async fn test_base_features() {
        // 2024-03-09 is a Saturday
        let s = session(vec![
            event("2024-03-08T07:00:00Z", "logon", None, true),
            event("2024-03-08T09:00:00Z", "usb", Some("disk1"), false),
            event("2024-03-08T10:00:00Z", "usb", Some("disk1"), true),
            event("2024-03-09T07:00:00Z", "email", Some("mail"), true),
        ]);
        let bundle = SessionFeatureEngineer::new().extract_features(&s).await.unwrap();

        assert_eq!(bundle.schema_version, FEATURE_SCHEMA_VERSION);
        assert_eq!(bundle.tabular["event_count"], 4.0);
        assert_eq!(bundle.tabular["unique_actions"], 3.0);
        assert_eq!(bundle.tabular["unique_resources"], 2.0);
        assert_eq!(bundle.tabular["session_duration_secs"], 86400.0);
        assert_eq!(bundle.tabular["events_per_minute"], 4.0 / 1440.0);
        assert_eq!(bundle.tabular["after_hours_ratio"], 0.5);
        assert_eq!(bundle.tabular["weekend_ratio"], 0.25);
        assert_eq!(bundle.tabular["failure_ratio"], 0.25);
        assert_eq!(bundle.action_counts["usb"], 2);
        assert_eq!(bundle.actions, vec!["logon", "usb", "usb", "email"]);
    }

    #[test]
    fn test_short_session_rate() {
        let s = session(vec![
            event("2024-03-08T09:00:00Z", "logon", None, true),
            event("2024-03-08T09:00:30Z", "logoff", None, true),
        ]);
        let bundle =
            tokio_test::block_on(SessionFeatureEngineer::new().extract_features(&s)).unwrap();
        assert_eq!(bundle.tabular["events_per_minute"], 2.0);
    }

    #[tokio::test]
    async fn test_empty_session_fails() {
        let err = SessionFeatureEngineer::new()
            .extract_features(&session(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::FeatureExtraction(_)));
    }
}
