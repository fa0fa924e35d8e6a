//! Append-only transaction metadata.
//!
//! Metadata is a JSON object. Merging keeps every existing key and overlays
//! the new ones, so earlier context survives every settlement attempt.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::TxnStatus;
use super::webhook::WebhookPayload;

/// Key that holds a stored value that was not a JSON object.
const PREVIOUS_KEY: &str = "previous";

/// Transaction metadata record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a stored value.
    ///
    /// Objects are used as-is, `null` becomes empty, anything else is kept
    /// under `"previous"`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::default(),
            other => {
                let mut map = Map::new();
                map.insert(PREVIOUS_KEY.to_string(), other);
                Self(map)
            }
        }
    }

    /// Sets one key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Keeps all keys of `self`, then overlays `overlay`.
    #[must_use]
    pub fn merge(mut self, overlay: Self) -> Self {
        for (key, value) in overlay.0 {
            self.0.insert(key, value);
        }
        self
    }

    /// Returns a stored key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Converts into the JSON value stored in the database.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Overlay recorded by a settlement claim.
    ///
    /// Keys are prefixed by the resulting status (`successWebhook`,
    /// `failureAt`, ...) so a `BANK_TIMEOUT` failure keeps its record when a
    /// later success overrides it.
    #[must_use]
    pub fn settlement(
        payload: &WebhookPayload,
        to: TxnStatus,
        webhook_event_id: Option<&str>,
        at: DateTime<Utc>,
        timeout_override: bool,
    ) -> Self {
        let prefix = match to {
            TxnStatus::Processing => "processing",
            TxnStatus::Success => "success",
            TxnStatus::Failure => "failure",
        };

        let mut overlay = Self::new()
            .with(
                format!("{prefix}Webhook"),
                serde_json::to_value(payload).unwrap_or(Value::Null),
            )
            .with(format!("{prefix}At"), at.to_rfc3339_opts(SecondsFormat::Millis, true));

        if let Some(event_id) = webhook_event_id {
            overlay = overlay.with(format!("{prefix}WebhookEventId"), event_id);
        }
        if timeout_override {
            overlay = overlay.with("bankTimeoutOverride", true);
        }
        overlay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::types::{RampKind, WebhookStatus};
    use rampart_shared::types::UserId;
    use serde_json::json;

    fn payload(status: WebhookStatus) -> WebhookPayload {
        WebhookPayload {
            kind: RampKind::Onramp,
            token: "tok".to_string(),
            user_identifier: UserId::new(),
            amount: 10,
            status,
            failure_reason_code: None,
            failure_reason_message: None,
            linked_bank_account_id: None,
        }
    }

    #[test]
    fn test_merge_keeps_existing_keys() {
        let stored = Metadata::from_value(json!({"initiatedBy": "app", "note": "old"}));
        let merged = stored.merge(Metadata::new().with("note", "new").with("extra", 1));

        assert_eq!(
            merged.into_value(),
            json!({"initiatedBy": "app", "note": "new", "extra": 1})
        );
    }

    #[test]
    fn test_from_non_object() {
        assert_eq!(Metadata::from_value(Value::Null), Metadata::new());
        assert_eq!(
            Metadata::from_value(json!("legacy")).into_value(),
            json!({"previous": "legacy"})
        );
    }

    #[test]
    fn test_override_preserves_failure_record() {
        let at = Utc::now();
        let failed = Metadata::new().merge(Metadata::settlement(
            &payload(WebhookStatus::Failure),
            TxnStatus::Failure,
            Some("evt_1"),
            at,
            false,
        ));
        let settled = failed.merge(Metadata::settlement(
            &payload(WebhookStatus::Success),
            TxnStatus::Success,
            Some("evt_2"),
            at,
            true,
        ));

        assert!(settled.get("failureWebhook").is_some());
        assert_eq!(settled.get("failureWebhookEventId"), Some(&json!("evt_1")));
        assert_eq!(settled.get("successWebhookEventId"), Some(&json!("evt_2")));
        assert_eq!(settled.get("bankTimeoutOverride"), Some(&json!(true)));
    }
}
