//! Inbound provider webhook payload.

use rampart_shared::types::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

use super::types::{RampKind, WebhookStatus};

/// Body of `POST /bankWebhook`.
///
/// Unknown fields are rejected, enum fields are typed, and the amount must
/// be a positive integer in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_shape"))]
pub struct WebhookPayload {
    /// Which kind of transaction the token refers to.
    #[serde(rename = "type")]
    pub kind: RampKind,
    /// Transaction token.
    #[validate(length(min = 1, max = 128, message = "token must be 1-128 characters"))]
    pub token: String,
    /// Owner of the transaction.
    pub user_identifier: UserId,
    /// Amount in minor units.
    #[validate(range(min = 1, message = "amount must be a positive integer"))]
    pub amount: i64,
    /// Terminal status reported by the provider.
    pub status: WebhookStatus,
    /// Machine-readable failure reason.
    #[serde(rename = "failureReasonCode", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 64, message = "failureReasonCode must be 1-64 characters"))]
    pub failure_reason_code: Option<String>,
    /// Human-readable failure reason.
    #[serde(rename = "failureReasonMessage", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500, message = "failureReasonMessage cannot exceed 500 characters"))]
    pub failure_reason_message: Option<String>,
    /// Destination account of a withdrawal.
    #[serde(rename = "linkedBankAccountId", default, skip_serializing_if = "Option::is_none")]
    pub linked_bank_account_id: Option<i64>,
}

fn validate_shape(payload: &WebhookPayload) -> Result<(), ValidationError> {
    if payload.linked_bank_account_id.is_some() && payload.kind != RampKind::Offramp {
        return Err(ValidationError::new("linked_account_offramp_only")
            .with_message("linkedBankAccountId is only valid for OFFRAMP".into()));
    }
    if payload.status == WebhookStatus::Success
        && (payload.failure_reason_code.is_some() || payload.failure_reason_message.is_some())
    {
        return Err(ValidationError::new("failure_reason_on_success")
            .with_message("failure reason is only valid with status Failure".into()));
    }
    Ok(())
}

/// Why a webhook body was rejected before touching the database.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// Not JSON, or JSON of the wrong shape.
    #[error("Malformed webhook payload: {0}")]
    Malformed(String),
    /// Well-formed but failed field validation.
    #[error("Invalid webhook payload: {0}")]
    Invalid(String),
}

impl PayloadError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED_PAYLOAD",
            Self::Invalid(_) => "VALIDATION_ERROR",
        }
    }
}

impl WebhookPayload {
    /// Parses and validates the exact raw body that was signed.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if deserialization fails and `Invalid` if a
    /// field or cross-field rule fails.
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        let payload: Self =
            serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))?;
        payload
            .validate()
            .map_err(|e| PayloadError::Invalid(e.to_string()))?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const USER: &str = "0191f2a4-5c6e-7a00-8000-000000000001";

    fn body(value: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[test]
    fn test_parse_onramp_success() {
        let payload = WebhookPayload::parse(&body(&json!({
            "type": "ONRAMP",
            "token": "tok_1",
            "user_identifier": USER,
            "amount": 50000,
            "status": "Success"
        })))
        .unwrap();

        assert_eq!(payload.kind, RampKind::Onramp);
        assert_eq!(payload.amount, 50_000);
        assert_eq!(payload.user_identifier.to_string(), USER);
    }

    #[test]
    fn test_parse_offramp_failure() {
        let payload = WebhookPayload::parse(&body(&json!({
            "type": "OFFRAMP",
            "token": "tok_2",
            "user_identifier": USER,
            "amount": 1200,
            "status": "Failure",
            "failureReasonCode": "USER_DECLINED",
            "failureReasonMessage": "declined by user",
            "linkedBankAccountId": 4
        })))
        .unwrap();

        assert_eq!(payload.failure_reason_code.as_deref(), Some("USER_DECLINED"));
        assert_eq!(payload.linked_bank_account_id, Some(4));
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        for amount in [0, -5] {
            let err = WebhookPayload::parse(&body(&json!({
                "type": "ONRAMP",
                "token": "tok",
                "user_identifier": USER,
                "amount": amount,
                "status": "Success"
            })))
            .unwrap_err();
            assert!(matches!(err, PayloadError::Invalid(_)));
        }
    }

    #[test]
    fn test_rejects_fractional_amount_and_unknown_status() {
        let fractional = WebhookPayload::parse(&body(&json!({
            "type": "ONRAMP",
            "token": "tok",
            "user_identifier": USER,
            "amount": 10.5,
            "status": "Success"
        })));
        assert!(matches!(fractional, Err(PayloadError::Malformed(_))));

        let status = WebhookPayload::parse(&body(&json!({
            "type": "ONRAMP",
            "token": "tok",
            "user_identifier": USER,
            "amount": 10,
            "status": "Processing"
        })));
        assert!(matches!(status, Err(PayloadError::Malformed(_))));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let result = WebhookPayload::parse(&body(&json!({
            "type": "ONRAMP",
            "token": "tok",
            "user_identifier": USER,
            "amount": 10,
            "status": "Success",
            "extra": true
        })));
        assert!(matches!(result, Err(PayloadError::Malformed(_))));
    }

    #[test]
    fn test_linked_account_only_for_offramp() {
        let result = WebhookPayload::parse(&body(&json!({
            "type": "ONRAMP",
            "token": "tok",
            "user_identifier": USER,
            "amount": 10,
            "status": "Success",
            "linkedBankAccountId": 1
        })));
        assert!(matches!(result, Err(PayloadError::Invalid(_))));
    }

    #[test]
    fn test_failure_reason_requires_failure_status() {
        let result = WebhookPayload::parse(&body(&json!({
            "type": "ONRAMP",
            "token": "tok",
            "user_identifier": USER,
            "amount": 10,
            "status": "Success",
            "failureReasonCode": "BANK_TIMEOUT"
        })));
        assert!(matches!(result, Err(PayloadError::Invalid(_))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            WebhookPayload::parse(b"not json"),
            Err(PayloadError::Malformed(_))
        ));
        assert!(matches!(WebhookPayload::parse(b""), Err(PayloadError::Malformed(_))));
    }
}
