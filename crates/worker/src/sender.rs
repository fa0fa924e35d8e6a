//! Signed HTTP delivery of one job.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use rampart_core::delivery::DeliveryFailure;
use rampart_shared::signature::{EVENT_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, sign};

use crate::store::DeliveryJob;

/// Sends delivery jobs as signed JSON POSTs.
///
/// The body is serialized once; the signature is computed over exactly the
/// bytes that go on the wire.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    /// Creates a sender whose attempts are aborted after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rampart-delivery/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }

    /// Delivers one job. Any non-2xx answer is a failure.
    ///
    /// # Errors
    ///
    /// Returns the classified [`DeliveryFailure`].
    pub async fn send(&self, job: &DeliveryJob) -> Result<(), DeliveryFailure> {
        if job.url.trim().is_empty() {
            return Err(DeliveryFailure::Undeliverable("job has no target URL".into()));
        }

        let body = serde_json::to_vec(&job.payload)
            .map_err(|e| DeliveryFailure::Undeliverable(format!("unserializable payload: {e}")))?;
        let headers = signed_headers(job, &body)?;

        let response = self
            .client
            .post(&job.url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryFailure::Status {
                status: status.as_u16(),
            })
        }
    }
}

fn signed_headers(job: &DeliveryJob, body: &[u8]) -> Result<HeaderMap, DeliveryFailure> {
    let value = |v: String| {
        HeaderValue::from_str(&v)
            .map_err(|e| DeliveryFailure::Undeliverable(format!("invalid header value: {e}")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(SIGNATURE_HEADER, value(sign(&job.secret, body))?);
    headers.insert(EVENT_ID_HEADER, value(job.webhook_event_id.clone())?);
    headers.insert(TIMESTAMP_HEADER, value(Utc::now().timestamp().to_string())?);
    Ok(headers)
}

fn classify_transport(err: reqwest::Error) -> DeliveryFailure {
    if err.is_timeout() {
        DeliveryFailure::Timeout
    } else if err.is_connect() {
        DeliveryFailure::Connect(err.to_string())
    } else {
        DeliveryFailure::Network(err.to_string())
    }
}
