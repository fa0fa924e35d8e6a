//! HMAC-SHA256 webhook signatures.
//!
//! The inbound provider webhook and the outbound delivery worker sign the
//! exact raw body bytes with the same algorithm, hex-encoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
/// Header carrying the delivery event id.
pub const EVENT_ID_HEADER: &str = "X-Webhook-Id";
/// Header carrying the send time (unix seconds) on outbound deliveries.
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";

/// Computes the hex-encoded HMAC-SHA256 of `body` under `secret`.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    hex::encode(mac(secret, body).finalize().into_bytes())
}

/// Verifies a hex signature against `body` in constant time.
///
/// A `sha256=` prefix is tolerated. Malformed hex never matches.
#[must_use]
pub fn verify(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let trimmed = signature_hex.trim();
    let hex_part = trimmed.strip_prefix("sha256=").unwrap_or(trimmed);

    let Ok(provided) = hex::decode(hex_part) else {
        return false;
    };

    let expected = mac(secret, body).finalize().into_bytes();
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

fn mac(secret: &str, body: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
    mac.update(body);
    mac
}
