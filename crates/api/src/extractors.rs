//! Request extractors for wallet routes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use rampart_shared::types::UserId;

use crate::error::ApiError;

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Header carrying the wallet user asserted by the upstream session layer.
pub const USER_ID_HEADER: &str = "X-User-Id";

const MAX_KEY_LEN: usize = 255;

/// Value of the `Idempotency-Key` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey(pub String);

impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = header_str(parts, IDEMPOTENCY_KEY_HEADER)
            .ok_or_else(|| ApiError::validation("Idempotency-Key header is required"))?;

        if key.len() > MAX_KEY_LEN {
            return Err(ApiError::validation(format!(
                "Idempotency-Key cannot exceed {MAX_KEY_LEN} characters"
            )));
        }

        Ok(Self(key.to_string()))
    }
}

/// The wallet user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletUser(pub UserId);

impl<S> FromRequestParts<S> for WalletUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = header_str(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized("X-User-Id header is required"))?;

        raw.parse::<UserId>()
            .map(Self)
            .map_err(|_| ApiError::validation("X-User-Id must be a UUID"))
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_idempotency_key() {
        let mut p = parts(&[("Idempotency-Key", " key-1 ")]);
        let key = IdempotencyKey::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(key.0, "key-1");

        let mut p = parts(&[]);
        let err = IdempotencyKey::from_request_parts(&mut p, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let long = "k".repeat(256);
        let mut p = parts(&[("Idempotency-Key", long.as_str())]);
        assert!(IdempotencyKey::from_request_parts(&mut p, &()).await.is_err());
    }

    #[tokio::test]
    async fn test_wallet_user() {
        let user = UserId::new();
        let mut p = parts(&[("X-User-Id", user.to_string().as_str())]);
        let extracted = WalletUser::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(extracted.0, user);

        let mut p = parts(&[]);
        let err = WalletUser::from_request_parts(&mut p, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let mut p = parts(&[("X-User-Id", "not-a-uuid")]);
        let err = WalletUser::from_request_parts(&mut p, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
