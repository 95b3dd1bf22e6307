//! Local inspection of access tokens.
//!
//! Only the expiry claim is read. The signature is not verified; the backend
//! remains the authority on whether a token is accepted.

use crate::error::TokenError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde_json::Value;

/// Returns the `exp` claim of a JWT access token.
///
/// # Errors
///
/// Returns an error if the token is not a JWT, its payload cannot be decoded,
/// or it carries no usable `exp` claim.
pub fn expires_at(token: &str) -> Result<DateTime<Utc>, Report<TokenError>> {
    // JWT is base64url(header).base64url(payload).signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::Malformed.into());
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| TokenError::InvalidPayload {
            reason: e.to_string(),
        })?;

    let payload: Value =
        serde_json::from_slice(&payload_bytes).map_err(|e| TokenError::InvalidPayload {
            reason: e.to_string(),
        })?;

    // NumericDate may carry a fractional part.
    let exp = payload
        .get("exp")
        .and_then(Value::as_f64)
        .filter(|exp| exp.is_finite())
        .ok_or(TokenError::MissingExpiry)?;

    let seconds = exp.floor() as i64;
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| TokenError::MissingExpiry.into())
}

/// Returns true if the token carries an expiry at or before `now`.
///
/// Tokens whose expiry cannot be read are not known to be expired.
#[must_use]
pub fn is_known_expired(token: &str, now: DateTime<Utc>) -> bool {
    expires_at(token).is_ok_and(|exp| exp <= now)
}

#[cfg(test)]
pub(crate) fn encode_for_test(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"token_type":"access","exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn reads_expiry_claim() {
        let token = encode_for_test(1_700_000_000);
        assert_eq!(
            expires_at(&token).expect("decode").timestamp(),
            1_700_000_000
        );
    }

    #[test]
    fn fractional_expiry_is_floored() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":1700000000.75}"#);
        let token = format!("a.{payload}.c");
        assert_eq!(expires_at(&token).expect("decode").timestamp(), 1_700_000_000);

        let future = (Utc::now() + Duration::minutes(5)).timestamp();
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{future}.5}}"#));
        assert!(!is_known_expired(&format!("a.{payload}.c"), Utc::now()));
    }

    #[test]
    fn non_numeric_expiry_is_missing() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":"tomorrow"}"#);
        let report = expires_at(&format!("a.{payload}.c")).unwrap_err();
        assert_eq!(report.current_context(), &TokenError::MissingExpiry);
    }

    #[test]
    fn opaque_tokens_are_malformed() {
        let report = expires_at("T1").unwrap_err();
        assert_eq!(report.current_context(), &TokenError::Malformed);
        assert!(!is_known_expired("T1", Utc::now()));
    }

    #[test]
    fn garbage_payload_is_rejected() {
        assert!(expires_at("a.!!!.c").is_err());
        let no_exp = format!("a.{}.c", URL_SAFE_NO_PAD.encode(br#"{"sub":"1"}"#));
        let report = expires_at(&no_exp).unwrap_err();
        assert_eq!(report.current_context(), &TokenError::MissingExpiry);
    }

    #[test]
    fn expiry_boundary_counts_as_expired() {
        let now = Utc::now();
        let at_now = encode_for_test(now.timestamp());
        let past = encode_for_test((now - Duration::seconds(10)).timestamp());
        let future = encode_for_test((now + Duration::minutes(5)).timestamp());

        assert!(is_known_expired(&at_now, now));
        assert!(is_known_expired(&past, now));
        assert!(!is_known_expired(&future, now));
    }
}
