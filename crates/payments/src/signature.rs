//! Webhook signature verification.
//!
//! Header format: `t={unix seconds},v1={hex hmac}` where the MAC is
//! HMAC-SHA256 over `"{t}.{raw body}"`. Comparison is constant-time and the
//! timestamp must fall inside the tolerance window.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::PaymentError;

/// Header carrying the signature on webhook requests.
pub const SIGNATURE_HEADER: &str = "payment-signature";

/// Default replay-window tolerance.
const DEFAULT_TOLERANCE_MINS: i64 = 5;

type HmacSha256 = Hmac<Sha256>;

/// Verifies payment-provider webhook signatures.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    /// Accept unsigned payloads when no secret is configured. Development
    /// mode only; production requires verification.
    allow_unverified: bool,
    tolerance: Duration,
}

impl WebhookVerifier {
    /// Creates a verifier with a signing secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            allow_unverified: false,
            tolerance: Duration::minutes(DEFAULT_TOLERANCE_MINS),
        }
    }

    /// Creates a verifier from an optional secret; `allow_unverified`
    /// controls whether a missing secret downgrades to unverified parse.
    pub fn from_config(secret: Option<String>, allow_unverified: bool) -> Self {
        Self {
            secret,
            allow_unverified,
            tolerance: Duration::minutes(DEFAULT_TOLERANCE_MINS),
        }
    }

    /// Overrides the timestamp tolerance.
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Verifies `header` against the raw request body.
    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        let Some(secret) = self.secret.as_deref() else {
            if self.allow_unverified {
                tracing::warn!("no signing secret configured; accepting unverified webhook");
                return Ok(());
            }
            return Err(PaymentError::MissingSecret);
        };

        let header = header
            .ok_or_else(|| PaymentError::SignatureInvalid("missing signature header".into()))?;
        let (timestamp, provided) = parse_header(header)?;

        let age = (now.timestamp() - timestamp).abs();
        if age > self.tolerance.num_seconds() {
            return Err(PaymentError::SignatureInvalid(format!(
                "timestamp outside tolerance ({age}s)"
            )));
        }

        let expected = compute(payload, secret, timestamp)?;
        if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
            Ok(())
        } else {
            Err(PaymentError::SignatureInvalid("signature mismatch".into()))
        }
    }
}

/// Signs a payload the way the provider does. Used by local tooling and
/// tests to construct valid webhook requests.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mac = compute(payload, secret, timestamp).unwrap_or_default();
    format!("t={timestamp},v1={mac}")
}

fn compute(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::SignatureInvalid(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_header(header: &str) -> Result<(i64, &str), PaymentError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    PaymentError::SignatureInvalid("malformed timestamp".into())
                })?);
            }
            Some(("v1", value)) => signature = Some(value),
            _ => {}
        }
    }
    match (timestamp, signature) {
        (Some(t), Some(s)) => Ok((t, s)),
        _ => Err(PaymentError::SignatureInvalid("malformed signature header".into())),
    }
}
