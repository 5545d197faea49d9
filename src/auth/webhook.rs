//! HMAC-SHA256 verification of webhook deliveries.
//!
//! Forges sign the raw request body with a shared secret and send the digest
//! as `sha256=<hex>`.  The check is only enforced when the secret is
//! configured.

use anyhow::{anyhow, Result};
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::RelayConfig;

type HmacSha256 = Hmac<Sha256>;

/// Signature headers in lookup order: the normalized header set by a fronting
/// proxy first, then GitHub's own.
pub const SIGNATURE_HEADERS: [&str; 2] = ["X-Webhook-Signature", "X-Hub-Signature-256"];

/// Read the webhook secret from the environment variable named by
/// `relay.webhook_secret_env`.  `None` disables verification.
pub fn webhook_secret(config: &RelayConfig) -> Option<String> {
    let var = config.webhook_secret_env.as_deref()?;
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

/// Verify the HMAC-SHA256 signature of `body` against `secret`.
pub fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    let sig_header = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| anyhow!("missing webhook signature header"))?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| anyhow!("webhook signature does not start with sha256="))?;

    let sig_bytes = hex::decode(sig_hex).map_err(|e| anyhow!("invalid hex in signature: {e}"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("HMAC key error: {e}"))?;
    mac.update(body);

    mac.verify_slice(&sig_bytes)
        .map_err(|_| anyhow!("HMAC signature mismatch"))?;

    Ok(())
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
