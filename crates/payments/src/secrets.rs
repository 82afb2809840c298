//! Signing-secret retrieval.
//!
//! The webhook secret lives in secure storage; processes fetch it once and
//! cache it for their lifetime. The provider trait keeps the storage choice
//! out of the ingress.

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::PaymentError;

/// Source of the webhook signing secret.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Fetches the secret; `None` means no secret is configured.
    async fn webhook_signing_secret(&self) -> Result<Option<String>, PaymentError>;
}

/// Reads the secret from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvSecrets {
    var: String,
}

impl EnvSecrets {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl SecretProvider for EnvSecrets {
    async fn webhook_signing_secret(&self) -> Result<Option<String>, PaymentError> {
        Ok(std::env::var(&self.var).ok().filter(|s| !s.is_empty()))
    }
}

/// Fixed secret, for tests and local runs.
#[derive(Debug, Clone)]
pub struct StaticSecrets(pub Option<String>);

#[async_trait]
impl SecretProvider for StaticSecrets {
    async fn webhook_signing_secret(&self) -> Result<Option<String>, PaymentError> {
        Ok(self.0.clone())
    }
}

/// Caches the inner provider's answer for the process lifetime.
pub struct CachedSecrets<P> {
    inner: P,
    cache: OnceCell<Option<String>>,
}

impl<P: SecretProvider> CachedSecrets<P> {
    pub fn new(inner: P) -> Self {
        Self { inner, cache: OnceCell::new() }
    }
}

#[async_trait]
impl<P: SecretProvider> SecretProvider for CachedSecrets<P> {
    async fn webhook_signing_secret(&self) -> Result<Option<String>, PaymentError> {
        let cached = self
            .cache
            .get_or_try_init(|| self.inner.webhook_signing_secret())
            .await?;
        Ok(cached.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider(AtomicU32);

    #[async_trait]
    impl SecretProvider for CountingProvider {
        async fn webhook_signing_secret(&self) -> Result<Option<String>, PaymentError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some("whsec_test".to_string()))
        }
    }

    #[tokio::test]
    async fn cache_fetches_once() {
        let provider = CachedSecrets::new(CountingProvider(AtomicU32::new(0)));

        for _ in 0..3 {
            let secret = provider.webhook_signing_secret().await.unwrap();
            assert_eq!(secret.as_deref(), Some("whsec_test"));
        }
        assert_eq!(provider.inner.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn static_secrets_pass_through() {
        let provider = StaticSecrets(None);
        assert!(provider.webhook_signing_secret().await.unwrap().is_none());
    }
}
