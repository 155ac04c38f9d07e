//! Request authentication
//!
//! Token acquisition is injected behind a trait so deployments can plug in
//! whatever credential flow their remote catalog uses; the transport only
//! ever asks for a bearer token per request.

use async_trait::async_trait;

use super::errors::ApiError;

/// Trait for providing access tokens
///
/// Implementations should handle refresh internally; the transport fetches
/// a token per request so a refreshed credential is picked up on retry.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Get a valid access token
    async fn access_token(&self) -> Result<String, ApiError>;
}

/// Token provider holding a fixed credential (API key deployments, tests)
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_returns_token() {
        let provider = StaticTokenProvider::new("secret-token");
        assert_eq!(provider.access_token().await.unwrap(), "secret-token");
    }
}
