//! Caller identity resolution.
//!
//! Every cluster declared by this crate must grant the deploying principal
//! administrative access, otherwise that principal is locked out of the
//! cluster the moment it is created. The identity is therefore resolved
//! once, up front, and threaded through every scenario construct.
//!
//! Resolution goes through the [`CallerIdentityProvider`] trait rather than
//! any ambient process-wide credential lookup, so tests can substitute a
//! [`StaticIdentityProvider`] and synthesis stays deterministic. The
//! production provider calls STS `GetCallerIdentity` and requires the `aws`
//! feature.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::{Error, Result};

/// The invoking principal's identity. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique principal id (STS `UserId`)
    pub principal_id: String,
    /// Full ARN of the principal
    pub arn: String,
    /// Owning account id
    pub account: String,
}

impl Identity {
    /// Create a new identity handle.
    pub fn new(
        principal_id: impl Into<String>,
        arn: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            arn: arn.into(),
            account: account.into(),
        }
    }

    /// The trailing name component of the ARN, used as the in-cluster
    /// username for the authorization mapping.
    pub fn short_name(&self) -> &str {
        self.arn.rsplit('/').next().unwrap_or(&self.arn)
    }
}

/// Capability for discovering the invoking principal.
#[async_trait]
pub trait CallerIdentityProvider: Send + Sync {
    /// Resolve the caller's identity, or fail with
    /// [`Error::CredentialsUnavailable`] when no credentials exist.
    async fn caller_identity(&self) -> Result<Identity>;
}

#[async_trait]
impl CallerIdentityProvider for Box<dyn CallerIdentityProvider> {
    async fn caller_identity(&self) -> Result<Identity> {
        (**self).caller_identity().await
    }
}

/// A fixed identity, for tests and offline synthesis.
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    identity: Identity,
}

impl StaticIdentityProvider {
    /// Wrap a known identity.
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl CallerIdentityProvider for StaticIdentityProvider {
    async fn caller_identity(&self) -> Result<Identity> {
        Ok(self.identity.clone())
    }
}

/// STS-backed provider using the default credential chain.
#[cfg(feature = "aws")]
pub struct StsIdentityProvider {
    client: aws_sdk_sts::Client,
}

#[cfg(feature = "aws")]
impl StsIdentityProvider {
    /// Build a provider from the ambient AWS configuration (environment,
    /// shared config files, instance metadata).
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: aws_sdk_sts::Client::new(&config),
        }
    }

    /// Build a provider from an already-loaded SDK configuration.
    pub fn from_config(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(config),
        }
    }
}

#[cfg(feature = "aws")]
#[async_trait]
impl CallerIdentityProvider for StsIdentityProvider {
    async fn caller_identity(&self) -> Result<Identity> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| Error::CredentialsUnavailable(e.to_string()))?;

        match (output.user_id(), output.arn(), output.account()) {
            (Some(user_id), Some(arn), Some(account)) => {
                tracing::info!(arn = %arn, "resolved caller identity");
                Ok(Identity::new(user_id, arn, account))
            }
            _ => Err(Error::CredentialsUnavailable(
                "STS returned an incomplete caller identity".to_string(),
            )),
        }
    }
}

/// Resolves the caller identity once per orchestration run and hands out the
/// cached handle afterwards. Repeated resolution is redundant but harmless;
/// caching just avoids the extra lookups.
pub struct IdentityResolver<P> {
    provider: P,
    cached: OnceCell<Identity>,
}

impl<P: CallerIdentityProvider> IdentityResolver<P> {
    /// Create a resolver over the given provider.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cached: OnceCell::new(),
        }
    }

    /// Resolve the identity, reusing the cached result on subsequent calls.
    pub async fn resolve(&self) -> Result<&Identity> {
        self.cached
            .get_or_try_init(|| self.provider.caller_identity())
            .await
    }
}
