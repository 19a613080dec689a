//! The provider adapter contract.
//!
//! This is the only interface the harness requires from a managed-resource
//! provider.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{DesiredConfiguration, ObservedState, ResourceId};

/// The capability interface every managed-resource provider must implement.
///
/// Implementations must be thread-safe (`Send + Sync`): independent harness
/// runs share one adapter while operating on disjoint resource identifiers.
///
/// # Example
///
/// ```ignore
/// use driftcheck_provider::{ProviderAdapter, ProviderError, ResourceId};
///
/// async fn still_exists(provider: &dyn ProviderAdapter, id: &ResourceId) -> Result<bool, ProviderError> {
///     match provider.fetch(id).await {
///         Ok(_) => Ok(true),
///         Err(err) if provider.is_not_found(&err) => Ok(false),
///         Err(err) => Err(err),
///     }
/// }
/// ```
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Drives the resource toward the given configuration.
    ///
    /// Creates the resource if it does not exist yet, otherwise updates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejected or could not perform the change.
    async fn apply(
        &self,
        id: &ResourceId,
        config: &DesiredConfiguration,
    ) -> Result<(), ProviderError>;

    /// Describes the resource by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error classified by [`ProviderAdapter::is_not_found`] if the
    /// resource is definitively absent, or any other error if the outcome is
    /// unknown.
    async fn fetch(&self, id: &ResourceId) -> Result<ObservedState, ProviderError>;

    /// Requests removal of the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refused or failed the removal.
    async fn destroy(&self, id: &ResourceId) -> Result<(), ProviderError>;

    /// Returns `true` if the error means the resource does not exist.
    ///
    /// Adapters with provider-specific not-found codes override this.
    fn is_not_found(&self, error: &ProviderError) -> bool {
        error.is_not_found()
    }

    /// Returns the name of this provider for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl<P: ProviderAdapter + ?Sized> ProviderAdapter for std::sync::Arc<P> {
    async fn apply(
        &self,
        id: &ResourceId,
        config: &DesiredConfiguration,
    ) -> Result<(), ProviderError> {
        (**self).apply(id, config).await
    }

    async fn fetch(&self, id: &ResourceId) -> Result<ObservedState, ProviderError> {
        (**self).fetch(id).await
    }

    async fn destroy(&self, id: &ResourceId) -> Result<(), ProviderError> {
        (**self).destroy(id).await
    }

    fn is_not_found(&self, error: &ProviderError) -> bool {
        (**self).is_not_found(error)
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
