//! # driftcheck-provider
//!
//! Provider abstraction layer for the driftcheck reconciliation harness.
//!
//! This crate defines the contract a managed-resource provider must satisfy
//! and the data types exchanged with the harness. It does not contain any
//! concrete provider - those live in separate crates.
//!
//! ## Overview
//!
//! The main trait is [`ProviderAdapter`], which defines:
//! - `apply`: drive a resource toward a [`DesiredConfiguration`]
//! - `fetch`: describe a resource, returning an [`ObservedState`]
//! - `destroy`: remove a resource
//! - `is_not_found`: classify "definitively absent" errors
//!
//! ## Implementing a provider
//!
//! ```ignore
//! use async_trait::async_trait;
//! use driftcheck_provider::{DesiredConfiguration, ObservedState, ProviderAdapter, ProviderError, ResourceId};
//!
//! struct ClusterApi {
//!     // ...
//! }
//!
//! #[async_trait]
//! impl ProviderAdapter for ClusterApi {
//!     async fn fetch(&self, id: &ResourceId) -> Result<ObservedState, ProviderError> {
//!         // Implementation
//!     }
//!
//!     fn is_not_found(&self, error: &ProviderError) -> bool {
//!         error.is_not_found() || error.code() == Some("DBClusterNotFoundFault")
//!     }
//!     // ... other methods
//! }
//! ```

mod error;
pub mod journal;
mod traits;
mod types;

pub use error::{ErrorCategory, ProviderError};
pub use journal::{CallJournal, CallKind, CallOutcome, JournaledProvider, ProviderCall};
pub use traits::ProviderAdapter;
pub use types::{
    DesiredConfiguration, LIST_COUNT_SUFFIX, MAP_COUNT_SUFFIX, ObservedState, ResourceId,
    canonical_value,
};
