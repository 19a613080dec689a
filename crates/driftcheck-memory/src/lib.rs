//! In-memory managed-resource provider for the driftcheck harness.
//!
//! This crate provides an in-memory implementation of the `ProviderAdapter`
//! trait from `driftcheck-provider`, using a `DashMap` for concurrent access.
//! It can simulate eventual consistency, stuck deletions and scripted
//! faults, which makes it the fake adapter of choice for harness tests.
//!
//! # Example
//!
//! ```ignore
//! use driftcheck_memory::{InMemoryProvider, MemoryProviderOptions};
//! use driftcheck_provider::{DesiredConfiguration, ProviderAdapter, ResourceId};
//!
//! let provider = InMemoryProvider::with_options(
//!     MemoryProviderOptions::default().with_visibility_lag(2),
//! );
//! let id = ResourceId::generate("tf-aurora-cluster");
//! provider.apply(&id, &DesiredConfiguration::new(serde_json::json!({"replicas": 3}))).await?;
//! ```

mod faults;
mod options;
mod provider;

// Re-export the ProviderAdapter trait for convenience
pub use driftcheck_provider::{ProviderAdapter, ProviderError, ResourceId};

pub use faults::Fault;
pub use options::{DeletionBehavior, DocumentTransform, MemoryProviderOptions};
pub use provider::InMemoryProvider;
