//! Seams between the reconciliation logic and the cluster

use core::error::Error;
use std::sync::Arc;

use api_types::FeedInventory;
use api_types::Manifest;
use api_types::Subscription;
use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Node;

use super::predictor::PredictorError;
use super::selector::Selector;

/// Errors returned by FeedInventory writes.
#[derive(Debug, derive_more::Display)]
pub enum StoreError {
    #[display("FeedInventory {key} already exists")]
    AlreadyExists { key: String },
    #[display("FeedInventory {key} was modified concurrently")]
    Conflict { key: String },
    #[display("FeedInventory {key} not found")]
    NotFound { key: String },
    #[display("API request for FeedInventory {key} failed: {message}")]
    Api { key: String, message: String },
}

impl Error for StoreError {}

/// Read access to the locally cached Subscriptions and Manifests
pub trait ObjectLister: Send + Sync {
    fn get_subscription(&self, namespace: &str, name: &str) -> Option<Arc<Subscription>>;

    /// Subscriptions in every namespace matching the selector
    fn list_subscriptions(&self, selector: &Selector) -> Vec<Arc<Subscription>>;

    fn list_manifests(&self, namespace: &str, selector: &Selector) -> Vec<Arc<Manifest>>;
}

/// Write access to FeedInventory objects on the API server
#[async_trait]
pub trait FeedInventoryWriter: Send + Sync {
    async fn create(&self, inventory: &FeedInventory)
        -> Result<FeedInventory, Report<StoreError>>;

    async fn get(&self, namespace: &str, name: &str) -> Result<FeedInventory, Report<StoreError>>;

    /// Replaces the stored object; fails with [`StoreError::Conflict`] when the
    /// resource version is stale.
    async fn replace(&self, inventory: &FeedInventory)
        -> Result<FeedInventory, Report<StoreError>>;
}

/// Read access to the locally cached Nodes
pub trait NodeLister: Send + Sync {
    /// Nodes matching the selector; fails while the cache has not synced
    fn list_nodes(&self, selector: &Selector) -> Result<Vec<Arc<Node>>, Report<PredictorError>>;

    /// Whether the cache has completed its initial listing
    fn has_synced(&self) -> bool;
}
