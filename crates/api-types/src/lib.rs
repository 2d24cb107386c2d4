//! Shared API type definitions
//!
//! This crate contains the `apps.clusternet.io/v1alpha1` resource types consumed
//! and produced by the feed inventory controller, together with the
//! [`ReplicaRequirements`] descriptor that is also accepted by the capacity
//! predictor HTTP API.

mod manifest;
mod requirements;
mod subscription;

pub use manifest::Manifest;
pub use requirements::ReplicaRequirements;
pub use subscription::Feed;
pub use subscription::FeedInventory;
pub use subscription::FeedInventorySpec;
pub use subscription::FeedOrder;
pub use subscription::SchedulingStrategy;
pub use subscription::Subscription;
pub use subscription::SubscriptionSpec;

/// API group of all custom resources handled here.
pub const GROUP: &str = "apps.clusternet.io";
/// API version of all custom resources handled here.
pub const VERSION: &str = "v1alpha1";

/// Namespace where Manifests are stored.
pub const RESERVED_NAMESPACE: &str = "clusternet-reserved";

/// Well-known label keys and values.
pub mod labels {
    pub const OBJECT_CREATED_BY: &str = "clusternet.io/created-by";
    pub const CREATED_BY_HUB: &str = "clusternet-hub";

    pub const SUBSCRIPTION_NAME: &str = "apps.clusternet.io/subs.name";
    pub const SUBSCRIPTION_NAMESPACE: &str = "apps.clusternet.io/subs.namespace";
    pub const SUBSCRIPTION_UID: &str = "apps.clusternet.io/subs.uid";

    pub const CONFIG_GROUP: &str = "apps.clusternet.io/config.group";
    pub const CONFIG_VERSION: &str = "apps.clusternet.io/config.version";
    pub const CONFIG_KIND: &str = "apps.clusternet.io/config.kind";
    pub const CONFIG_NAME: &str = "apps.clusternet.io/config.name";
    pub const CONFIG_NAMESPACE: &str = "apps.clusternet.io/config.namespace";

    /// Label value marking a Manifest label key as a Subscription back-reference.
    pub const SUBSCRIPTION_KIND: &str = "Subscription";
}
