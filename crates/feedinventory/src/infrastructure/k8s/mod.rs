//! Kubernetes-backed adapters for the domain traits

mod change_feed;
mod cluster_state;
mod node_cache;
mod types;
mod watch;

pub use change_feed::CacheSync;
pub use change_feed::ChangeFeed;
pub use cluster_state::KubeFeedInventoryWriter;
pub use cluster_state::KubeObjectCache;
pub use node_cache::NodeCache;
pub use node_cache::NodeWatcher;
pub use types::KubernetesError;
