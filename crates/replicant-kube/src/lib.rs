//! replicant-kube: Kubernetes adapter for Replicant.
//!
//! Everything that talks to the cluster API server lives here:
//!
//! - **`client`**: builds the kube client and the namespaced Deployment API
//! - **`watch`**: turns the kube watcher stream into [`WatchEvent`]s
//! - **`gateway`**: sends replica-count merge patches
//! - **`backend`**: [`KubeBackend`], the production [`ReplicaBackend`]
//!
//! [`WatchEvent`]: replicant_cache::WatchEvent
//! [`ReplicaBackend`]: replicant_api::ReplicaBackend

pub mod backend;
pub mod client;
pub mod error;
pub mod gateway;
pub mod watch;

pub use backend::KubeBackend;
pub use client::{DEFAULT_NAMESPACE, DeploymentApi};
pub use error::KubeError;
pub use gateway::MutationGateway;
pub use watch::{WatchTranslator, run_deployment_watch};
