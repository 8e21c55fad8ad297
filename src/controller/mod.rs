pub mod cluster_control;
pub mod context;
pub mod error;
pub mod events;
pub mod gates;
pub mod reconciler;
pub mod status;
pub mod validation;

pub use cluster_control::ClusterControl;
pub use context::{Context, FailureTracker};
pub use error::{BackoffConfig, Error, Result, Stage};
pub use events::{EventRecorder, KubeEventRecorder};
pub use reconciler::{error_policy, reconcile, release_deleted};
pub use status::{ConditionBuilder, StatusManager, pass_status};
pub use validation::{MAX_REPLICAS, MIN_QUERY_REPLICAS, MIN_REPLICAS, validate_spec};
