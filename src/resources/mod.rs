pub mod backup;
pub mod common;
pub mod pdb;
pub mod service;
pub mod statefulset;

pub use common::{API_VERSION, FIELD_MANAGER, KIND, owner_reference, tier_labels};
