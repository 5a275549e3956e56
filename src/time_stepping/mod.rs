//! Time steps, clusters and the cluster-difference constraint.

pub mod cluster;
pub mod enforce;
pub mod timestep;

pub use cluster::{ClusterBoundary, Clusterer};
pub use enforce::{EnforcementReport, enforce_maximum_difference};
pub use timestep::{GlobalTimeStepDetails, collect_global_time_step_details};
