#![cfg_attr(docsrs, feature(doc_cfg))]
//! # lts-weights
//!
//! lts-weights computes load-balancing weights for a partitioned tetrahedral
//! mesh driven by a multi-rate local time stepping (LTS) solver. Cells are
//! grouped into time-step clusters related by an integer rate; a cell in a
//! faster cluster is updated more often and costs more. The crate turns
//! per-cell wave speeds and boundary codes into the vertex weights, edge
//! weights and imbalance tolerances a graph partitioner consumes.
//!
//! ## Pipeline
//! 1. [`time_stepping::timestep`]: stable time step per cell, global extremes
//!    via an all-reduce.
//! 2. [`time_stepping::cluster`]: bucket each step into a cluster id.
//! 3. [`time_stepping::enforce`]: promote cells until adjacent clusters
//!    (also across ranks) differ by at most `max_difference`, using
//!    [`algs::ghost_exchange`].
//! 4. [`weights`]: cost models turn cluster ids into weights.
//!
//! [`weights::LtsWeights`] runs these as an explicit state machine.
//!
//! ## Communication
//! Every collective goes through the [`algs::communicator::Communicator`]
//! trait: `NoComm` for serial runs, `RayonComm` for in-process multi-rank
//! tests, and `MpiComm` with the `mpi-support` feature.
//!
//! ```toml
//! [dependencies]
//! lts-weights = "0.1"
//! # features = ["mpi-support", "rayon", "metis-support"]
//! ```

pub mod algs;
pub mod config;
pub mod data;
pub mod lts_error;
pub mod physics;
pub mod time_stepping;
pub mod weights;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::distributed_graph::DistributedGraph;
    pub use crate::algs::ghost_exchange::{GhostLayer, exchange_ghost_layer};
    pub use crate::algs::metis_partition::PartitionerInput;
    pub use crate::config::LtsWeightsConfig;
    pub use crate::data::bc::FaceType;
    pub use crate::data::cells::CellData;
    pub use crate::lts_error::LtsWeightsError;
    pub use crate::physics::material::ElasticMaterial;
    pub use crate::time_stepping::{
        ClusterBoundary, Clusterer, EnforcementReport, GlobalTimeStepDetails,
    };
    pub use crate::weights::{
        CostKind, EdgeWeightModel, LtsWeights, NodeWeightModel, OffsetType, Stage, Weights,
    };
}
