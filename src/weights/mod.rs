//! Cost models and the staged weight computation.

pub mod cost_model;
pub mod lts_weights;

pub use cost_model::{
    CostKind, EdgeModel, EdgeModelKind, EdgeWeightModel, NodeModel, NodeModelKind,
    NodeWeightModel, OffsetType,
};
pub use lts_weights::{LtsWeights, Stage, Weights};
