//! Cost models turning cluster ids into partitioner weights.
//!
//! A node model prices one cost kind of a cell in a given cluster; an edge
//! model prices the traffic over one graph edge from the clusters of its two
//! endpoints. Custom models implement the traits directly; the built-in
//! strategies are selected from configuration through [`NodeModel`] and
//! [`EdgeModel`].

use std::str::FromStr;

use num_traits::checked_pow;
use serde::{Deserialize, Serialize};

use crate::config::LtsWeightsConfig;
use crate::lts_error::LtsWeightsError;

/// What a node-weight factor is asked to price.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CostKind {
    /// Volume work of the cell itself.
    Element,
    /// Extra work of a cell touching a dynamic rupture face.
    DynamicRupture,
    /// Extra work of a cell touching a free surface with gravity.
    FreeSurfaceWithGravity,
}

pub trait NodeWeightModel {
    fn factor(&self, cluster: u32, kind: CostKind) -> Result<i64, LtsWeightsError>;
}

pub trait EdgeWeightModel {
    fn factor(&self, cluster_a: u32, cluster_b: u32) -> Result<i64, LtsWeightsError>;
}

/// Where edge-model factors are written.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OffsetType {
    /// The factor of every edge becomes its edge weight.
    #[default]
    EdgeWeight,
    /// Only rank-crossing edges carry the factor; local edges weigh 1.
    MinMsg,
    /// Edge weights as for `EdgeWeight`; rank-crossing factors are also added
    /// to the owning cell's first vertex constraint.
    BalancedMsg,
}

impl FromStr for OffsetType {
    type Err = LtsWeightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edgeWeight" | "edge_weight" => Ok(Self::EdgeWeight),
            "minMsg" | "min_msg" => Ok(Self::MinMsg),
            "balancedMsg" | "balanced_msg" => Ok(Self::BalancedMsg),
            other => Err(LtsWeightsError::config(format!(
                "unknown offset type `{other}`"
            ))),
        }
    }
}

/// Built-in node strategies.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeModelKind {
    /// Element cost scales with `rate^cluster`; extras are flat.
    #[default]
    Exponential,
    /// Element cost and extras all scale with `rate^cluster`.
    ExponentialBalanced,
}

/// Built-in edge strategies.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeModelKind {
    /// `rate^(max_cluster - min(a, b))`: updates the faster side sends per slowest cycle.
    #[default]
    ApproximateCommunication,
    /// Every edge weighs 1.
    Uniform,
}

fn rate_pow(rate: u32, exp: u32) -> Result<i64, LtsWeightsError> {
    checked_pow(i64::from(rate), exp as usize).ok_or_else(|| {
        LtsWeightsError::PartitionerInputInvalid(format!("{rate}^{exp} overflows i64").into())
    })
}

fn checked_scale(a: i64, b: i64) -> Result<i64, LtsWeightsError> {
    a.checked_mul(b).ok_or_else(|| {
        LtsWeightsError::PartitionerInputInvalid(format!("{a} * {b} overflows i64").into())
    })
}

/// Configured node strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodeModel {
    pub kind: NodeModelKind,
    pub rate: u32,
    pub element: i64,
    pub dynamic_rupture: i64,
    pub free_surface_with_gravity: i64,
}

impl NodeModel {
    pub fn from_config(cfg: &LtsWeightsConfig) -> Self {
        Self {
            kind: cfg.node_model,
            rate: cfg.rate,
            element: cfg.vertex_weight_element,
            dynamic_rupture: cfg.vertex_weight_dynamic_rupture,
            free_surface_with_gravity: cfg.vertex_weight_free_surface_with_gravity,
        }
    }
}

impl NodeWeightModel for NodeModel {
    fn factor(&self, cluster: u32, kind: CostKind) -> Result<i64, LtsWeightsError> {
        let base = match kind {
            CostKind::Element => self.element,
            CostKind::DynamicRupture => self.dynamic_rupture,
            CostKind::FreeSurfaceWithGravity => self.free_surface_with_gravity,
        };
        match (self.kind, kind) {
            (NodeModelKind::Exponential, CostKind::Element) | (NodeModelKind::ExponentialBalanced, _) => {
                checked_scale(rate_pow(self.rate, cluster)?, base)
            }
            (NodeModelKind::Exponential, _) => Ok(base),
        }
    }
}

/// Configured edge strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeModel {
    pub kind: EdgeModelKind,
    pub rate: u32,
    pub max_cluster_id: u32,
}

impl EdgeModel {
    pub fn from_config(cfg: &LtsWeightsConfig, max_cluster_id: u32) -> Self {
        Self {
            kind: cfg.edge_model,
            rate: cfg.rate,
            max_cluster_id,
        }
    }
}

impl EdgeWeightModel for EdgeModel {
    fn factor(&self, cluster_a: u32, cluster_b: u32) -> Result<i64, LtsWeightsError> {
        match self.kind {
            EdgeModelKind::Uniform => Ok(1),
            EdgeModelKind::ApproximateCommunication => {
                let faster = cluster_a.min(cluster_b).min(self.max_cluster_id);
                rate_pow(self.rate, self.max_cluster_id - faster)
            }
        }
    }
}
