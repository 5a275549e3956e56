//! Configuration of one weight-computation cycle.
//!
//! Field names serialize in camelCase (`vertexWeightElement`, ...), the names
//! used by the solver's parameter files.

use serde::{Deserialize, Serialize};

use crate::lts_error::LtsWeightsError;
use crate::time_stepping::cluster::ClusterBoundary;
use crate::weights::cost_model::{EdgeModelKind, NodeModelKind, OffsetType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LtsWeightsConfig {
    /// Name of the velocity model; only reported.
    pub velocity_model: String,
    /// LTS rate multiplier between consecutive clusters.
    pub rate: u32,
    pub vertex_weight_element: i64,
    pub vertex_weight_dynamic_rupture: i64,
    pub vertex_weight_free_surface_with_gravity: i64,
    pub maximum_allowed_time_step: f64,
    /// Largest cluster-id gap allowed between adjacent cells.
    pub max_difference: u32,
    pub cluster_boundary: ClusterBoundary,
    pub node_model: NodeModelKind,
    pub edge_model: EdgeModelKind,
    pub offset_type: OffsetType,
    /// Imbalance tolerance of the compute constraint.
    pub imbalance_compute: f64,
    /// Imbalance tolerance of each extra-cost constraint.
    pub imbalance_extra: f64,
}

impl Default for LtsWeightsConfig {
    fn default() -> Self {
        Self {
            velocity_model: String::new(),
            rate: 2,
            vertex_weight_element: 100,
            vertex_weight_dynamic_rupture: 200,
            vertex_weight_free_surface_with_gravity: 300,
            maximum_allowed_time_step: 5000.0,
            max_difference: 1,
            cluster_boundary: ClusterBoundary::Floor,
            node_model: NodeModelKind::Exponential,
            edge_model: EdgeModelKind::ApproximateCommunication,
            offset_type: OffsetType::EdgeWeight,
            imbalance_compute: 1.01,
            imbalance_extra: 1.05,
        }
    }
}

impl LtsWeightsConfig {
    /// Reject values no cycle can work with.
    pub fn validate(&self) -> Result<(), LtsWeightsError> {
        if self.rate < 2 {
            return Err(LtsWeightsError::config(format!(
                "rate must be at least 2, got {}",
                self.rate
            )));
        }
        if self.vertex_weight_element < 1 {
            return Err(LtsWeightsError::config(format!(
                "vertexWeightElement must be positive, got {}",
                self.vertex_weight_element
            )));
        }
        for (name, w) in [
            ("vertexWeightDynamicRupture", self.vertex_weight_dynamic_rupture),
            (
                "vertexWeightFreeSurfaceWithGravity",
                self.vertex_weight_free_surface_with_gravity,
            ),
        ] {
            if w < 0 {
                return Err(LtsWeightsError::config(format!(
                    "{name} must not be negative, got {w}"
                )));
            }
        }
        if !(self.maximum_allowed_time_step > 0.0) || !self.maximum_allowed_time_step.is_finite() {
            return Err(LtsWeightsError::config(format!(
                "maximumAllowedTimeStep must be positive and finite, got {}",
                self.maximum_allowed_time_step
            )));
        }
        for (name, tol) in [
            ("imbalanceCompute", self.imbalance_compute),
            ("imbalanceExtra", self.imbalance_extra),
        ] {
            if !(tol >= 1.0) || !tol.is_finite() {
                return Err(LtsWeightsError::config(format!(
                    "{name} must be a finite value >= 1, got {tol}"
                )));
            }
        }
        Ok(())
    }

    /// Number of balance constraints: one, plus one per nonzero extra cost.
    pub fn number_of_constraints(&self) -> usize {
        1 + usize::from(self.vertex_weight_dynamic_rupture != 0)
            + usize::from(self.vertex_weight_free_surface_with_gravity != 0)
    }
}
