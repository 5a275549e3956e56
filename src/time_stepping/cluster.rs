//! Bucketing of time steps into multi-rate LTS clusters.
//!
//! Cluster `k` covers time steps in `[min * rate^k, min * rate^(k+1))`. The
//! ladder is walked by repeated multiplication so that a step lying exactly
//! on a boundary is classified the same way on every rank and platform.

use serde::{Deserialize, Serialize};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::lts_error::LtsWeightsError;
use crate::time_stepping::timestep::GlobalTimeStepDetails;

/// How a step exactly equal to `min * rate^k` is classified.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClusterBoundary {
    /// Pure floor of the logarithm: the boundary belongs to cluster `k`.
    #[default]
    Floor,
    /// The cell enters cluster `k` only when strictly above the boundary.
    StrictlyAbove,
}

/// Assigns cluster ids for a fixed rate and boundary policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Clusterer {
    rate: u32,
    boundary: ClusterBoundary,
}

impl Clusterer {
    pub fn new(rate: u32, boundary: ClusterBoundary) -> Result<Self, LtsWeightsError> {
        if rate < 2 {
            return Err(LtsWeightsError::config(format!(
                "LTS rate must be at least 2, got {rate}"
            )));
        }
        Ok(Self { rate, boundary })
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Cluster of `time_step` relative to `global_min`, never negative.
    pub fn cluster_of(&self, time_step: f64, global_min: f64) -> u32 {
        let rate = f64::from(self.rate);
        let mut upper = global_min * rate;
        let mut cluster = 0u32;
        let inside = |upper: f64| match self.boundary {
            ClusterBoundary::Floor => upper <= time_step,
            ClusterBoundary::StrictlyAbove => upper < time_step,
        };
        while upper.is_finite() && inside(upper) {
            upper *= rate;
            cluster += 1;
        }
        cluster
    }

    /// Largest cluster id any cell can take for these extremes.
    pub fn max_cluster_id(&self, details: &GlobalTimeStepDetails) -> u32 {
        self.cluster_of(details.global_max_time_step, details.global_min_time_step)
    }

    /// Cluster id of every local cell, clamped to `[0, max_cluster_id]`.
    pub fn compute_cluster_ids(
        &self,
        details: &GlobalTimeStepDetails,
    ) -> Result<Vec<u32>, LtsWeightsError> {
        let min = details.global_min_time_step;
        if !(min > 0.0) || !min.is_finite() {
            return Err(LtsWeightsError::physical(
                None,
                format!("global minimum time step must be positive, got {min}"),
            ));
        }
        let max_id = self.max_cluster_id(details);
        let assign = |&dt: &f64| self.cluster_of(dt, min).min(max_id);

        #[cfg(feature = "rayon")]
        let ids: Vec<u32> = details.time_steps.par_iter().map(assign).collect();
        #[cfg(not(feature = "rayon"))]
        let ids: Vec<u32> = details.time_steps.iter().map(assign).collect();

        log::debug!("{} cells clustered, max cluster id {max_id}", ids.len());
        Ok(ids)
    }
}
