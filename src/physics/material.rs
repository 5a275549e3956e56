//! Isotropic elastic material parameters and derived wave speeds.

use serde::{Deserialize, Serialize};

use crate::lts_error::LtsWeightsError;

/// Density and Lamé parameters of an isotropic elastic cell.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElasticMaterial {
    pub rho: f64,
    pub mu: f64,
    pub lambda: f64,
}

impl ElasticMaterial {
    pub fn new(rho: f64, mu: f64, lambda: f64) -> Self {
        Self { rho, mu, lambda }
    }

    /// P-wave speed `sqrt((lambda + 2 mu) / rho)`.
    pub fn p_wave_velocity(&self) -> Result<f64, LtsWeightsError> {
        let modulus = self.lambda + 2.0 * self.mu;
        if !(self.rho > 0.0) || !(modulus > 0.0) {
            return Err(LtsWeightsError::physical(
                None,
                format!(
                    "material rho={} lambda+2mu={modulus} has no real P-wave speed",
                    self.rho
                ),
            ));
        }
        Ok((modulus / self.rho).sqrt())
    }

    /// S-wave speed `sqrt(mu / rho)`; zero in fluids.
    pub fn s_wave_velocity(&self) -> Result<f64, LtsWeightsError> {
        if !(self.rho > 0.0) || self.mu < 0.0 {
            return Err(LtsWeightsError::physical(
                None,
                format!("material rho={} mu={} is unphysical", self.rho, self.mu),
            ));
        }
        Ok((self.mu / self.rho).sqrt())
    }
}

/// P-wave speed of every cell.
pub fn p_wave_velocities(materials: &[ElasticMaterial]) -> Result<Vec<f64>, LtsWeightsError> {
    materials
        .iter()
        .enumerate()
        .map(|(cell, m)| {
            m.p_wave_velocity().map_err(|e| match e {
                LtsWeightsError::InvalidPhysicalParameter { reason, .. } => {
                    LtsWeightsError::InvalidPhysicalParameter {
                        cell: Some(cell),
                        reason,
                    }
                }
                other => other,
            })
        })
        .collect()
}
