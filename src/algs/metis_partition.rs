//! Hand-off of computed weights to a (Par)METIS-style partitioner.
//!
//! The partitioner itself is not called here; this module only converts the
//! arrays into the partitioner's index (`Idx`) and real (`Real`) types.

use crate::algs::distributed_graph::DistributedGraph;
use crate::lts_error::LtsWeightsError;
use crate::weights::lts_weights::Weights;

#[cfg(feature = "metis-support")]
pub use metis::{Idx, Real};
#[cfg(not(feature = "metis-support"))]
pub type Idx = i32;
#[cfg(not(feature = "metis-support"))]
pub type Real = f32;

/// Everything a ParMETIS `PartKway` call takes from one rank.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionerInput {
    pub vtxdist: Vec<Idx>,
    pub xadj: Vec<Idx>,
    pub adjncy: Vec<Idx>,
    /// `ncon` weights per vertex, row-major.
    pub vwgt: Vec<Idx>,
    pub adjwgt: Vec<Idx>,
    pub ncon: Idx,
    pub ubvec: Vec<Real>,
}

fn to_idx<T>(what: &'static str, values: impl IntoIterator<Item = T>) -> Result<Vec<Idx>, LtsWeightsError>
where
    Idx: TryFrom<T>,
    T: Copy + std::fmt::Display,
{
    values
        .into_iter()
        .map(|v| {
            Idx::try_from(v).map_err(|_| {
                LtsWeightsError::PartitionerInputInvalid(
                    format!("{what} value {v} does not fit the partitioner index type").into(),
                )
            })
        })
        .collect()
}

impl PartitionerInput {
    /// Convert one rank's graph and weights.
    pub fn new(graph: &DistributedGraph, weights: &Weights, ncon: usize) -> Result<Self, LtsWeightsError> {
        if weights.vertex.len() != graph.n_local() * ncon {
            return Err(LtsWeightsError::LengthMismatch {
                what: "vertex weights",
                expected: graph.n_local() * ncon,
                found: weights.vertex.len(),
            });
        }
        if weights.edge.len() != graph.edge_count() {
            return Err(LtsWeightsError::LengthMismatch {
                what: "edge weights",
                expected: graph.edge_count(),
                found: weights.edge.len(),
            });
        }
        if let Some(w) = weights.vertex.iter().chain(&weights.edge).find(|&&w| w < 1) {
            return Err(LtsWeightsError::PartitionerInputInvalid(
                format!("weight {w} is not positive").into(),
            ));
        }
        Ok(Self {
            vtxdist: to_idx("vtxdist", graph.vtxdist().iter().copied())?,
            xadj: to_idx("xadj", graph.xadj().iter().map(|&x| x as u64))?,
            adjncy: to_idx("adjncy", graph.adjncy().iter().copied())?,
            vwgt: to_idx("vwgt", weights.vertex.iter().copied())?,
            adjwgt: to_idx("adjwgt", weights.edge.iter().copied())?,
            ncon: to_idx("ncon", [ncon as u64])?[0],
            ubvec: weights.imbalances.iter().map(|&u| u as Real).collect(),
        })
    }

    /// Partition a single-rank graph with serial METIS k-way.
    #[cfg(feature = "metis-support")]
    pub fn metis_partition(&self, nparts: Idx) -> Result<Vec<Idx>, LtsWeightsError> {
        let fail = |e: &dyn std::fmt::Display| {
            LtsWeightsError::PartitionerInputInvalid(format!("METIS: {e}").into())
        };
        if self.vtxdist.len() != 2 {
            return Err(LtsWeightsError::PartitionerInputInvalid(
                "serial METIS needs a graph held by one rank".into(),
            ));
        }
        let mut part = vec![0; self.xadj.len() - 1];
        metis::Graph::new(self.ncon, nparts, &self.xadj, &self.adjncy)
            .map_err(|e| fail(&e))?
            .set_vwgt(&self.vwgt)
            .set_adjwgt(&self.adjwgt)
            .set_ubvec(&self.ubvec)
            .part_kway(&mut part)
            .map_err(|e| fail(&e))?;
        Ok(part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> DistributedGraph {
        DistributedGraph::new(vec![0, 2], vec![0, 1, 2], vec![1, 0], 0).unwrap()
    }

    #[test]
    fn converts_to_index_types() {
        let w = Weights {
            vertex: vec![400, 200, 100, 1],
            edge: vec![2, 2],
            imbalances: vec![1.01, 1.05],
            cell_costs: vec![400, 100],
        };
        let input = PartitionerInput::new(&pair(), &w, 2).unwrap();
        assert_eq!(input.xadj, vec![0, 1, 2]);
        assert_eq!(input.vwgt, vec![400, 200, 100, 1]);
        assert_eq!(input.ncon, 2);
        assert_eq!(input.ubvec.len(), 2);
    }

    #[test]
    fn oversized_or_zero_weights_are_rejected() {
        let mut w = Weights {
            vertex: vec![i64::MAX, 1],
            edge: vec![1, 1],
            imbalances: vec![1.01],
            cell_costs: vec![],
        };
        assert!(matches!(
            PartitionerInput::new(&pair(), &w, 1),
            Err(LtsWeightsError::PartitionerInputInvalid(_))
        ));
        w.vertex = vec![0, 1];
        assert!(PartitionerInput::new(&pair(), &w, 1).is_err());
    }
}
