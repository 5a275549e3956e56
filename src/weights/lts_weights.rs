//! `LtsWeights`: the staged computation of partitioner weights for LTS.
//!
//! The stages run in a fixed order, one method each:
//!
//! ```text
//! Uninitialized ─compute_time_steps→ TimeStepsComputed ─compute_clusters→ ClustersComputed
//!   ─enforce_maximum_difference→ ClustersStabilized ─compute_weights→ WeightsComputed
//! ```
//!
//! Calling a stage early returns [`LtsWeightsError::PrecedingStageNotComputed`];
//! nothing is run implicitly. A failing stage leaves the previous state and
//! its results untouched. `compute_time_steps` starts a fresh cycle from any
//! state. All stages except `compute_clusters` are collective: their checks
//! are voted on across ranks, so when one rank fails every rank returns an
//! error (the others [`LtsWeightsError::PeerFailed`]) and none is left waiting.

use crate::algs::communicator::{CommTag, Communicator, GhostCommTags, agree_on_failure};
use crate::algs::distributed_graph::DistributedGraph;
use crate::algs::ghost_exchange::{GhostLayer, check_exchange_inputs, exchange_ghost_layer};
use crate::config::LtsWeightsConfig;
use crate::data::cells::CellData;
use crate::lts_error::LtsWeightsError;
use crate::time_stepping::cluster::Clusterer;
use crate::time_stepping::enforce::{EnforcementReport, enforce_maximum_difference};
use crate::time_stepping::timestep::{GlobalTimeStepDetails, collect_global_time_step_details};
use crate::weights::cost_model::{
    CostKind, EdgeModel, EdgeWeightModel, NodeModel, NodeWeightModel, OffsetType,
};

/// Tags of the ghost exchanges run by [`LtsWeights`].
pub const LTS_GHOST_TAGS: GhostCommTags = GhostCommTags::from_base(CommTag::new(0x4C54));

/// Progress of one weight-computation cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Uninitialized,
    TimeStepsComputed,
    ClustersComputed,
    ClustersStabilized,
    WeightsComputed,
}

/// Arrays handed to the partitioner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Weights {
    /// `ncon` entries per local cell, row-major.
    pub vertex: Vec<i64>,
    /// One entry per adjacency entry.
    pub edge: Vec<i64>,
    /// One tolerance per constraint.
    pub imbalances: Vec<f64>,
    /// Compute cost per cell (first constraint before message terms).
    pub cell_costs: Vec<i64>,
}

#[derive(Debug)]
pub struct LtsWeights<'c, C: Communicator> {
    config: LtsWeightsConfig,
    clusterer: Clusterer,
    ncon: usize,
    comm: &'c C,
    stage: Stage,
    details: Option<GlobalTimeStepDetails>,
    cluster_ids: Vec<u32>,
    max_cluster_id: u32,
    report: Option<EnforcementReport>,
    weights: Weights,
}

impl<'c, C: Communicator> LtsWeights<'c, C> {
    /// Validate `config`; no mesh data is touched.
    pub fn new(config: LtsWeightsConfig, comm: &'c C) -> Result<Self, LtsWeightsError> {
        config.validate()?;
        let clusterer = Clusterer::new(config.rate, config.cluster_boundary)?;
        let ncon = config.number_of_constraints();
        log::debug!(
            "LTS weights: velocity model `{}`, rate {}, {ncon} constraints, {:?} edges",
            config.velocity_model,
            config.rate,
            config.offset_type
        );
        Ok(Self {
            config,
            clusterer,
            ncon,
            comm,
            stage: Stage::Uninitialized,
            details: None,
            cluster_ids: Vec::new(),
            max_cluster_id: 0,
            report: None,
            weights: Weights::default(),
        })
    }

    fn require(&self, required: Stage) -> Result<(), LtsWeightsError> {
        if self.stage >= required {
            Ok(())
        } else {
            Err(LtsWeightsError::PrecedingStageNotComputed {
                required,
                current: self.stage,
            })
        }
    }

    /// Stage 1 (collective): per-cell time steps and their global extremes.
    pub fn compute_time_steps(&mut self, cells: &CellData) -> Result<(), LtsWeightsError> {
        let details = collect_global_time_step_details(
            cells,
            self.config.maximum_allowed_time_step,
            self.comm,
        )?;
        self.details = Some(details);
        self.cluster_ids.clear();
        self.max_cluster_id = 0;
        self.report = None;
        self.weights = Weights::default();
        self.stage = Stage::TimeStepsComputed;
        Ok(())
    }

    /// Stage 2 (local): bucket every cell into its cluster.
    pub fn compute_clusters(&mut self) -> Result<(), LtsWeightsError> {
        self.require(Stage::TimeStepsComputed)?;
        let Some(details) = self.details.as_ref() else {
            return Err(LtsWeightsError::PrecedingStageNotComputed {
                required: Stage::TimeStepsComputed,
                current: self.stage,
            });
        };
        let ids = self.clusterer.compute_cluster_ids(details)?;
        self.max_cluster_id = self.clusterer.max_cluster_id(details);
        self.cluster_ids = ids;
        self.report = None;
        self.weights = Weights::default();
        self.stage = Stage::ClustersComputed;
        Ok(())
    }

    /// Stage 3 (collective): promote cells until adjacent clusters differ by
    /// at most `max_difference`.
    pub fn enforce_maximum_difference(
        &mut self,
        graph: &DistributedGraph,
    ) -> Result<EnforcementReport, LtsWeightsError> {
        let ready = self.require(Stage::ClustersComputed).and_then(|()| {
            if self.stage > Stage::ClustersComputed {
                return Err(LtsWeightsError::config(
                    "clusters already stabilized; start a new cycle with compute_time_steps",
                ));
            }
            Ok(())
        });
        agree_on_failure(self.comm, ready, || LtsWeightsError::PeerFailed {
            stage: "enforce_maximum_difference",
        })?;
        let mut ids = self.cluster_ids.clone();
        let report = enforce_maximum_difference(
            graph,
            &mut ids,
            self.config.max_difference,
            self.max_cluster_id,
            self.comm,
            LTS_GHOST_TAGS,
        )?;
        self.cluster_ids = ids;
        self.report = Some(report);
        self.stage = Stage::ClustersStabilized;
        Ok(report)
    }

    /// Stage 4 (collective): weights from the configured cost models.
    pub fn compute_weights(
        &mut self,
        graph: &DistributedGraph,
        cells: &CellData,
    ) -> Result<(), LtsWeightsError> {
        let node = NodeModel::from_config(&self.config);
        let edge = EdgeModel::from_config(&self.config, self.max_cluster_id);
        self.compute_weights_with(graph, cells, &node, &edge)
    }

    /// Stage 4 (collective) with caller-supplied cost models.
    pub fn compute_weights_with<N, E>(
        &mut self,
        graph: &DistributedGraph,
        cells: &CellData,
        node_model: &N,
        edge_model: &E,
    ) -> Result<(), LtsWeightsError>
    where
        N: NodeWeightModel + ?Sized,
        E: EdgeWeightModel + ?Sized,
    {
        let peer_failed = || LtsWeightsError::PeerFailed {
            stage: "compute_weights",
        };
        agree_on_failure(self.comm, self.check_weight_inputs(graph, cells), peer_failed)?;

        let local = exchange_ghost_layer(graph, &self.cluster_ids, self.comm, LTS_GHOST_TAGS)
            .and_then(|ghosts| self.assemble_weights(graph, cells, &ghosts, node_model, edge_model));
        let weights = agree_on_failure(self.comm, local, peer_failed)?;

        log::info!(
            "rank {}: weights for {} cells, {} edges, {} constraints",
            self.comm.rank(),
            self.cluster_ids.len(),
            weights.edge.len(),
            self.ncon
        );
        self.weights = weights;
        self.stage = Stage::WeightsComputed;
        Ok(())
    }

    fn check_weight_inputs(
        &self,
        graph: &DistributedGraph,
        cells: &CellData,
    ) -> Result<(), LtsWeightsError> {
        self.require(Stage::ClustersStabilized)?;
        if self.stage == Stage::WeightsComputed {
            return Err(LtsWeightsError::config(
                "weights already computed; start a new cycle with compute_time_steps",
            ));
        }
        let n = self.cluster_ids.len();
        for (what, found) in [("cells", cells.len()), ("graph vertices", graph.n_local())] {
            if found != n {
                return Err(LtsWeightsError::LengthMismatch {
                    what,
                    expected: n,
                    found,
                });
            }
        }
        check_exchange_inputs(graph, &self.cluster_ids, self.comm)
    }

    fn assemble_weights<N, E>(
        &self,
        graph: &DistributedGraph,
        cells: &CellData,
        ghosts: &GhostLayer,
        node_model: &N,
        edge_model: &E,
    ) -> Result<Weights, LtsWeightsError>
    where
        N: NodeWeightModel + ?Sized,
        E: EdgeWeightModel + ?Sized,
    {
        let (mut vertex, cell_costs) = self.build_vertex_weights(cells, node_model)?;
        let mut edge = vec![0i64; graph.edge_count()];
        apply_edge_constraints(
            graph,
            &self.cluster_ids,
            ghosts,
            edge_model,
            self.config.offset_type,
            self.ncon,
            &mut edge,
            &mut vertex,
        )?;
        ensure_positive("vertex", &vertex)?;
        ensure_positive("edge", &edge)?;
        Ok(Weights {
            vertex,
            edge,
            imbalances: self.allowed_imbalances(),
            cell_costs,
        })
    }

    /// Drive all four stages.
    pub fn run_cycle(
        &mut self,
        graph: &DistributedGraph,
        cells: &CellData,
    ) -> Result<&Weights, LtsWeightsError> {
        self.compute_time_steps(cells)?;
        self.compute_clusters()?;
        self.enforce_maximum_difference(graph)?;
        self.compute_weights(graph, cells)?;
        Ok(&self.weights)
    }

    fn build_vertex_weights<N: NodeWeightModel + ?Sized>(
        &self,
        cells: &CellData,
        model: &N,
    ) -> Result<(Vec<i64>, Vec<i64>), LtsWeightsError> {
        let cfg = &self.config;
        let dr_slot = cfg.vertex_weight_dynamic_rupture != 0;
        let fsg_slot = cfg.vertex_weight_free_surface_with_gravity != 0;
        let overflow =
            || LtsWeightsError::PartitionerInputInvalid("vertex weight overflows i64".into());

        let mut vertex = Vec::with_capacity(self.cluster_ids.len() * self.ncon);
        let mut costs = Vec::with_capacity(self.cluster_ids.len());
        for (cell, &cluster) in self.cluster_ids.iter().enumerate() {
            let flags = cells.flags(cell);
            let dr = if flags.dynamic_rupture {
                model.factor(cluster, CostKind::DynamicRupture)?
            } else {
                0
            };
            let fsg = if flags.free_surface_with_gravity {
                model.factor(cluster, CostKind::FreeSurfaceWithGravity)?
            } else {
                0
            };
            let cost = model
                .factor(cluster, CostKind::Element)?
                .checked_add(dr)
                .and_then(|c| c.checked_add(fsg))
                .ok_or_else(overflow)?
                .max(1);
            costs.push(cost);
            vertex.push(cost);
            if dr_slot {
                vertex.push(dr.max(1));
            }
            if fsg_slot {
                vertex.push(fsg.max(1));
            }
        }
        Ok((vertex, costs))
    }

    fn allowed_imbalances(&self) -> Vec<f64> {
        let mut out = vec![self.config.imbalance_extra; self.ncon];
        out[0] = self.config.imbalance_compute;
        out
    }

    fn weights(&self) -> Result<&Weights, LtsWeightsError> {
        self.require(Stage::WeightsComputed)?;
        Ok(&self.weights)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn config(&self) -> &LtsWeightsConfig {
        &self.config
    }

    pub fn velocity_model(&self) -> &str {
        &self.config.velocity_model
    }

    pub fn rate(&self) -> u32 {
        self.config.rate
    }

    /// Constraints per vertex (`ncon`), fixed at construction.
    pub fn n_weights_per_vertex(&self) -> usize {
        self.ncon
    }

    pub fn details(&self) -> Result<&GlobalTimeStepDetails, LtsWeightsError> {
        self.require(Stage::TimeStepsComputed)?;
        self.details
            .as_ref()
            .ok_or(LtsWeightsError::PrecedingStageNotComputed {
                required: Stage::TimeStepsComputed,
                current: self.stage,
            })
    }

    /// Current cluster ids: raw after stage 2, stabilized after stage 3.
    pub fn cluster_ids(&self) -> Result<&[u32], LtsWeightsError> {
        self.require(Stage::ClustersComputed)?;
        Ok(&self.cluster_ids)
    }

    pub fn max_cluster_id(&self) -> Result<u32, LtsWeightsError> {
        self.require(Stage::ClustersComputed)?;
        Ok(self.max_cluster_id)
    }

    pub fn enforcement_report(&self) -> Result<EnforcementReport, LtsWeightsError> {
        self.require(Stage::ClustersStabilized)?;
        self.report.ok_or(LtsWeightsError::PrecedingStageNotComputed {
            required: Stage::ClustersStabilized,
            current: self.stage,
        })
    }

    pub fn vertex_weights(&self) -> Result<&[i64], LtsWeightsError> {
        Ok(&self.weights()?.vertex)
    }

    pub fn edge_weights(&self) -> Result<&[i64], LtsWeightsError> {
        Ok(&self.weights()?.edge)
    }

    pub fn imbalances(&self) -> Result<&[f64], LtsWeightsError> {
        Ok(&self.weights()?.imbalances)
    }

    pub fn cell_costs(&self) -> Result<&[i64], LtsWeightsError> {
        Ok(&self.weights()?.cell_costs)
    }

    pub fn edge_count(&self) -> Result<usize, LtsWeightsError> {
        Ok(self.weights()?.edge.len())
    }

    /// All output arrays at once.
    pub fn output(&self) -> Result<&Weights, LtsWeightsError> {
        self.weights()
    }
}

/// Write edge-model factors according to `offset`.
///
/// `edge_weights` is indexed like `graph.adjncy()`; `vertex_weights` holds
/// `ncon` slots per cell and is only touched for [`OffsetType::BalancedMsg`].
#[allow(clippy::too_many_arguments)]
pub fn apply_edge_constraints<E: EdgeWeightModel + ?Sized>(
    graph: &DistributedGraph,
    cluster_ids: &[u32],
    ghosts: &GhostLayer,
    model: &E,
    offset: OffsetType,
    ncon: usize,
    edge_weights: &mut [i64],
    vertex_weights: &mut [i64],
) -> Result<(), LtsWeightsError> {
    for (cell, &own) in cluster_ids.iter().enumerate() {
        for (j, nbr) in graph.edges_of(cell) {
            let (theirs, crossing) = match graph.local_index(nbr) {
                Some(local) => (cluster_ids[local], false),
                None => (ghosts.lookup(graph, nbr)?, true),
            };
            let factor = model.factor(own, theirs)?;
            edge_weights[j] = match offset {
                OffsetType::MinMsg if !crossing => 1,
                _ => factor,
            };
            if offset == OffsetType::BalancedMsg && crossing {
                let slot = &mut vertex_weights[cell * ncon];
                *slot = slot.checked_add(factor).ok_or_else(|| {
                    LtsWeightsError::PartitionerInputInvalid(
                        format!("message weight of cell {cell} overflows i64").into(),
                    )
                })?;
            }
        }
    }
    Ok(())
}

fn ensure_positive(what: &str, weights: &[i64]) -> Result<(), LtsWeightsError> {
    match weights.iter().position(|&w| w < 1) {
        None => Ok(()),
        Some(i) => Err(LtsWeightsError::PartitionerInputInvalid(
            format!("{what} weight {i} is {} (must be positive)", weights[i]).into(),
        )),
    }
}
