//! End-to-end weight cycles on in-process multi-rank worlds.

mod util;

use lts_weights::prelude::*;
use lts_weights::weights::cost_model::{EdgeModelKind, NodeModelKind};
use util::{GlobalGraph, random_velocities, spmd};

fn base_config() -> LtsWeightsConfig {
    LtsWeightsConfig {
        velocity_model: "test".into(),
        maximum_allowed_time_step: 1.0,
        ..Default::default()
    }
}

/// Per-rank result of one full cycle.
#[derive(Debug, Clone)]
struct RankOutput {
    cluster_ids: Vec<u32>,
    weights: Weights,
    report: EnforcementReport,
}

fn run_distributed(
    global: &GlobalGraph,
    velocities: &[f64],
    ranks: usize,
    cfg: LtsWeightsConfig,
) -> Vec<RankOutput> {
    let vtxdist = global.vtxdist(ranks);
    let slices: Vec<_> = (0..ranks)
        .map(|r| {
            let g = global.slice(&vtxdist, r);
            let lo = vtxdist[r] as usize;
            let hi = vtxdist[r + 1] as usize;
            (g, CellData::interior(velocities[lo..hi].to_vec(), 1.0))
        })
        .collect();
    let slices = std::sync::Arc::new(slices);
    spmd(ranks, move |comm| {
        let (graph, cells) = &slices[comm.rank()];
        let mut lts = LtsWeights::new(cfg.clone(), &comm).unwrap();
        let weights = lts.run_cycle(graph, cells).unwrap().clone();
        RankOutput {
            cluster_ids: lts.cluster_ids().unwrap().to_vec(),
            weights,
            report: lts.enforcement_report().unwrap(),
        }
    })
}

fn concat<T: Clone>(parts: impl IntoIterator<Item = Vec<T>>) -> Vec<T> {
    parts.into_iter().flatten().collect()
}

#[test]
fn gap_across_rank_boundary_is_closed_in_one_round() {
    // Rank 0 owns a fast cell, rank 1 a cell eight times slower.
    let global = GlobalGraph::from_edges(2, &[(0, 1)]);
    let out = run_distributed(&global, &[512.0, 64.0], 2, base_config());

    assert_eq!(out[0].cluster_ids, vec![2]);
    assert_eq!(out[1].cluster_ids, vec![3]);
    for o in &out {
        assert_eq!(o.report.rounds, 1);
    }
    assert_eq!(out[0].report.promotions, 1);
    assert_eq!(out[1].report.promotions, 0);

    // ncon 3, no special faces: extra slots stay at 1.
    assert_eq!(out[0].weights.vertex, vec![400, 1, 1]);
    assert_eq!(out[1].weights.vertex, vec![800, 1, 1]);
    // max cluster 3, faster endpoint 2
    assert_eq!(out[0].weights.edge, vec![2]);
    assert_eq!(out[1].weights.edge, vec![2]);
}

#[test]
fn balanced_messages_add_to_compute_constraint() {
    let global = GlobalGraph::from_edges(3, &[(0, 1), (1, 2)]);
    let cfg = LtsWeightsConfig {
        offset_type: OffsetType::BalancedMsg,
        vertex_weight_dynamic_rupture: 0,
        vertex_weight_free_surface_with_gravity: 0,
        ..base_config()
    };
    // Clusters 0, 1, 1 with vtxdist [0, 1, 3].
    let out = run_distributed(&global, &[256.0, 128.0, 128.0], 2, cfg);

    assert_eq!(out[0].cluster_ids, vec![0]);
    assert_eq!(out[1].cluster_ids, vec![1, 1]);
    // Only edge 0-1 crosses ranks; its factor is 2^(1-0).
    assert_eq!(out[0].weights.vertex, vec![100 + 2]);
    assert_eq!(out[1].weights.vertex, vec![200 + 2, 200]);
    assert_eq!(out[0].weights.cell_costs, vec![100]);
    assert_eq!(out[1].weights.cell_costs, vec![200, 200]);
    assert_eq!(out[1].weights.edge, vec![2, 1, 1]);
}

#[test]
fn min_msg_only_prices_rank_crossing_edges() {
    let global = GlobalGraph::from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
    let cfg = LtsWeightsConfig {
        offset_type: OffsetType::MinMsg,
        ..base_config()
    };
    let out = run_distributed(&global, &[1024.0, 512.0, 512.0, 256.0], 2, cfg);
    // Clusters 0, 1, 1, 2 => max 2; edge 1-2 crosses ranks, faster side 1.
    assert_eq!(concat(out.iter().map(|o| o.cluster_ids.clone())), vec![0, 1, 1, 2]);
    assert_eq!(out[0].weights.edge, vec![1, 1, 2]);
    assert_eq!(out[1].weights.edge, vec![2, 1, 1]);
}

#[test]
fn result_does_not_depend_on_the_number_of_ranks() {
    for seed in 0..6u64 {
        let n = 60;
        let global = GlobalGraph::random(n, 40, seed);
        let velocities = random_velocities(n, 40.0, seed + 100);
        let cfg = LtsWeightsConfig {
            rate: 2 + (seed % 2) as u32,
            ..base_config()
        };

        let serial = run_distributed(&global, &velocities, 1, cfg.clone());
        for ranks in [2, 3, 5] {
            let parallel = run_distributed(&global, &velocities, ranks, cfg.clone());
            assert_eq!(
                concat(parallel.iter().map(|o| o.cluster_ids.clone())),
                serial[0].cluster_ids,
                "cluster ids, seed {seed}, {ranks} ranks"
            );
            assert_eq!(
                concat(parallel.iter().map(|o| o.weights.vertex.clone())),
                serial[0].weights.vertex,
                "vertex weights, seed {seed}, {ranks} ranks"
            );
            assert_eq!(
                concat(parallel.iter().map(|o| o.weights.edge.clone())),
                serial[0].weights.edge,
                "edge weights, seed {seed}, {ranks} ranks"
            );
            for o in &parallel {
                assert_eq!(o.report.rounds, serial[0].report.rounds);
            }
        }
    }
}

#[test]
fn stabilized_clusters_respect_the_gap_everywhere() {
    for (seed, max_difference) in [(1u64, 1u32), (2, 2), (3, 1)] {
        let n = 80;
        let global = GlobalGraph::random(n, 60, seed);
        let velocities = random_velocities(n, 100.0, seed);
        let cfg = LtsWeightsConfig {
            max_difference,
            node_model: NodeModelKind::ExponentialBalanced,
            edge_model: EdgeModelKind::ApproximateCommunication,
            ..base_config()
        };
        let out = run_distributed(&global, &velocities, 4, cfg.clone());
        let ids = concat(out.iter().map(|o| o.cluster_ids.clone()));

        // Promotion only: nothing drops below its raw cluster.
        let raw = {
            let mut lts = LtsWeights::new(cfg, &NoComm).unwrap();
            lts.compute_time_steps(&CellData::interior(velocities.clone(), 1.0))
                .unwrap();
            lts.compute_clusters().unwrap();
            lts.cluster_ids().unwrap().to_vec()
        };
        for (cell, nbrs) in global.adj.iter().enumerate() {
            assert!(ids[cell] >= raw[cell]);
            for &nbr in nbrs {
                let gap = ids[cell].abs_diff(ids[nbr as usize]);
                assert!(gap <= max_difference, "cells {cell}-{nbr} differ by {gap}");
            }
        }
        for o in &out {
            assert!(o.weights.vertex.iter().all(|&w| w >= 1));
            assert!(o.weights.edge.iter().all(|&w| w >= 1));
            assert_eq!(o.weights.imbalances, vec![1.01, 1.05, 1.05]);
        }
    }
}

#[test]
fn a_rank_without_cells_takes_part() {
    // vtxdist [0, 0, 2]: rank 0 is empty.
    let global = GlobalGraph::from_edges(2, &[(0, 1)]);
    let slices = std::sync::Arc::new(vec![
        DistributedGraph::new(vec![0, 0, 2], vec![0], vec![], 0).unwrap(),
        global.slice(&[0, 0, 2], 1),
    ]);
    let out = spmd(2, move |comm| {
        let graph = &slices[comm.rank()];
        let cells = if comm.rank() == 0 {
            CellData::interior(vec![], 1.0)
        } else {
            CellData::interior(vec![1000.0, 2000.0], 1.0)
        };
        let mut lts = LtsWeights::new(base_config(), &comm).unwrap();
        lts.run_cycle(graph, &cells).unwrap();
        (
            lts.cluster_ids().unwrap().to_vec(),
            lts.details().unwrap().global_min_time_step,
        )
    });
    assert_eq!(out[0].0, Vec::<u32>::new());
    assert_eq!(out[1].0, vec![1, 0]);
    assert_eq!(out[0].1, out[1].1);
}

#[test]
fn invalid_cell_on_one_rank_fails_every_rank() {
    let global = GlobalGraph::from_edges(2, &[(0, 1)]);
    let vtxdist = global.vtxdist(2);
    let slices = std::sync::Arc::new((0..2).map(|r| global.slice(&vtxdist, r)).collect::<Vec<_>>());
    let out = spmd(2, move |comm| {
        let v = if comm.rank() == 1 { -5.0 } else { 1000.0 };
        let mut lts = LtsWeights::new(base_config(), &comm).unwrap();
        let err = lts
            .run_cycle(&slices[comm.rank()], &CellData::interior(vec![v], 1.0))
            .unwrap_err();
        (err, lts.stage())
    });
    assert!(matches!(
        out[1].0,
        LtsWeightsError::InvalidPhysicalParameter { cell: Some(0), .. }
    ));
    assert!(matches!(
        out[0].0,
        LtsWeightsError::InvalidPhysicalParameter { cell: None, .. }
    ));
    assert!(out.iter().all(|(_, s)| *s == Stage::Uninitialized));
}

#[test]
fn mismatched_cells_on_one_rank_fail_every_rank() {
    let global = GlobalGraph::from_edges(2, &[(0, 1)]);
    let vtxdist = global.vtxdist(2);
    let slices = std::sync::Arc::new((0..2).map(|r| global.slice(&vtxdist, r)).collect::<Vec<_>>());
    let out = spmd(2, move |comm| {
        let graph = &slices[comm.rank()];
        let cells = CellData::interior(vec![1000.0], 1.0);
        let mut lts = LtsWeights::new(base_config(), &comm).unwrap();
        lts.compute_time_steps(&cells).unwrap();
        lts.compute_clusters().unwrap();
        lts.enforce_maximum_difference(graph).unwrap();
        // Rank 1 hands in two cells for its one-vertex slice.
        let weights_cells = if comm.rank() == 1 {
            CellData::interior(vec![1000.0, 1000.0], 1.0)
        } else {
            cells
        };
        let err = lts.compute_weights(graph, &weights_cells).unwrap_err();
        (err, lts.stage())
    });
    assert_eq!(
        out[0].0,
        LtsWeightsError::PeerFailed {
            stage: "compute_weights"
        }
    );
    assert_eq!(
        out[1].0,
        LtsWeightsError::LengthMismatch {
            what: "cells",
            expected: 1,
            found: 2
        }
    );
    assert!(out.iter().all(|(_, s)| *s == Stage::ClustersStabilized));
}

#[test]
fn wrong_graph_slice_on_one_rank_fails_enforcement_everywhere() {
    let global = GlobalGraph::from_edges(2, &[(0, 1)]);
    let vtxdist = global.vtxdist(2);
    let slices = std::sync::Arc::new((0..2).map(|r| global.slice(&vtxdist, r)).collect::<Vec<_>>());
    let out = spmd(2, move |comm| {
        // Both ranks pass rank 0's slice.
        let graph = &slices[0];
        let cells = CellData::interior(vec![1000.0], 1.0);
        let mut lts = LtsWeights::new(base_config(), &comm).unwrap();
        lts.compute_time_steps(&cells).unwrap();
        lts.compute_clusters().unwrap();
        let err = lts.enforce_maximum_difference(graph).unwrap_err();
        (err, lts.stage())
    });
    assert_eq!(
        out[0].0,
        LtsWeightsError::PeerFailed {
            stage: "enforce_maximum_difference"
        }
    );
    assert!(matches!(out[1].0, LtsWeightsError::InvalidGraph(_)));
    assert!(out.iter().all(|(_, s)| *s == Stage::ClustersComputed));
}
