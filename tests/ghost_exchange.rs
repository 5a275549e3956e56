//! Ghost-layer exchange over in-process worlds.

mod util;

use lts_weights::algs::communicator::GhostCommTags;
use lts_weights::prelude::*;
use util::{GlobalGraph, spmd};

const TAGS: GhostCommTags = GhostCommTags::from_base(CommTag::new(0x0900));

#[test]
fn ring_of_three_ranks_sees_both_neighbours() {
    // Six cells in a ring, two per rank; cluster id = 10 * global id.
    let edges: Vec<(u64, u64)> = (0..6).map(|i| (i, (i + 1) % 6)).collect();
    let global = GlobalGraph::from_edges(6, &edges);
    let vtxdist = global.vtxdist(3);
    let slices = std::sync::Arc::new((0..3).map(|r| global.slice(&vtxdist, r)).collect::<Vec<_>>());

    let layers = spmd(3, move |comm| {
        let g = &slices[comm.rank()];
        let ids: Vec<u32> = (0..g.n_local()).map(|i| 10 * g.global_id(i) as u32).collect();
        let ghosts = exchange_ghost_layer(g, &ids, &comm, TAGS).unwrap();
        let mut seen: Vec<_> = ghosts.iter().collect();
        seen.sort();
        seen
    });

    assert_eq!(layers[0], vec![(1, 2, 20), (2, 5, 50)]);
    assert_eq!(layers[1], vec![(0, 1, 10), (2, 4, 40)]);
    assert_eq!(layers[2], vec![(0, 0, 0), (1, 3, 30)]);
}

#[test]
fn repeated_rounds_reuse_the_same_tags() {
    let global = GlobalGraph::random(30, 20, 9);
    let vtxdist = global.vtxdist(3);
    let slices = std::sync::Arc::new((0..3).map(|r| global.slice(&vtxdist, r)).collect::<Vec<_>>());

    let ok = spmd(3, move |comm| {
        let g = &slices[comm.rank()];
        (0..5u32).all(|round| {
            let ids: Vec<u32> = (0..g.n_local())
                .map(|i| round + g.global_id(i) as u32)
                .collect();
            let ghosts = exchange_ghost_layer(g, &ids, &comm, TAGS).unwrap();
            ghosts
                .iter()
                .all(|(_, cell, cluster)| cluster == round + cell as u32)
        })
    });
    assert!(ok.into_iter().all(|b| b));
}
