#![allow(dead_code)]
use std::collections::BTreeSet;
use std::thread;

use lts_weights::algs::communicator::RayonComm;
use lts_weights::algs::distributed_graph::DistributedGraph;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Global undirected graph, kept as sorted adjacency sets.
pub struct GlobalGraph {
    pub adj: Vec<BTreeSet<u64>>,
}

impl GlobalGraph {
    pub fn from_edges(n: usize, edges: &[(u64, u64)]) -> Self {
        let mut adj = vec![BTreeSet::new(); n];
        for &(a, b) in edges {
            assert_ne!(a, b, "self loop in test graph");
            adj[a as usize].insert(b);
            adj[b as usize].insert(a);
        }
        Self { adj }
    }

    /// A path through all cells plus `extra` random chords.
    pub fn random(n: usize, extra: usize, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut edges: Vec<(u64, u64)> = (1..n as u64).map(|i| (i - 1, i)).collect();
        for _ in 0..extra {
            let a = rng.gen_range(0..n as u64);
            let b = rng.gen_range(0..n as u64);
            if a != b {
                edges.push((a, b));
            }
        }
        Self::from_edges(n, &edges)
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    /// Even contiguous split over `ranks` ranks.
    pub fn vtxdist(&self, ranks: usize) -> Vec<u64> {
        (0..=ranks).map(|r| (r * self.len() / ranks) as u64).collect()
    }

    /// The slice of the graph owned by `rank`.
    pub fn slice(&self, vtxdist: &[u64], rank: usize) -> DistributedGraph {
        let (lo, hi) = (vtxdist[rank] as usize, vtxdist[rank + 1] as usize);
        let mut xadj = vec![0];
        let mut adjncy = Vec::new();
        for v in lo..hi {
            adjncy.extend(self.adj[v].iter().copied());
            xadj.push(adjncy.len());
        }
        DistributedGraph::new(vtxdist.to_vec(), xadj, adjncy, rank).unwrap()
    }
}

/// Run `f` once per rank of a fresh in-process world and collect the results
/// in rank order.
pub fn spmd<T, F>(ranks: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(RayonComm) -> T + Send + Sync + Clone + 'static,
{
    let handles: Vec<_> = RayonComm::world(ranks)
        .into_iter()
        .map(|comm| {
            let f = f.clone();
            thread::spawn(move || f(comm))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// Random wave speeds spanning a factor of `spread`.
pub fn random_velocities(n: usize, spread: f64, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n).map(|_| 1000.0 * rng.gen_range(1.0..spread)).collect()
}
