//! The distributed dual graph of a partitioned mesh, as handed to ParMETIS.
//
// Each *cell* is a vertex; an undirected edge links two cells that share a face.
// The graph arrives in ParMETIS-ready triples:
//
// * `vtxdist[r] .. vtxdist[r+1]` = global ids owned by rank *r*
// * `xadj[i] .. xadj[i+1]`       = neighbour list of local cell *i*
// * `adjncy`                     = concatenated neighbour *global* ids
//
// The graph must be symmetric across ranks (if `a` lists `b`, then `b` lists
// `a`) and self-free. Symmetry cannot be checked locally; the ghost exchange
// reports it as an incomplete exchange when it is violated across ranks.

use std::collections::{BTreeMap, BTreeSet};

use num_traits::ToPrimitive;

use crate::lts_error::LtsWeightsError;

/// Validated view of one rank's slice of the distributed graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedGraph {
    vtxdist: Vec<u64>,
    xadj: Vec<usize>,
    adjncy: Vec<u64>,
    rank: usize,
}

impl DistributedGraph {
    /// Build and validate the local slice owned by `rank`.
    pub fn new(
        vtxdist: Vec<u64>,
        xadj: Vec<usize>,
        adjncy: Vec<u64>,
        rank: usize,
    ) -> Result<Self, LtsWeightsError> {
        let invalid = |msg: String| LtsWeightsError::InvalidGraph(msg.into());

        if vtxdist.len() < 2 {
            return Err(invalid(format!(
                "vtxdist needs at least 2 entries, found {}",
                vtxdist.len()
            )));
        }
        if rank + 1 >= vtxdist.len() {
            return Err(invalid(format!(
                "rank {rank} outside vtxdist of {} ranks",
                vtxdist.len() - 1
            )));
        }
        if vtxdist.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid("vtxdist must be non-decreasing".to_string()));
        }

        let n_local = (vtxdist[rank + 1] - vtxdist[rank]) as usize;
        if xadj.len() != n_local + 1 {
            return Err(LtsWeightsError::LengthMismatch {
                what: "xadj",
                expected: n_local + 1,
                found: xadj.len(),
            });
        }
        if xadj[0] != 0 || xadj.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid(
                "xadj must start at 0 and be non-decreasing".to_string(),
            ));
        }
        if xadj[n_local] != adjncy.len() {
            return Err(LtsWeightsError::LengthMismatch {
                what: "adjncy",
                expected: xadj[n_local],
                found: adjncy.len(),
            });
        }

        let n_global = vtxdist[vtxdist.len() - 1];
        let first = vtxdist[rank];
        for (cell, w) in xadj.windows(2).enumerate() {
            for &nbr in &adjncy[w[0]..w[1]] {
                if nbr >= n_global {
                    return Err(invalid(format!(
                        "cell {cell} references global id {nbr}, but only {n_global} exist"
                    )));
                }
                if nbr == first + cell as u64 {
                    return Err(invalid(format!("cell {cell} has a self loop")));
                }
            }
        }

        Ok(Self {
            vtxdist,
            xadj,
            adjncy,
            rank,
        })
    }

    /// Convert partitioner index arrays (e.g. `idx_t`) into a graph.
    pub fn from_parmetis<I: ToPrimitive + Copy>(
        vtxdist: &[I],
        xadj: &[I],
        adjncy: &[I],
        rank: usize,
    ) -> Result<Self, LtsWeightsError> {
        fn convert<I: ToPrimitive + Copy, T>(
            what: &'static str,
            src: &[I],
            f: impl Fn(I) -> Option<T>,
        ) -> Result<Vec<T>, LtsWeightsError> {
            src.iter()
                .map(|&v| {
                    f(v).ok_or_else(|| {
                        LtsWeightsError::InvalidGraph(
                            format!("{what} holds a negative or oversized index").into(),
                        )
                    })
                })
                .collect()
        }
        Self::new(
            convert("vtxdist", vtxdist, |v| v.to_u64())?,
            convert("xadj", xadj, |v| v.to_usize())?,
            convert("adjncy", adjncy, |v| v.to_u64())?,
            rank,
        )
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn n_ranks(&self) -> usize {
        self.vtxdist.len() - 1
    }

    /// Number of cells owned by this rank.
    pub fn n_local(&self) -> usize {
        self.xadj.len() - 1
    }

    /// Number of adjacency entries (directed edges) on this rank.
    pub fn edge_count(&self) -> usize {
        self.adjncy.len()
    }

    pub fn vtxdist(&self) -> &[u64] {
        &self.vtxdist
    }
    pub fn xadj(&self) -> &[usize] {
        &self.xadj
    }
    pub fn adjncy(&self) -> &[u64] {
        &self.adjncy
    }

    #[inline]
    pub fn global_id(&self, local: usize) -> u64 {
        self.vtxdist[self.rank] + local as u64
    }

    /// Local index of `global` if this rank owns it.
    #[inline]
    pub fn local_index(&self, global: u64) -> Option<usize> {
        let (lo, hi) = (self.vtxdist[self.rank], self.vtxdist[self.rank + 1]);
        (lo..hi).contains(&global).then(|| (global - lo) as usize)
    }

    /// Rank owning `global`.
    pub fn owner_of(&self, global: u64) -> Result<usize, LtsWeightsError> {
        if global >= self.vtxdist[self.vtxdist.len() - 1] {
            return Err(LtsWeightsError::InvalidGraph(
                format!("global id {global} is not owned by any rank").into(),
            ));
        }
        // Empty ranks share their start with the next rank; the last match wins.
        Ok(self.vtxdist.partition_point(|&start| start <= global) - 1)
    }

    /// Global ids adjacent to local cell `local`.
    #[inline]
    pub fn neighbors(&self, local: usize) -> &[u64] {
        &self.adjncy[self.xadj[local]..self.xadj[local + 1]]
    }

    /// `(edge index, neighbour global id)` for every edge of `local`.
    pub fn edges_of(&self, local: usize) -> impl Iterator<Item = (usize, u64)> + '_ {
        let start = self.xadj[local];
        self.neighbors(local)
            .iter()
            .enumerate()
            .map(move |(k, &g)| (start + k, g))
    }

    /// For every other rank we share an edge with: the local cells adjacent to
    /// it (sorted, deduplicated) and the remote cells we expect to hear about.
    pub fn boundary(&self) -> Result<BTreeMap<usize, BoundaryLinks>, LtsWeightsError> {
        let mut out: BTreeMap<usize, (BTreeSet<usize>, BTreeSet<u64>)> = BTreeMap::new();
        for cell in 0..self.n_local() {
            for &nbr in self.neighbors(cell) {
                if self.local_index(nbr).is_some() {
                    continue;
                }
                let owner = self.owner_of(nbr)?;
                let entry = out.entry(owner).or_default();
                entry.0.insert(cell);
                entry.1.insert(nbr);
            }
        }
        Ok(out
            .into_iter()
            .map(|(rank, (send, expect))| {
                (
                    rank,
                    BoundaryLinks {
                        send: send.into_iter().collect(),
                        expect: expect.into_iter().collect(),
                    },
                )
            })
            .collect())
    }
}

/// Cells crossing the boundary to one neighbour rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryLinks {
    /// Local cells whose cluster id the neighbour needs.
    pub send: Vec<usize>,
    /// Global ids of the neighbour's cells adjacent to ours.
    pub expect: Vec<u64>,
}
