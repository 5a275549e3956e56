//! Ghost-layer exchange of cluster ids across rank boundaries.
//!
//! Every adjacency entry whose target lives on another rank makes the owner
//! of the source cell ship that cell's cluster id to the target's rank, and
//! vice versa. One exchange has two stages, each on its own [`CommTag`]:
//!
//! 1. symmetric count exchange with every neighbour rank,
//! 2. payload exchange of `(global cell id, cluster id)` records.
//!
//! Both stages drain every send and receive handle before returning, even
//! when an error was detected, so no message is left in flight for the next
//! round. A neighbour that stays silent, sends a malformed buffer or omits a
//! cell we are adjacent to is reported as [`LtsWeightsError::IncompleteExchange`].

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::algs::communicator::{Communicator, GhostCommTags, Wait};
use crate::algs::distributed_graph::DistributedGraph;
use crate::algs::wire::{WireCount, WireGhost, cast_slice, cast_slice_mut, decode_records};
use crate::lts_error::LtsWeightsError;

/// Remote cluster ids, keyed by `(neighbour rank, global cell id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GhostLayer {
    by_rank: BTreeMap<usize, HashMap<u64, u32>>,
}

impl GhostLayer {
    pub fn get(&self, rank: usize, global: u64) -> Option<u32> {
        self.by_rank.get(&rank)?.get(&global).copied()
    }

    /// Look up a remote cell, resolving its owner through `graph`.
    pub fn lookup(&self, graph: &DistributedGraph, global: u64) -> Result<u32, LtsWeightsError> {
        let owner = graph.owner_of(global)?;
        self.get(owner, global).ok_or_else(|| {
            LtsWeightsError::incomplete(owner, format!("no ghost entry for global cell {global}"))
        })
    }

    pub fn neighbor_ranks(&self) -> impl Iterator<Item = usize> + '_ {
        self.by_rank.keys().copied()
    }

    /// Total number of ghost cells across all neighbours.
    pub fn len(&self) -> usize {
        self.by_rank.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u64, u32)> + '_ {
        self.by_rank
            .iter()
            .flat_map(|(&r, m)| m.iter().map(move |(&g, &c)| (r, g, c)))
    }
}

/// Rank-local preconditions of [`exchange_ghost_layer`].
///
/// Collective callers run this through a failure vote first, so a rank with
/// bad input does not leave its peers waiting in the exchange.
pub fn check_exchange_inputs<C: Communicator + ?Sized>(
    graph: &DistributedGraph,
    cluster_ids: &[u32],
    comm: &C,
) -> Result<(), LtsWeightsError> {
    if cluster_ids.len() != graph.n_local() {
        return Err(LtsWeightsError::LengthMismatch {
            what: "cluster_ids",
            expected: graph.n_local(),
            found: cluster_ids.len(),
        });
    }
    if comm.size() != graph.n_ranks() || comm.rank() != graph.rank() {
        return Err(LtsWeightsError::InvalidGraph(
            format!(
                "graph describes rank {} of {}, communicator is rank {} of {}",
                graph.rank(),
                graph.n_ranks(),
                comm.rank(),
                comm.size()
            )
            .into(),
        ));
    }
    Ok(())
}

/// Exchange the current `cluster_ids` of all boundary cells with every
/// neighbour rank and return the resulting ghost layer.
///
/// Blocks until every expected message has arrived.
pub fn exchange_ghost_layer<C>(
    graph: &DistributedGraph,
    cluster_ids: &[u32],
    comm: &C,
    tags: GhostCommTags,
) -> Result<GhostLayer, LtsWeightsError>
where
    C: Communicator,
{
    check_exchange_inputs(graph, cluster_ids, comm)?;

    let boundary = graph.boundary()?;
    if boundary.is_empty() {
        return Ok(GhostLayer::default());
    }

    let outgoing: BTreeMap<usize, Vec<WireGhost>> = boundary
        .iter()
        .map(|(&nbr, links)| {
            let recs = links
                .send
                .iter()
                .map(|&cell| WireGhost::new(graph.global_id(cell), cluster_ids[cell]))
                .collect();
            (nbr, recs)
        })
        .collect();

    let counts = exchange_counts(&outgoing, comm, tags)?;
    let received = exchange_payloads(&outgoing, &counts, comm, tags)?;

    let mut layer = GhostLayer::default();
    for (nbr, recs) in received {
        let links = &boundary[&nbr];
        let mut map: HashMap<u64, u32> = HashMap::with_capacity(recs.len());
        for rec in recs {
            let cell = rec.cell();
            if graph.owner_of(cell).ok() != Some(nbr) {
                return Err(LtsWeightsError::incomplete(
                    nbr,
                    format!("rank {nbr} sent cell {cell} it does not own"),
                ));
            }
            map.insert(cell, rec.cluster());
        }
        if let Some(missing) = links.expect.iter().find(|g| !map.contains_key(*g)) {
            return Err(LtsWeightsError::incomplete(
                nbr,
                format!("rank {nbr} did not send adjacent cell {missing}"),
            ));
        }
        layer.by_rank.insert(nbr, map);
    }

    log::trace!(
        "rank {}: ghost layer holds {} cells from {} neighbours",
        comm.rank(),
        layer.len(),
        layer.by_rank.len()
    );
    Ok(layer)
}

/// Stage 1: tell every neighbour how many records follow.
fn exchange_counts<C: Communicator>(
    outgoing: &BTreeMap<usize, Vec<WireGhost>>,
    comm: &C,
    tags: GhostCommTags,
) -> Result<BTreeMap<usize, usize>, LtsWeightsError> {
    let tag = tags.sizes.as_u16();
    let sz = std::mem::size_of::<WireCount>();

    let mut recv_size = Vec::with_capacity(outgoing.len());
    for &nbr in outgoing.keys() {
        let mut cnt = WireCount::new(0);
        let h = comm.irecv(nbr, tag, cast_slice_mut(std::slice::from_mut(&mut cnt)));
        recv_size.push((nbr, h));
    }

    let mut pending_sends = Vec::with_capacity(outgoing.len());
    for (&nbr, recs) in outgoing {
        let count = WireCount::new(recs.len());
        pending_sends.push(comm.isend(nbr, tag, cast_slice(std::slice::from_ref(&count))));
    }

    let mut sizes_in = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, h) in recv_size {
        match h.wait() {
            Some(data) if data.len() == sz => {
                let cnt: WireCount = bytemuck::pod_read_unaligned(&data);
                sizes_in.insert(nbr, cnt.get());
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(LtsWeightsError::incomplete(
                    nbr,
                    format!("expected {sz} bytes for count header, got {}", data.len()),
                ));
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(LtsWeightsError::incomplete(
                    nbr,
                    format!("no count received from rank {nbr}"),
                ));
            }
            _ => {} // already have an error; just drain
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes_in),
    }
}

/// Stage 2: ship the records themselves.
fn exchange_payloads<C: Communicator>(
    outgoing: &BTreeMap<usize, Vec<WireGhost>>,
    counts: &BTreeMap<usize, usize>,
    comm: &C,
    tags: GhostCommTags,
) -> Result<BTreeMap<usize, Vec<WireGhost>>, LtsWeightsError> {
    let tag = tags.data.as_u16();
    let rec = std::mem::size_of::<WireGhost>();

    let mut recv_data = Vec::with_capacity(counts.len());
    for (&nbr, &n) in counts {
        let mut buffer = vec![0u8; n * rec];
        let h = comm.irecv(nbr, tag, &mut buffer);
        recv_data.push((nbr, n, h));
    }

    let mut pending_sends = Vec::with_capacity(outgoing.len());
    for (&nbr, recs) in outgoing {
        pending_sends.push(comm.isend(nbr, tag, cast_slice(recs)));
    }

    let mut out = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, n, h) in recv_data {
        let got = h.wait();
        if maybe_err.is_some() {
            continue;
        }
        let Some(raw) = got else {
            maybe_err = Some(LtsWeightsError::incomplete(
                nbr,
                format!("no ghost payload received from rank {nbr}"),
            ));
            continue;
        };
        let decoded = crate::algs::wire::expect_exact_len(raw.len(), n * rec)
            .and_then(|()| decode_records::<WireGhost>(&raw));
        match decoded {
            Ok(recs) => {
                out.insert(nbr, recs);
            }
            Err(reason) => maybe_err = Some(LtsWeightsError::incomplete(nbr, reason)),
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}
