//! Limit the cluster-id gap between adjacent cells, across rank boundaries.
//!
//! Each round exchanges the ghost layer, then promotes every cell whose
//! neighbour sits more than `max_difference` clusters above it. All reads of
//! a round use the cluster ids as they were at the start of the round. Rounds
//! repeat until no rank changed anything.

use crate::algs::communicator::{Communicator, GhostCommTags, agree_on_failure};
use crate::algs::distributed_graph::DistributedGraph;
use crate::algs::ghost_exchange::{GhostLayer, check_exchange_inputs, exchange_ghost_layer};
use crate::lts_error::LtsWeightsError;

/// Outcome of [`enforce_maximum_difference`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EnforcementReport {
    /// Rounds in which at least one cell on some rank was promoted.
    pub rounds: usize,
    /// Promotions of cells owned by this rank, summed over all rounds.
    pub promotions: usize,
}

/// One promotion sweep over the local cells.
///
/// `snapshot` holds the round-start cluster ids; promoted values are written
/// to `cluster_ids`. Returns the number of promoted cells.
pub fn promote_round(
    graph: &DistributedGraph,
    snapshot: &[u32],
    ghosts: &GhostLayer,
    max_difference: u32,
    cluster_ids: &mut [u32],
) -> Result<usize, LtsWeightsError> {
    let mut promoted = 0;
    for cell in 0..graph.n_local() {
        let own = snapshot[cell];
        let mut required = own;
        for &nbr in graph.neighbors(cell) {
            let theirs = match graph.local_index(nbr) {
                Some(local) => snapshot[local],
                None => ghosts.lookup(graph, nbr)?,
            };
            required = required.max(theirs.saturating_sub(max_difference));
        }
        if required > own {
            cluster_ids[cell] = required;
            promoted += 1;
        }
    }
    Ok(promoted)
}

/// Iterate [`promote_round`] to a global fixed point.
///
/// Collective: every rank must call this with its own slice of the graph.
/// Input checks and every round are voted on, so a failure on one rank is an
/// error on all of them. Cluster ids only ever grow and are capped by
/// `max_cluster_id`, so the loop ends after at most `max_cluster_id` changing
/// rounds.
pub fn enforce_maximum_difference<C: Communicator>(
    graph: &DistributedGraph,
    cluster_ids: &mut [u32],
    max_difference: u32,
    max_cluster_id: u32,
    comm: &C,
    tags: GhostCommTags,
) -> Result<EnforcementReport, LtsWeightsError> {
    let peer_failed = || LtsWeightsError::PeerFailed {
        stage: "enforce_maximum_difference",
    };
    agree_on_failure(comm, check_exchange_inputs(graph, cluster_ids, comm), peer_failed)?;

    let mut report = EnforcementReport::default();
    loop {
        let round = exchange_ghost_layer(graph, cluster_ids, comm, tags).and_then(|ghosts| {
            let snapshot = cluster_ids.to_vec();
            promote_round(graph, &snapshot, &ghosts, max_difference, cluster_ids)
        });
        let promoted = agree_on_failure(comm, round, peer_failed)?;
        report.promotions += promoted;

        if !comm.allreduce_or(promoted > 0)? {
            break;
        }
        report.rounds += 1;
        log::debug!(
            "rank {}: enforcement round {} promoted {promoted} cells",
            comm.rank(),
            report.rounds
        );
        if report.rounds > max_cluster_id as usize + 1 {
            return Err(LtsWeightsError::config(format!(
                "cluster difference enforcement did not settle after {} rounds",
                report.rounds
            )));
        }
    }
    log::info!(
        "rank {}: cluster differences settled after {} rounds ({} local promotions)",
        comm.rank(),
        report.rounds,
        report.promotions
    );
    Ok(report)
}
