//! Re-export public algorithms.

pub mod communicator;
pub mod distributed_graph;
pub mod ghost_exchange;
pub mod metis_partition;
pub mod wire;

pub use distributed_graph::DistributedGraph;
pub use ghost_exchange::{GhostLayer, exchange_ghost_layer};
