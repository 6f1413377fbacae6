//! Message passing and graph algorithms.

pub mod collective;
pub mod communicator;
pub mod dual_graph;
pub mod wire;
