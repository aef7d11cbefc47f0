pub mod sim;

use thiserror::Error;

use crate::bootstrap::{GatherError, GatherSlot};
use crate::comm::{CommState, InitStage, PeerInfo};
use crate::graph::{RankGraphInfo, TopoGraph};
use crate::topology::{NodeId, NodeModel, TopologyError};
use crate::transport::setup::TransportConnectError;

pub use sim::SimServices;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Gather error: {0}")]
    Gather(#[from] GatherError),
    #[error("Transport connect error: {0}")]
    TransportConnect(#[from] TransportConnectError),
    #[error("Communicator is at stage {found}, expected {expected}")]
    StageMismatch {
        expected: InitStage,
        found: InitStage,
    },
    #[error("Rank record {0} does not match the rank being initialized")]
    RankMismatch(usize),
    #[error("Node {0} is missing ranks for its devices")]
    IncompleteNode(NodeId),
    #[error("Ranks of node {0} disagree on the node graph")]
    InconsistentGraph(NodeId),
    #[error("Graph received {0} contributions for {1} ranks")]
    GraphIncomplete(usize, usize),
}

/// The node a rank runs on, handed explicitly to every init call.
#[derive(Clone, Copy, Debug)]
pub struct RankContext<'a> {
    pub rank: usize,
    pub node: &'a NodeModel,
}

/// Per-rank initialization steps of a collective runtime. Each call only
/// sees its own rank's context and the shared gather buffers.
pub trait InitServices {
    /// Publishes the identity record of `ctx.rank`.
    fn bootstrap_all_gather(
        &self,
        ctx: &RankContext<'_>,
        comm: &mut CommState,
        slot: GatherSlot<'_, PeerInfo>,
    ) -> Result<(), InitError>;

    /// Searches the local topology, publishes the rank's graph record and
    /// folds its graphs into the shared accumulators.
    fn init_transports_rank_1(
        &self,
        ctx: &RankContext<'_>,
        comm: &mut CommState,
        all_gather1: &[PeerInfo],
        slot: GatherSlot<'_, RankGraphInfo>,
        tree_graph: &mut TopoGraph,
        ring_graph: &mut TopoGraph,
    ) -> Result<(), InitError>;

    /// Builds rings and trees from the gathered graph records and
    /// connects the rank to its neighbors.
    fn init_transports_rank_3(
        &self,
        ctx: &RankContext<'_>,
        comm: &mut CommState,
        all_gather3: &[RankGraphInfo],
        tree_graph: &TopoGraph,
        ring_graph: &TopoGraph,
    ) -> Result<(), InitError>;
}

pub(crate) fn check_stage(comm: &CommState, expected: InitStage) -> Result<(), InitError> {
    if comm.stage != expected {
        return Err(InitError::StageMismatch {
            expected,
            found: comm.stage,
        });
    }
    Ok(())
}
