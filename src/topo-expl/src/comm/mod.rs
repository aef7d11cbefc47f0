use strum::Display;

use crate::pattern::TreePattern;
use crate::topology::NodeId;
use crate::transport::{ChannelState, PeerConnection};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display)]
pub enum InitStage {
    #[default]
    Created,
    PeerInfoGathered,
    GraphsComputed,
    Connected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerType {
    Local,
    IntraNode,
    InterNode,
}

/// Identity record every rank contributes to the first all-gather.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub rank: usize,
    pub host: NodeId,
    pub device_idx: usize,
    pub bus_id: u64,
    pub numa_node: u32,
}

/// Per-rank communicator state filled in by the init phases.
#[derive(Clone, Debug, Default)]
pub struct CommState {
    pub rank: usize,
    pub num_ranks: usize,
    pub stage: InitStage,

    pub host: Option<NodeId>,
    pub device_idx: usize,
    pub bus_id: u64,

    pub local_rank: usize,
    pub local_ranks: usize,
    pub peer_types: Vec<PeerType>,

    pub channels: Vec<ChannelState>,
    pub tree: TreePattern,
    pub connections: Vec<PeerConnection>,
}

impl CommState {
    pub fn peer_type(&self, peer: usize) -> Option<PeerType> {
        self.peer_types.get(peer).copied()
    }
}
