pub mod device;
pub mod network;
pub mod node;

use thiserror::Error;

pub use device::{AcceleratorSet, ConnMatrix, CpuArchetype, LinkClass, NetworkInterfaceSet};
pub use network::NetworkModel;
pub use node::{NodeId, NodeModel};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Invalid archetype {0}: {1}")]
    InvalidArchetype(String, String),
    #[error("Rank {0} does not belong to node {1}")]
    RankNotInNode(usize, NodeId),
    #[error("Device index {0} out of range for {1} devices")]
    DeviceIndexOutOfRange(usize, usize),
    #[error("Rank {0} out of range for {1} ranks")]
    RankOutOfRange(usize, usize),
}
