use std::ops::Range;
use std::sync::Arc;

use super::device::{AcceleratorSet, CpuArchetype, LinkClass, NetworkInterfaceSet};
use super::TopologyError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One simulated machine. Archetypes are shared between every node
/// built from the same template.
#[derive(Clone, Debug)]
pub struct NodeModel {
    pub cpu: Arc<CpuArchetype>,
    pub gpus: Arc<AcceleratorSet>,
    pub nics: Arc<NetworkInterfaceSet>,
    pub description: String,
    // assigned by NetworkModel::append_node
    pub(crate) node_id: NodeId,
    pub(crate) first_rank: usize,
}

impl NodeModel {
    pub fn new(
        cpu: Arc<CpuArchetype>,
        gpus: Arc<AcceleratorSet>,
        nics: Arc<NetworkInterfaceSet>,
        description: &str,
    ) -> Self {
        NodeModel {
            cpu,
            gpus,
            nics,
            description: description.to_string(),
            node_id: NodeId(0),
            first_rank: 0,
        }
    }

    pub fn describe(&self) -> (NodeId, &str) {
        (self.node_id, self.description.as_str())
    }

    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    #[inline]
    pub fn num_devices(&self) -> usize {
        self.gpus.count()
    }

    #[inline]
    pub fn rank_span(&self) -> Range<usize> {
        self.first_rank..self.first_rank + self.num_devices()
    }

    pub fn local_rank(&self, rank: usize) -> Result<usize, TopologyError> {
        if self.rank_span().contains(&rank) {
            Ok(rank - self.first_rank)
        } else {
            Err(TopologyError::RankNotInNode(rank, self.node_id))
        }
    }

    /// Ranks of a node drive its devices in order.
    pub fn resolve_device_index(&self, rank: usize) -> Result<usize, TopologyError> {
        self.local_rank(rank)
    }

    pub fn bus_id_of(&self, dev: usize) -> Result<u64, TopologyError> {
        self.gpus
            .bus_ids
            .get(dev)
            .copied()
            .ok_or(TopologyError::DeviceIndexOutOfRange(dev, self.num_devices()))
    }

    pub fn numa_node_of(&self, dev: usize) -> Result<u32, TopologyError> {
        self.gpus
            .numa_nodes
            .get(dev)
            .copied()
            .ok_or(TopologyError::DeviceIndexOutOfRange(dev, self.num_devices()))
    }

    pub fn link_class(&self, a: usize, b: usize) -> Result<LinkClass, TopologyError> {
        let n = self.num_devices();
        for dev in [a, b] {
            if dev >= n {
                return Err(TopologyError::DeviceIndexOutOfRange(dev, n));
            }
        }
        Ok(self.gpus.conn.get(a, b))
    }

    /// First interface attached to `numa`, falling back to interface 0.
    pub fn nic_for_numa(&self, numa: u32) -> usize {
        self.nics
            .numa_nodes
            .iter()
            .position(|&n| n == numa)
            .unwrap_or(0)
    }
}
