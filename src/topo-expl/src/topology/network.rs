use super::node::{NodeId, NodeModel};
use super::TopologyError;

/// Ordered cluster of nodes. Append-only while building a run.
#[derive(Clone, Debug, Default)]
pub struct NetworkModel {
    nodes: Vec<NodeModel>,
    // rank_bounds[i] is one past the last rank of node i
    rank_bounds: Vec<usize>,
}

impl NetworkModel {
    pub fn new() -> Self {
        NetworkModel {
            nodes: Vec::new(),
            rank_bounds: Vec::new(),
        }
    }

    pub fn append_node(&mut self, mut node: NodeModel) -> NodeId {
        let node_id = NodeId(self.nodes.len());
        node.node_id = node_id;
        node.first_rank = self.total_ranks();
        self.rank_bounds.push(node.first_rank + node.num_devices());
        log::trace!(
            "Appended node {} ({}) with ranks {:?}",
            node_id,
            node.description,
            node.rank_span()
        );
        self.nodes.push(node);
        node_id
    }

    #[inline]
    pub fn total_ranks(&self) -> usize {
        self.rank_bounds.last().copied().unwrap_or(0)
    }

    #[inline]
    pub fn total_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn resolve_node(&self, rank: usize) -> Result<&NodeModel, TopologyError> {
        if rank >= self.total_ranks() {
            return Err(TopologyError::RankOutOfRange(rank, self.total_ranks()));
        }
        // first node whose upper bound lies above the rank
        let idx = self.rank_bounds.partition_point(|&bound| bound <= rank);
        Ok(&self.nodes[idx])
    }

    pub fn node(&self, node_id: NodeId) -> Option<&NodeModel> {
        self.nodes.get(node_id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeModel> {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::topology::device::{AcceleratorSet, CpuArchetype, NetworkInterfaceSet};

    fn template(count: usize, description: &str) -> NodeModel {
        let bus_ids = (0..count as u64).map(|i| 0x1000 * (i + 1)).collect::<Vec<_>>();
        let paths = (0..count).map(|i| format!("/pci/{}", i)).collect::<Vec<_>>();
        let rows = (0..count)
            .map(|i| (0..count).map(|j| if i == j { '-' } else { 'P' }).collect::<String>())
            .collect::<Vec<_>>();
        let numa = vec![0; count];
        let gpus =
            AcceleratorSet::new("gpus", count, &bus_ids, &paths[..], &numa, &rows[..], 0).unwrap();
        let nics = NetworkInterfaceSet::new("nic", &["/pci/nic"], &[1], &[0]).unwrap();
        let cpu = CpuArchetype::new("cpu", 9, 12, 12).unwrap();
        NodeModel::new(Arc::new(cpu), Arc::new(gpus), Arc::new(nics), description)
    }

    #[test]
    fn append_assigns_contiguous_spans() {
        let mut network = NetworkModel::new();
        assert_eq!(network.total_ranks(), 0);
        assert_eq!(network.append_node(template(8, "a")), NodeId(0));
        assert_eq!(network.append_node(template(4, "b")), NodeId(1));
        assert_eq!(network.append_node(template(8, "c")), NodeId(2));
        assert_eq!(network.total_nodes(), 3);
        assert_eq!(network.total_ranks(), 20);
        let spans = network.nodes().map(|n| n.rank_span()).collect::<Vec<_>>();
        assert_eq!(spans, vec![0..8, 8..12, 12..20]);
    }

    #[test]
    fn resolves_boundaries() {
        let mut network = NetworkModel::new();
        network.append_node(template(8, "a"));
        network.append_node(template(4, "b"));
        assert_eq!(network.resolve_node(0).unwrap().node_id(), NodeId(0));
        assert_eq!(network.resolve_node(7).unwrap().node_id(), NodeId(0));
        assert_eq!(network.resolve_node(8).unwrap().node_id(), NodeId(1));
        assert_eq!(network.resolve_node(11).unwrap().node_id(), NodeId(1));
        assert!(matches!(
            network.resolve_node(12),
            Err(TopologyError::RankOutOfRange(12, 12))
        ));
        assert!(network.resolve_node(usize::MAX).is_err());
    }

    #[test]
    fn empty_network_resolves_nothing() {
        let network = NetworkModel::new();
        assert!(matches!(
            network.resolve_node(0),
            Err(TopologyError::RankOutOfRange(0, 0))
        ));
    }
}
