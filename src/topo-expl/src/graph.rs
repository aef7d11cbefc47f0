//! Communication graphs shared by all ranks during transport init.
//!
//! Every rank searches its own node and folds the result into the shared
//! ring and tree accumulators, which keep the most constrained values
//! seen so far. The search is a greedy walk along the connection matrix,
//! preferring direct links.

use std::fmt;

use strum::Display;

use crate::topology::{LinkClass, NodeId, NodeModel, TopologyError};
use crate::transport::MAX_CHANNELS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum GraphPattern {
    Ring,
    Tree,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphInfo {
    pub n_channels: usize,
    pub speed_intra: u32,
    pub speed_inter: u32,
    // slowest link class used inside a node
    pub type_intra: LinkClass,
}

fn link_cost(class: LinkClass) -> u8 {
    match class {
        LinkClass::SelfLink => 0,
        LinkClass::Direct => 1,
        LinkClass::SharedFabric => 2,
        LinkClass::None => 3,
    }
}

impl GraphInfo {
    pub fn merge(&self, other: &GraphInfo) -> GraphInfo {
        let type_intra = if link_cost(other.type_intra) > link_cost(self.type_intra) {
            other.type_intra
        } else {
            self.type_intra
        };
        GraphInfo {
            n_channels: self.n_channels.min(other.n_channels),
            speed_intra: self.speed_intra.min(other.speed_intra),
            speed_inter: self.speed_inter.min(other.speed_inter),
            type_intra,
        }
    }
}

impl fmt::Display for GraphInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} channels, intra {} ({}), inter {}",
            self.n_channels, self.speed_intra, self.type_intra, self.speed_inter
        )
    }
}

/// Graph accumulator shared by every rank of a run.
#[derive(Clone, Debug)]
pub struct TopoGraph {
    pub pattern: GraphPattern,
    info: Option<GraphInfo>,
    contributions: usize,
}

impl TopoGraph {
    pub fn new(pattern: GraphPattern) -> Self {
        TopoGraph {
            pattern,
            info: None,
            contributions: 0,
        }
    }

    pub fn merge(&mut self, local: &GraphInfo) {
        self.info = Some(match self.info {
            Some(info) => info.merge(local),
            None => *local,
        });
        self.contributions += 1;
    }

    #[inline]
    pub fn info(&self) -> Option<&GraphInfo> {
        self.info.as_ref()
    }

    #[inline]
    pub fn contributions(&self) -> usize {
        self.contributions
    }
}

/// What a rank publishes in the second all-gather.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankGraphInfo {
    pub rank: usize,
    pub host: NodeId,
    pub device_idx: usize,
    pub nic: usize,
    // global ranks of the node, in ring order
    pub node_order: Vec<usize>,
    pub ring: GraphInfo,
    pub tree: GraphInfo,
}

/// Device order of one node: a greedy walk from device 0 that takes the
/// lowest unvisited direct peer, then the lowest fabric peer, then any.
pub fn search_intra_order(node: &NodeModel) -> Vec<usize> {
    let conn = &node.gpus.conn;
    let n = conn.dim();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut current = 0;
    while order.len() < n {
        visited[current] = true;
        order.push(current);
        let pick = |class: LinkClass| conn.peers_of(current, class).find(|&d| !visited[d]);
        let next = pick(LinkClass::Direct)
            .or_else(|| pick(LinkClass::SharedFabric))
            .or_else(|| (0..n).find(|&d| !visited[d]));
        match next {
            Some(next) => current = next,
            None => break,
        }
    }
    order
}

pub fn hop_width(node: &NodeModel, a: usize, b: usize) -> Result<u32, TopologyError> {
    let cpu = &node.cpu;
    let width = match node.link_class(a, b)? {
        LinkClass::SelfLink => cpu.io_width,
        LinkClass::Direct => node.gpus.direct_link_width,
        LinkClass::SharedFabric => {
            if node.numa_node_of(a)? == node.numa_node_of(b)? {
                cpu.io_width
            } else {
                cpu.inter_socket_width.min(cpu.io_width)
            }
        }
        LinkClass::None => cpu.cpu_io_width,
    };
    Ok(width)
}

/// Graph of one node following `order`; rings close the loop, trees do not.
pub fn local_graph(
    node: &NodeModel,
    order: &[usize],
    pattern: GraphPattern,
    multi_node: bool,
) -> Result<GraphInfo, TopologyError> {
    let mut hops = order.windows(2).map(|w| (w[0], w[1])).collect::<Vec<_>>();
    if pattern == GraphPattern::Ring && order.len() > 2 {
        hops.push((order[order.len() - 1], order[0]));
    }
    let mut speed_intra = node.cpu.io_width;
    let mut type_intra = LinkClass::SelfLink;
    for (i, (a, b)) in hops.into_iter().enumerate() {
        let width = hop_width(node, a, b)?;
        speed_intra = if i == 0 { width } else { speed_intra.min(width) };
        let class = node.link_class(a, b)?;
        if link_cost(class) > link_cost(type_intra) {
            type_intra = class;
        }
    }
    Ok(GraphInfo {
        n_channels: node.nics.count().clamp(1, MAX_CHANNELS),
        speed_intra,
        speed_inter: if multi_node { node.cpu.io_width } else { 0 },
        type_intra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelCatalog;

    fn first_node(model: &str) -> NodeModel {
        let catalog = ModelCatalog::builtin().unwrap();
        let network = catalog.lookup(model).unwrap().build();
        network.resolve_node(0).unwrap().clone()
    }

    #[test]
    fn intra_order_follows_direct_links() {
        assert_eq!(search_intra_order(&first_node("vg20-4p2h-x4")), vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(search_intra_order(&first_node("gfx908-8p6l-alt")), vec![0, 1, 2, 3, 5, 4, 6, 7]);
        assert_eq!(search_intra_order(&first_node("gfx908-4p3l")), vec![0, 1, 2, 3]);
    }

    #[test]
    fn all_direct_ring_uses_link_width() {
        let node = first_node("gfx908-8p6l");
        let order = search_intra_order(&node);
        let ring = local_graph(&node, &order, GraphPattern::Ring, false).unwrap();
        assert_eq!(ring.type_intra, LinkClass::Direct);
        assert_eq!(ring.speed_intra, 36);
        assert_eq!(ring.speed_inter, 0);
        assert_eq!(ring.n_channels, 1);
    }

    #[test]
    fn pcie_ring_crossing_sockets_is_limited() {
        let node = first_node("8pcie-2nic-x4");
        let order = search_intra_order(&node);
        let ring = local_graph(&node, &order, GraphPattern::Ring, true).unwrap();
        assert_eq!(ring.type_intra, LinkClass::SharedFabric);
        assert_eq!(ring.speed_intra, 9);
        assert_eq!(ring.speed_inter, 12);
        assert_eq!(ring.n_channels, 2);
    }

    #[test]
    fn accumulator_keeps_the_minimum() {
        let mut graph = TopoGraph::new(GraphPattern::Ring);
        assert!(graph.info().is_none());
        let fast = GraphInfo {
            n_channels: 2,
            speed_intra: 36,
            speed_inter: 12,
            type_intra: LinkClass::Direct,
        };
        let slow = GraphInfo {
            n_channels: 1,
            speed_intra: 9,
            speed_inter: 24,
            type_intra: LinkClass::SharedFabric,
        };
        graph.merge(&fast);
        graph.merge(&slow);
        graph.merge(&fast);
        let info = graph.info().unwrap();
        assert_eq!(graph.contributions(), 3);
        assert_eq!(info.n_channels, 1);
        assert_eq!(info.speed_intra, 9);
        assert_eq!(info.speed_inter, 12);
        assert_eq!(info.type_intra, LinkClass::SharedFabric);
    }
}
