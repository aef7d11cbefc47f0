use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::{check_stage, InitError, InitServices, RankContext};
use crate::bootstrap::GatherSlot;
use crate::comm::{CommState, InitStage, PeerInfo, PeerType};
use crate::graph::{local_graph, search_intra_order, GraphPattern, RankGraphInfo, TopoGraph};
use crate::pattern::{RingPattern, TreePattern};
use crate::topology::{NodeId, TopologyError};
use crate::transport::setup::{PeerEndpoint, TransportConnectState};
use crate::transport::{ChannelId, ChannelState};

/// Deterministic in-process stand-in for bootstrap, graph search and
/// transport setup.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimServices;

impl InitServices for SimServices {
    fn bootstrap_all_gather(
        &self,
        ctx: &RankContext<'_>,
        comm: &mut CommState,
        slot: GatherSlot<'_, PeerInfo>,
    ) -> Result<(), InitError> {
        check_stage(comm, InitStage::Created)?;
        if comm.rank != ctx.rank || slot.rank() != ctx.rank {
            return Err(InitError::RankMismatch(ctx.rank));
        }
        let node = ctx.node;
        let device_idx = node.resolve_device_index(ctx.rank)?;
        let info = PeerInfo {
            rank: ctx.rank,
            host: node.node_id(),
            device_idx,
            bus_id: node.bus_id_of(device_idx)?,
            numa_node: node.numa_node_of(device_idx)?,
        };
        log::trace!(
            "Rank {} of {} on node {} device {} busId {:x}",
            ctx.rank,
            comm.num_ranks,
            info.host,
            device_idx,
            info.bus_id
        );
        comm.host = Some(info.host);
        comm.device_idx = device_idx;
        comm.bus_id = info.bus_id;
        slot.publish(info)?;
        comm.stage = InitStage::PeerInfoGathered;
        Ok(())
    }

    fn init_transports_rank_1(
        &self,
        ctx: &RankContext<'_>,
        comm: &mut CommState,
        all_gather1: &[PeerInfo],
        slot: GatherSlot<'_, RankGraphInfo>,
        tree_graph: &mut TopoGraph,
        ring_graph: &mut TopoGraph,
    ) -> Result<(), InitError> {
        check_stage(comm, InitStage::PeerInfoGathered)?;
        let me = all_gather1
            .get(ctx.rank)
            .filter(|p| p.rank == ctx.rank && slot.rank() == ctx.rank)
            .ok_or(InitError::RankMismatch(ctx.rank))?;
        let node = ctx.node;
        let host = node.node_id();

        comm.peer_types = all_gather1
            .iter()
            .map(|p| {
                if p.rank == ctx.rank {
                    PeerType::Local
                } else if p.host == host {
                    PeerType::IntraNode
                } else {
                    PeerType::InterNode
                }
            })
            .collect();

        // device index -> rank, for the ranks of this node
        let num_devices = node.num_devices();
        let mut device_ranks = vec![None; num_devices];
        for peer in all_gather1.iter().filter(|p| p.host == host) {
            let entry = device_ranks
                .get_mut(peer.device_idx)
                .ok_or(TopologyError::DeviceIndexOutOfRange(peer.device_idx, num_devices))?;
            *entry = Some(peer.rank);
        }
        let device_ranks = device_ranks
            .into_iter()
            .collect::<Option<Vec<usize>>>()
            .ok_or(InitError::IncompleteNode(host))?;
        comm.local_rank = node.local_rank(ctx.rank)?;
        comm.local_ranks = device_ranks.len();

        let multi_node = all_gather1.iter().any(|p| p.host != host);
        let order = search_intra_order(node);
        let ring = local_graph(node, &order, GraphPattern::Ring, multi_node)?;
        let tree = local_graph(node, &order, GraphPattern::Tree, multi_node)?;
        let record = RankGraphInfo {
            rank: ctx.rank,
            host,
            device_idx: me.device_idx,
            nic: node.nic_for_numa(me.numa_node),
            node_order: order.iter().map(|&dev| device_ranks[dev]).collect(),
            ring,
            tree,
        };
        log::trace!(
            "Rank {}: node order {:?}, ring {}, tree {}",
            ctx.rank,
            record.node_order,
            ring,
            tree
        );
        slot.publish(record)?;
        ring_graph.merge(&ring);
        tree_graph.merge(&tree);
        comm.stage = InitStage::GraphsComputed;
        Ok(())
    }

    fn init_transports_rank_3(
        &self,
        ctx: &RankContext<'_>,
        comm: &mut CommState,
        all_gather3: &[RankGraphInfo],
        tree_graph: &TopoGraph,
        ring_graph: &TopoGraph,
    ) -> Result<(), InitError> {
        check_stage(comm, InitStage::GraphsComputed)?;
        let num_ranks = all_gather3.len();
        let mut infos = Vec::with_capacity(2);
        for graph in [ring_graph, tree_graph] {
            match graph.info() {
                Some(info) if graph.contributions() == num_ranks => infos.push(*info),
                _ => return Err(InitError::GraphIncomplete(graph.contributions(), num_ranks)),
            }
        }
        let (ring_info, tree_info) = (infos[0], infos[1]);

        let mut node_orders: BTreeMap<NodeId, &Vec<usize>> = BTreeMap::new();
        let mut endpoints = Vec::with_capacity(num_ranks);
        for (rank, info) in all_gather3.iter().enumerate() {
            if info.rank != rank {
                return Err(InitError::RankMismatch(info.rank));
            }
            match node_orders.entry(info.host) {
                Entry::Vacant(e) => {
                    e.insert(&info.node_order);
                }
                Entry::Occupied(e) => {
                    if *e.get() != &info.node_order {
                        return Err(InitError::InconsistentGraph(info.host));
                    }
                }
            }
            endpoints.push(PeerEndpoint {
                rank,
                host: info.host,
                device_idx: info.device_idx,
            });
        }
        let node_orders = node_orders.into_values().cloned().collect::<Vec<_>>();
        let ring_order = node_orders.concat();

        let me = all_gather3
            .get(ctx.rank)
            .ok_or(InitError::RankMismatch(ctx.rank))?;
        let ring =
            RingPattern::from_order(&ring_order, ctx.rank).ok_or(InitError::RankMismatch(ctx.rank))?;
        let tree = TreePattern::from_node_orders(&node_orders, ctx.rank)
            .ok_or(InitError::RankMismatch(ctx.rank))?;

        let n_channels = ring_info.n_channels;
        let mut connect = TransportConnectState::new(ctx.rank, num_ranks, n_channels);
        let mut channels = Vec::with_capacity(n_channels);
        for c in 0..n_channels {
            let id = ChannelId(c as u32);
            connect.connect_peers(id, &[ring.prev], &[ring.next])?;
            channels.push(ChannelState {
                id,
                ring: ring.clone(),
            });
        }
        let tree_peers = tree.up.iter().chain(tree.down.iter()).copied().collect::<Vec<_>>();
        for c in 0..tree_info.n_channels.min(n_channels) {
            connect.connect_peers(ChannelId(c as u32), &tree_peers, &tree_peers)?;
        }
        let nic_count = ctx.node.nics.count();
        let connections = connect.setup(ctx.node, &endpoints, |channel| {
            (me.nic + channel.0 as usize) % nic_count
        })?;
        for conn in connections.iter() {
            log::debug!(
                "Channel {} : rank {} {:?} rank {} via {}",
                conn.channel,
                ctx.rank,
                conn.conn_type,
                conn.peer_rank,
                conn.transport
            );
        }

        comm.channels = channels;
        comm.tree = tree;
        comm.connections = connections;
        comm.stage = InitStage::Connected;
        Ok(())
    }
}
