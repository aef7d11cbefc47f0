use thiserror::Error;

use super::{ChannelId, ConnType, PeerConnection, Transport, MAX_CHANNELS};
use crate::topology::{LinkClass, NodeId, NodeModel, TopologyError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportConnectError {
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("No transport found for rank {0} -> rank {1}")]
    NoTransportFound(usize, usize),
    #[error("Channel {0} exceeds the maximum of {1} channels")]
    ChannelOverflow(ChannelId, usize),
    #[error("Peer rank {0} out of range for {1} ranks")]
    PeerOverflow(usize, usize),
}

/// Where a rank lives, as far as transport selection is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub rank: usize,
    pub host: NodeId,
    pub device_idx: usize,
}

/// Picks the transport between two ranks. `node` is the node of `local`.
pub fn select_transport(
    node: &NodeModel,
    local: &PeerEndpoint,
    peer: &PeerEndpoint,
    nic: usize,
) -> Result<Transport, TransportConnectError> {
    if peer.host != local.host {
        if nic >= node.nics.count() {
            return Err(TransportConnectError::NoTransportFound(local.rank, peer.rank));
        }
        return Ok(Transport::Net { nic });
    }
    let transport = match node.link_class(local.device_idx, peer.device_idx)? {
        LinkClass::Direct => Transport::P2p(LinkClass::Direct),
        LinkClass::SharedFabric => Transport::P2p(LinkClass::SharedFabric),
        LinkClass::None => Transport::Shm,
        LinkClass::SelfLink => {
            return Err(TransportConnectError::NoTransportFound(local.rank, peer.rank))
        }
    };
    Ok(transport)
}

pub struct TransportConnectState {
    pub rank: usize,
    pub num_ranks: usize,
    pub num_channels: usize,
    // bitmask for which channels to connect to for each peer
    recv_connect_mask: Vec<u64>,
    send_connect_mask: Vec<u64>,
}

impl TransportConnectState {
    /// Channels beyond `MAX_CHANNELS` are dropped.
    pub fn new(rank: usize, num_ranks: usize, num_channels: usize) -> Self {
        TransportConnectState {
            rank,
            num_ranks,
            num_channels: num_channels.min(MAX_CHANNELS),
            recv_connect_mask: vec![0; num_ranks],
            send_connect_mask: vec![0; num_ranks],
        }
    }

    /// Marks connections to set up on `channel`. Self connections are dropped.
    pub fn connect_peers(
        &mut self,
        channel: ChannelId,
        recv_peers: &[usize],
        send_peers: &[usize],
    ) -> Result<(), TransportConnectError> {
        if channel.0 as usize >= self.num_channels {
            return Err(TransportConnectError::ChannelOverflow(channel, self.num_channels));
        }
        let mask = 1u64 << channel.0;
        for (peers, masks) in [
            (recv_peers, &mut self.recv_connect_mask),
            (send_peers, &mut self.send_connect_mask),
        ] {
            for &peer in peers {
                if peer >= self.num_ranks {
                    return Err(TransportConnectError::PeerOverflow(peer, self.num_ranks));
                }
                if peer != self.rank {
                    masks[peer] |= mask;
                }
            }
        }
        Ok(())
    }

    /// Resolves every marked connection. At round i the recv peer is
    /// rank - i and the send peer is rank + i.
    pub fn setup(
        self,
        node: &NodeModel,
        peers: &[PeerEndpoint],
        nic_of_channel: impl Fn(ChannelId) -> usize,
    ) -> Result<Vec<PeerConnection>, TransportConnectError> {
        let rank = self.rank;
        let num_ranks = self.num_ranks;
        let endpoint = |r: usize| {
            peers
                .get(r)
                .ok_or(TransportConnectError::PeerOverflow(r, peers.len()))
        };
        let local = endpoint(rank)?;
        let mut connected = Vec::new();
        for i in 1..num_ranks {
            let recv_peer = (rank + num_ranks - i) % num_ranks;
            let send_peer = (rank + i) % num_ranks;
            let recv_mask = self.recv_connect_mask[recv_peer];
            let send_mask = self.send_connect_mask[send_peer];
            for c in 0..self.num_channels as u32 {
                let channel = ChannelId(c);
                let nic = nic_of_channel(channel);
                for (peer, mask, conn_type) in [
                    (recv_peer, recv_mask, ConnType::Recv),
                    (send_peer, send_mask, ConnType::Send),
                ] {
                    if mask & (1u64 << c) == 0 {
                        continue;
                    }
                    let transport = select_transport(node, local, endpoint(peer)?, nic)?;
                    log::trace!(
                        "rank={}, channel={}, peer={}, {:?} via {}",
                        rank,
                        channel,
                        peer,
                        conn_type,
                        transport
                    );
                    connected.push(PeerConnection {
                        peer_rank: peer,
                        channel,
                        conn_type,
                        transport,
                    });
                }
            }
        }
        Ok(connected)
    }
}
