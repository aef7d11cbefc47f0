pub mod setup;

use std::fmt;

use crate::pattern::RingPattern;
use crate::topology::LinkClass;

pub const MAX_CHANNELS: usize = 32;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnType {
    Send,
    Recv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    // peer-to-peer between devices of one node
    P2p(LinkClass),
    // staged through host memory, no device path
    Shm,
    Net { nic: usize },
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::P2p(class) => write!(f, "P2P/{}", class),
            Transport::Shm => f.write_str("SHM"),
            Transport::Net { nic } => write!(f, "NET/{}", nic),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerConnection {
    pub peer_rank: usize,
    pub channel: ChannelId,
    pub conn_type: ConnType,
    pub transport: Transport,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelState {
    pub id: ChannelId,
    pub ring: RingPattern,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_names_use_link_class_names() {
        assert_eq!(Transport::P2p(LinkClass::Direct).to_string(), "P2P/direct");
        assert_eq!(
            Transport::P2p(LinkClass::SharedFabric).to_string(),
            "P2P/shared-fabric"
        );
        assert_eq!(Transport::Shm.to_string(), "SHM");
        assert_eq!(Transport::Net { nic: 1 }.to_string(), "NET/1");
    }
}
