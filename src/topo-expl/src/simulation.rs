//! Replays the per-rank init protocol of a collective runtime over one
//! simulated cluster.
//!
//! The real protocol runs one process per rank; the ranks only exchange
//! data through all-gather buffers. Replaying every rank of a phase in
//! rank order before starting the next phase therefore yields the same
//! buffers as the distributed run.

use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use crate::bootstrap::{AllGatherBuffer, GatherError};
use crate::comm::CommState;
use crate::graph::{GraphPattern, TopoGraph};
use crate::init::{InitError, InitServices, RankContext};
use crate::topology::{NetworkModel, NodeId, TopologyError};
use crate::utils::alloc::{checked_calloc, AllocError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SimError {
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Gather error: {0}")]
    Gather(#[from] GatherError),
    #[error("Allocation error: {0}")]
    Alloc(#[from] AllocError),
    #[error("Init of rank {0} failed: {1}")]
    Init(usize, InitError),
}

/// Where one rank runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankPlacement {
    pub rank: usize,
    pub node: NodeId,
    pub description: String,
    pub device_idx: usize,
    pub bus_id: u64,
}

impl fmt::Display for RankPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rank {}: node {} ({}) accelerator bus id {:x}",
            self.rank, self.node, self.description, self.bus_id
        )
    }
}

pub struct SimulationReport {
    pub num_nodes: usize,
    pub num_ranks: usize,
    pub placements: Vec<RankPlacement>,
    pub ring_graph: TopoGraph,
    pub tree_graph: TopoGraph,
    pub comms: Vec<CommState>,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nnodes = {}, nranks = {}", self.num_nodes, self.num_ranks)?;
        for placement in self.placements.iter() {
            writeln!(f, "{}", placement)?;
        }
        for graph in [&self.ring_graph, &self.tree_graph] {
            if let Some(info) = graph.info() {
                writeln!(f, "{} graph: {}", graph.pattern, info)?;
            }
        }
        if let Some(comm) = self.comms.first() {
            for channel in comm.channels.iter() {
                let ranks = channel.ring.user_ranks.iter().join(" ");
                writeln!(f, "Ring {} : {}", channel.id, ranks)?;
            }
        }
        let ups = self
            .comms
            .iter()
            .map(|c| c.tree.up.map_or_else(|| "-1".to_string(), |up| up.to_string()))
            .join(" ");
        writeln!(f, "Tree up : {}", ups)
    }
}

pub struct Simulation<'a, S> {
    network: &'a NetworkModel,
    services: S,
}

impl<'a, S: InitServices> Simulation<'a, S> {
    pub fn new(network: &'a NetworkModel, services: S) -> Self {
        Simulation { network, services }
    }

    fn context(&self, rank: usize) -> Result<RankContext<'a>, SimError> {
        let node = self.network.resolve_node(rank)?;
        Ok(RankContext { rank, node })
    }

    /// Topology report: where every rank runs.
    pub fn placements(&self) -> Result<Vec<RankPlacement>, SimError> {
        (0..self.network.total_ranks())
            .map(|rank| {
                let node = self.network.resolve_node(rank)?;
                let device_idx = node.resolve_device_index(rank)?;
                let (node_id, description) = node.describe();
                Ok(RankPlacement {
                    rank,
                    node: node_id,
                    description: description.to_string(),
                    device_idx,
                    bus_id: node.bus_id_of(device_idx)?,
                })
            })
            .collect()
    }

    /// Runs all phases. Any failure aborts the whole run.
    pub fn run(&self) -> Result<SimulationReport, SimError> {
        let num_ranks = self.network.total_ranks();
        let num_nodes = self.network.total_nodes();
        log::info!("Simulating {} ranks on {} nodes", num_ranks, num_nodes);

        let placements = self.placements()?;

        let mut comms: Vec<CommState> = checked_calloc(num_ranks)?;
        let mut all_gather1 = AllGatherBuffer::new(num_ranks)?;
        for (rank, comm) in comms.iter_mut().enumerate() {
            comm.rank = rank;
            comm.num_ranks = num_ranks;
            let ctx = self.context(rank)?;
            self.services
                .bootstrap_all_gather(&ctx, comm, all_gather1.slot(rank)?)
                .map_err(|e| SimError::Init(rank, e))?;
        }
        let all_gather1 = all_gather1.complete()?;
        log::debug!("Phase 1 done: gathered {} identity records", all_gather1.len());

        let mut all_gather3 = AllGatherBuffer::new(num_ranks)?;
        let mut tree_graph = TopoGraph::new(GraphPattern::Tree);
        let mut ring_graph = TopoGraph::new(GraphPattern::Ring);
        for (rank, comm) in comms.iter_mut().enumerate() {
            let ctx = self.context(rank)?;
            self.services
                .init_transports_rank_1(
                    &ctx,
                    comm,
                    &all_gather1,
                    all_gather3.slot(rank)?,
                    &mut tree_graph,
                    &mut ring_graph,
                )
                .map_err(|e| SimError::Init(rank, e))?;
        }
        let all_gather3 = all_gather3.complete()?;
        log::debug!("Phase 2 done: {} graph records", all_gather3.len());

        for (rank, comm) in comms.iter_mut().enumerate() {
            let ctx = self.context(rank)?;
            self.services
                .init_transports_rank_3(&ctx, comm, &all_gather3, &tree_graph, &ring_graph)
                .map_err(|e| SimError::Init(rank, e))?;
        }
        log::debug!("Phase 3 done");

        Ok(SimulationReport {
            num_nodes,
            num_ranks,
            placements,
            ring_graph,
            tree_graph,
            comms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::GatherSlot;
    use crate::comm::{PeerInfo, PeerType};
    use crate::graph::RankGraphInfo;
    use crate::init::SimServices;
    use crate::registry::ModelCatalog;

    fn network(model: &str) -> NetworkModel {
        ModelCatalog::builtin().unwrap().lookup(model).unwrap().build()
    }

    #[test]
    fn placement_lines_follow_format() {
        let network = network("gfx908-4p3l");
        let sim = Simulation::new(&network, SimServices);
        let lines = sim
            .placements()
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "Rank 0: node 0 (Skylake gfx908 4P3L) accelerator bus id 1b000",
                "Rank 1: node 0 (Skylake gfx908 4P3L) accelerator bus id 1c000",
                "Rank 2: node 0 (Skylake gfx908 4P3L) accelerator bus id 3d000",
                "Rank 3: node 0 (Skylake gfx908 4P3L) accelerator bus id 3e000",
            ]
        );
    }

    #[test]
    fn two_node_run_connects_over_the_network() {
        let network = network("vg20-4p1h-x2");
        let report = Simulation::new(&network, SimServices).run().unwrap();
        assert_eq!(report.num_ranks, 8);
        assert_eq!(report.comms[0].channels[0].ring.user_ranks, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        let rank3 = &report.comms[3];
        assert_eq!(rank3.channels[0].ring.next, 4);
        assert!(rank3
            .connections
            .iter()
            .any(|c| c.peer_rank == 4 && c.transport.to_string() == "NET/0"));
        assert_eq!(rank3.peer_type(4), Some(PeerType::InterNode));
        assert_eq!(rank3.peer_type(0), Some(PeerType::IntraNode));
        assert_eq!(report.comms[4].tree.up, Some(0));
        assert_eq!(report.comms[0].tree.down, vec![1, 4]);
        assert_eq!(report.ring_graph.contributions(), 8);
    }

    #[test]
    fn report_renders_summary() {
        let network = network("gfx908-4p3l");
        let report = Simulation::new(&network, SimServices).run().unwrap();
        let text = report.to_string();
        assert!(text.starts_with("nnodes = 1, nranks = 4\n"));
        assert!(text.contains("Ring 00 : 0 1 2 3\n"));
        assert!(text.contains("Tree up : -1 0 1 2\n"));
        assert!(text.contains("Ring graph: 1 channels, intra 36 (direct), inter 0\n"));
    }

    // stand-in that never contributes for one rank
    struct SkipRank(usize);

    impl InitServices for SkipRank {
        fn bootstrap_all_gather(
            &self,
            ctx: &RankContext<'_>,
            comm: &mut CommState,
            slot: GatherSlot<'_, PeerInfo>,
        ) -> Result<(), InitError> {
            if ctx.rank == self.0 {
                return Ok(());
            }
            SimServices.bootstrap_all_gather(ctx, comm, slot)
        }

        fn init_transports_rank_1(
            &self,
            _ctx: &RankContext<'_>,
            _comm: &mut CommState,
            _all_gather1: &[PeerInfo],
            _slot: GatherSlot<'_, RankGraphInfo>,
            _tree_graph: &mut TopoGraph,
            _ring_graph: &mut TopoGraph,
        ) -> Result<(), InitError> {
            unreachable!("phase 2 must not start before phase 1 completes")
        }

        fn init_transports_rank_3(
            &self,
            _ctx: &RankContext<'_>,
            _comm: &mut CommState,
            _all_gather3: &[RankGraphInfo],
            _tree_graph: &TopoGraph,
            _ring_graph: &TopoGraph,
        ) -> Result<(), InitError> {
            unreachable!("phase 3 must not start before phase 2 completes")
        }
    }

    #[test]
    fn missing_contribution_aborts_between_phases() {
        let network = network("gfx908-4p3l");
        let err = Simulation::new(&network, SkipRank(2)).run().err().unwrap();
        assert_eq!(err, SimError::Gather(GatherError::MissingCheckIn(2)));
    }

    #[test]
    fn empty_network_runs_to_an_empty_report() {
        let network = NetworkModel::new();
        let report = Simulation::new(&network, SimServices).run().unwrap();
        assert_eq!(report.num_ranks, 0);
        assert!(report.placements.is_empty());
        assert!(report.ring_graph.info().is_none());
    }
}
