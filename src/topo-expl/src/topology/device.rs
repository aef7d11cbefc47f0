use std::fmt;

use strum::{Display, EnumIter, IntoEnumIterator};

use super::TopologyError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum LinkClass {
    // diagonal of the connection matrix
    #[strum(serialize = "self")]
    SelfLink,
    #[strum(serialize = "direct")]
    Direct,
    #[strum(serialize = "shared-fabric")]
    SharedFabric,
    #[strum(serialize = "none")]
    None,
}

impl LinkClass {
    pub fn code(&self) -> char {
        match self {
            LinkClass::SelfLink => '-',
            LinkClass::Direct => 'X',
            LinkClass::SharedFabric => 'P',
            LinkClass::None => '.',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        LinkClass::iter().find(|class| class.code() == code)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuArchetype {
    pub name: String,
    pub inter_socket_width: u32,
    pub cpu_io_width: u32,
    pub io_width: u32,
}

impl CpuArchetype {
    pub fn new(
        name: &str,
        inter_socket_width: u32,
        cpu_io_width: u32,
        io_width: u32,
    ) -> Result<Self, TopologyError> {
        if inter_socket_width == 0 || cpu_io_width == 0 || io_width == 0 {
            return Err(TopologyError::InvalidArchetype(
                name.to_string(),
                "link widths must be positive".to_string(),
            ));
        }
        Ok(CpuArchetype {
            name: name.to_string(),
            inter_socket_width,
            cpu_io_width,
            io_width,
        })
    }
}

/// Square table of link classes between the devices of one node.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnMatrix {
    dim: usize,
    links: Vec<LinkClass>,
}

impl ConnMatrix {
    /// Parses one string per row, one link-class code per column.
    /// Only the leading `dim` rows and columns are kept.
    pub fn from_rows<S: AsRef<str>>(dim: usize, rows: &[S]) -> Result<Self, String> {
        if rows.len() < dim {
            return Err(format!("{} rows, need at least {}", rows.len(), dim));
        }
        let mut links = Vec::with_capacity(dim * dim);
        for (i, row) in rows.iter().take(dim).enumerate() {
            let codes = row.as_ref().chars().collect::<Vec<_>>();
            if codes.len() < dim {
                return Err(format!("row {} has {} columns, need {}", i, codes.len(), dim));
            }
            for (j, code) in codes.into_iter().take(dim).enumerate() {
                if i == j {
                    links.push(LinkClass::SelfLink);
                    continue;
                }
                match LinkClass::from_code(code) {
                    Some(LinkClass::SelfLink) | None => {
                        return Err(format!("unknown link code {:?} at ({}, {})", code, i, j));
                    }
                    Some(class) => links.push(class),
                }
            }
        }
        let matrix = ConnMatrix { dim, links };
        for i in 0..dim {
            for j in (i + 1)..dim {
                if matrix.get(i, j) != matrix.get(j, i) {
                    return Err(format!("asymmetric link between {} and {}", i, j));
                }
            }
        }
        Ok(matrix)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> LinkClass {
        self.links[i * self.dim + j]
    }

    pub fn peers_of(&self, dev: usize, class: LinkClass) -> impl Iterator<Item = usize> + '_ {
        (0..self.dim).filter(move |&j| j != dev && self.get(dev, j) == class)
    }
}

impl fmt::Debug for ConnMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = (0..self.dim)
            .map(|i| (0..self.dim).map(|j| self.get(i, j).code()).collect::<String>())
            .collect::<Vec<_>>();
        f.debug_list().entries(rows).finish()
    }
}

#[derive(Clone, Debug)]
pub struct AcceleratorSet {
    pub name: String,
    pub bus_ids: Vec<u64>,
    pub pci_paths: Vec<String>,
    pub numa_nodes: Vec<u32>,
    pub conn: ConnMatrix,
    // bandwidth of a single direct link
    pub direct_link_width: u32,
}

impl AcceleratorSet {
    /// Builds a set of `count` devices from the leading entries of the
    /// per-device tables, which may describe a larger layout.
    pub fn new<S: AsRef<str>>(
        name: &str,
        count: usize,
        bus_ids: &[u64],
        pci_paths: &[S],
        numa_nodes: &[u32],
        conn_rows: &[S],
        direct_link_width: u32,
    ) -> Result<Self, TopologyError> {
        let invalid = |reason: String| TopologyError::InvalidArchetype(name.to_string(), reason);
        if count == 0 {
            return Err(invalid("device count must be positive".to_string()));
        }
        for (table, len) in [
            ("bus ids", bus_ids.len()),
            ("pci paths", pci_paths.len()),
            ("numa nodes", numa_nodes.len()),
        ] {
            if len < count {
                return Err(invalid(format!("{} has {} entries for {} devices", table, len, count)));
            }
        }
        let bus_ids = bus_ids[..count].to_vec();
        for (i, bus_id) in bus_ids.iter().enumerate() {
            if bus_ids[..i].contains(bus_id) {
                return Err(invalid(format!("duplicated bus id {:x}", bus_id)));
            }
        }
        let conn = ConnMatrix::from_rows(count, conn_rows).map_err(invalid)?;
        let has_direct = (0..count).any(|i| conn.peers_of(i, LinkClass::Direct).next().is_some());
        if direct_link_width == 0 && has_direct {
            return Err(invalid("direct links require a positive link width".to_string()));
        }
        Ok(AcceleratorSet {
            name: name.to_string(),
            bus_ids,
            pci_paths: pci_paths[..count].iter().map(|p| p.as_ref().to_string()).collect(),
            numa_nodes: numa_nodes[..count].to_vec(),
            conn,
            direct_link_width,
        })
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.bus_ids.len()
    }
}

#[derive(Clone, Debug)]
pub struct NetworkInterfaceSet {
    pub name: String,
    pub pci_paths: Vec<String>,
    pub guids: Vec<u64>,
    pub numa_nodes: Vec<u32>,
}

impl NetworkInterfaceSet {
    pub fn new<S: AsRef<str>>(
        name: &str,
        pci_paths: &[S],
        guids: &[u64],
        numa_nodes: &[u32],
    ) -> Result<Self, TopologyError> {
        let count = pci_paths.len();
        if count == 0 {
            return Err(TopologyError::InvalidArchetype(
                name.to_string(),
                "interface count must be positive".to_string(),
            ));
        }
        if guids.len() != count || numa_nodes.len() != count {
            return Err(TopologyError::InvalidArchetype(
                name.to_string(),
                format!(
                    "{} pci paths, {} guids and {} numa nodes disagree",
                    count,
                    guids.len(),
                    numa_nodes.len()
                ),
            ));
        }
        Ok(NetworkInterfaceSet {
            name: name.to_string(),
            pci_paths: pci_paths.iter().map(|p| p.as_ref().to_string()).collect(),
            guids: guids.to_vec(),
            numa_nodes: numa_nodes.to_vec(),
        })
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.pci_paths.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATHS: [&str; 4] = ["/pci/0", "/pci/1", "/pci/2", "/pci/3"];

    #[test]
    fn conn_matrix_parses_and_ignores_diagonal() {
        let rows = ["?XP.", "X-PP", "PP-X", ".PX-"];
        let conn = ConnMatrix::from_rows(4, &rows).unwrap();
        assert_eq!(conn.get(0, 0), LinkClass::SelfLink);
        assert_eq!(conn.get(0, 1), LinkClass::Direct);
        assert_eq!(conn.get(0, 3), LinkClass::None);
        assert_eq!(conn.peers_of(2, LinkClass::Direct).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn conn_matrix_rejects_asymmetry_and_unknown_codes() {
        assert!(ConnMatrix::from_rows(2, &["-X", "P-"]).is_err());
        assert!(ConnMatrix::from_rows(2, &["-Z", "Z-"]).is_err());
        assert!(ConnMatrix::from_rows(2, &["-X"]).is_err());
        assert!(ConnMatrix::from_rows(2, &["-", "X-"]).is_err());
    }

    #[test]
    fn accelerator_set_takes_leading_entries() {
        let rows = ["-XPP", "X-PP", "PP-X", "PPX-"];
        let set = AcceleratorSet::new(
            "half",
            2,
            &[0x1000, 0x2000, 0x3000, 0x4000],
            &PATHS,
            &[0, 0, 1, 1],
            &rows,
            24,
        )
        .unwrap();
        assert_eq!(set.count(), 2);
        assert_eq!(set.conn.dim(), 2);
        assert_eq!(set.bus_ids, vec![0x1000, 0x2000]);
    }

    #[test]
    fn accelerator_set_rejects_bad_input() {
        let rows = ["-P", "P-"];
        let zero = AcceleratorSet::new("zero", 0, &[1, 2], &PATHS[..2], &[0, 0], &rows, 0);
        assert!(matches!(zero, Err(TopologyError::InvalidArchetype(..))));
        let short = AcceleratorSet::new("short", 2, &[1], &PATHS[..2], &[0, 0], &rows, 0);
        assert!(short.is_err());
        let dup = AcceleratorSet::new("dup", 2, &[1, 1], &PATHS[..2], &[0, 0], &rows, 0);
        assert!(dup.is_err());
        let no_width = AcceleratorSet::new("w", 2, &[1, 2], &PATHS[..2], &[0, 0], &["-X", "X-"], 0);
        assert!(no_width.is_err());
    }

    #[test]
    fn nic_set_checks_table_lengths() {
        assert!(NetworkInterfaceSet::new("ok", &PATHS[..1], &[7], &[0]).is_ok());
        assert!(NetworkInterfaceSet::new("bad", &PATHS[..2], &[7], &[0, 1]).is_err());
        let empty: [&str; 0] = [];
        assert!(NetworkInterfaceSet::new("empty", &empty, &[], &[]).is_err());
    }

    #[test]
    fn cpu_rejects_zero_width() {
        assert!(CpuArchetype::new("cpu", 0, 12, 12).is_err());
        assert_eq!(CpuArchetype::new("cpu", 9, 12, 12).unwrap().io_width, 12);
    }
}
