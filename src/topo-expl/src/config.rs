use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CATALOG: &str = include_str!("../catalog/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CpuDef {
    pub name: String,
    pub model: String,
    pub inter_socket_width: u32,
    pub cpu_io_width: u32,
    pub io_width: u32,
}

// per-device tables shared by several accelerator sets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceLayoutDef {
    pub name: String,
    pub bus_ids: Vec<u64>,
    pub pci_paths: Vec<String>,
    pub numa_nodes: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkMatrixDef {
    pub name: String,
    pub rows: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceleratorDef {
    pub name: String,
    pub count: usize,
    pub layout: String,
    pub links: String,
    #[serde(default)]
    pub direct_link_width: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NicDef {
    pub name: String,
    pub pci_paths: Vec<String>,
    pub guids: Vec<u64>,
    pub numa_nodes: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeTemplateDef {
    pub name: String,
    pub cpu: String,
    pub accelerators: String,
    pub nics: String,
    pub description: String,
}

fn default_node_count() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeCountDef {
    pub template: String,
    #[serde(default = "default_node_count")]
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDef {
    pub id: String,
    pub description: String,
    pub nodes: Vec<NodeCountDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    pub cpu: Vec<CpuDef>,
    pub device_layout: Vec<DeviceLayoutDef>,
    pub link_matrix: Vec<LinkMatrixDef>,
    pub accelerators: Vec<AcceleratorDef>,
    pub nics: Vec<NicDef>,
    pub node: Vec<NodeTemplateDef>,
    pub model: Vec<ModelDef>,
}

impl CatalogConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_str(&content)?;
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_builtin_catalog() {
        let config = CatalogConfig::from_str(DEFAULT_CATALOG).unwrap();
        assert_eq!(config.model.len(), 10);
        assert_eq!(config.cpu.len(), 2);
        let mixed = config.model.last().unwrap();
        assert_eq!(mixed.nodes.iter().map(|n| n.count).sum::<usize>(), 6);
        let rome = config.nics.iter().find(|n| n.name == "nic_2_rome").unwrap();
        assert_eq!(rome.guids, vec![0x0c42a10300e3e1a0, 0x0c42a10300e3e1a8]);
    }

    #[test]
    fn rejects_unknown_fields() {
        let content = r#"
            cpu = []
            device_layout = []
            link_matrix = []
            accelerators = []
            nics = []
            node = []
            model = []
            extra = 1
        "#;
        assert!(CatalogConfig::from_str(content).is_err());
    }
}
