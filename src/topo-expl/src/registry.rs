use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{CatalogConfig, DEFAULT_CATALOG};
use crate::topology::{
    AcceleratorSet, CpuArchetype, NetworkInterfaceSet, NetworkModel, NodeModel, TopologyError,
};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Duplicated {0} name {1}")]
    DuplicatedName(&'static str, String),
    #[error("{0} {1} references unknown {2} {3}")]
    UnknownReference(&'static str, String, &'static str, String),
    #[error("Model {0} has no nodes")]
    EmptyModel(String),
    #[error("Model id {0} is all digits and would shadow a model index")]
    NumericModelId(String),
    #[error("Invalid model id {0}")]
    UnknownModel(String),
}

/// A named cluster configuration: node templates in append order.
#[derive(Clone, Debug)]
pub struct ModelEntry {
    pub index: usize,
    pub id: String,
    pub description: String,
    nodes: Vec<(NodeModel, usize)>,
}

impl ModelEntry {
    /// Appends every node of the model. Nodes built from one template
    /// share its bus ids, so bus ids are only unique within a node.
    pub fn build(&self) -> NetworkModel {
        if self.nodes.iter().any(|(_, count)| *count > 1) {
            log::debug!(
                "Model {} replicates node templates, bus ids repeat across nodes",
                self.id
            );
        }
        let mut network = NetworkModel::new();
        for (template, count) in self.nodes.iter() {
            for _ in 0..*count {
                network.append_node(template.clone());
            }
        }
        network
    }
}

pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
}

fn index_by_name<'a, T>(
    kind: &'static str,
    items: &'a [T],
    name: impl Fn(&T) -> &str,
) -> Result<HashMap<&'a str, &'a T>, CatalogError> {
    let mut map = HashMap::with_capacity(items.len());
    for item in items {
        if map.insert(name(item), item).is_some() {
            return Err(CatalogError::DuplicatedName(kind, name(item).to_string()));
        }
    }
    Ok(map)
}

fn resolve<'a, T>(
    map: &HashMap<&str, &'a T>,
    from_kind: &'static str,
    from: &str,
    kind: &'static str,
    name: &str,
) -> Result<&'a T, CatalogError> {
    map.get(name).copied().ok_or_else(|| {
        CatalogError::UnknownReference(from_kind, from.to_string(), kind, name.to_string())
    })
}

impl ModelCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        let config = CatalogConfig::from_str(DEFAULT_CATALOG)?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        // maps are only used for lookups, validation walks the tables in file order
        index_by_name("cpu", &config.cpu, |c| c.name.as_str())?;
        let layouts = index_by_name("device layout", &config.device_layout, |l| l.name.as_str())?;
        let matrices = index_by_name("link matrix", &config.link_matrix, |m| m.name.as_str())?;
        index_by_name("accelerator set", &config.accelerators, |a| a.name.as_str())?;
        index_by_name("nic set", &config.nics, |n| n.name.as_str())?;
        index_by_name("node template", &config.node, |n| n.name.as_str())?;
        index_by_name("model", &config.model, |m| m.id.as_str())?;
        if let Some(def) = config
            .model
            .iter()
            .find(|m| !m.id.is_empty() && m.id.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(CatalogError::NumericModelId(def.id.clone()));
        }

        let mut cpu_archetypes = HashMap::new();
        for def in config.cpu.iter() {
            let cpu = CpuArchetype::new(
                &def.model,
                def.inter_socket_width,
                def.cpu_io_width,
                def.io_width,
            )?;
            cpu_archetypes.insert(def.name.as_str(), Arc::new(cpu));
        }
        let mut gpu_sets = HashMap::new();
        for def in config.accelerators.iter() {
            let name = def.name.as_str();
            let layout = resolve(&layouts, "accelerator set", name, "device layout", &def.layout)?;
            let matrix = resolve(&matrices, "accelerator set", name, "link matrix", &def.links)?;
            let gpus = AcceleratorSet::new(
                name,
                def.count,
                &layout.bus_ids,
                &layout.pci_paths[..],
                &layout.numa_nodes,
                &matrix.rows[..],
                def.direct_link_width,
            )?;
            gpu_sets.insert(name, Arc::new(gpus));
        }
        let mut nic_sets = HashMap::new();
        for def in config.nics.iter() {
            let name = def.name.as_str();
            let nics =
                NetworkInterfaceSet::new(name, &def.pci_paths[..], &def.guids, &def.numa_nodes)?;
            nic_sets.insert(name, Arc::new(nics));
        }
        let mut node_templates = HashMap::new();
        for def in config.node.iter() {
            let name = def.name.as_str();
            let missing = |kind: &'static str, target: &str| {
                CatalogError::UnknownReference(
                    "node template",
                    name.to_string(),
                    kind,
                    target.to_string(),
                )
            };
            let cpu = cpu_archetypes
                .get(def.cpu.as_str())
                .ok_or_else(|| missing("cpu", &def.cpu))?;
            let gpus = gpu_sets
                .get(def.accelerators.as_str())
                .ok_or_else(|| missing("accelerator set", &def.accelerators))?;
            let nics = nic_sets
                .get(def.nics.as_str())
                .ok_or_else(|| missing("nic set", &def.nics))?;
            let node = NodeModel::new(
                Arc::clone(cpu),
                Arc::clone(gpus),
                Arc::clone(nics),
                &def.description,
            );
            node_templates.insert(name, node);
        }

        let mut entries = Vec::with_capacity(config.model.len());
        for (index, def) in config.model.iter().enumerate() {
            let mut nodes = Vec::with_capacity(def.nodes.len());
            for group in def.nodes.iter() {
                let template = node_templates.get(group.template.as_str()).ok_or_else(|| {
                    CatalogError::UnknownReference(
                        "model",
                        def.id.clone(),
                        "node template",
                        group.template.clone(),
                    )
                })?;
                if group.count > 0 {
                    nodes.push((template.clone(), group.count));
                }
            }
            if nodes.is_empty() {
                return Err(CatalogError::EmptyModel(def.id.clone()));
            }
            entries.push(ModelEntry {
                index,
                id: def.id.clone(),
                description: def.description.clone(),
                nodes,
            });
        }
        log::debug!("Loaded catalog with {} models", entries.len());
        Ok(ModelCatalog { entries })
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Looks a model up by positional index or stable id.
    pub fn lookup(&self, key: &str) -> Result<&ModelEntry, CatalogError> {
        let by_index = key.parse::<usize>().ok().and_then(|i| self.entries.get(i));
        by_index
            .or_else(|| self.entries.iter().find(|e| e.id == key))
            .ok_or_else(|| CatalogError::UnknownModel(key.to_string()))
    }
}
