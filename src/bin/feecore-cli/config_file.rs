//! Loads a `FeeConfig` from a TOML document. This is a convenience for
//! the CLI harness only — the library itself takes configuration as a
//! plain Rust value built by the integrator (see `feecore::config`).

use std::path::Path;

use anyhow::{Context, Result};
use feecore::{BlockConfig, ClusterConfig, ClusterGroupConfig, FeeConfig};
use serde::Deserialize;

#[derive(Deserialize)]
struct BlockEntry {
    block_number: u16,
    block_size: u16,
    cluster_group: usize,
    #[serde(default)]
    immediate: bool,
}

#[derive(Deserialize)]
struct ClusterEntry {
    start_addr: u32,
    length: u32,
}

#[derive(Deserialize)]
struct GroupEntry {
    clusters: Vec<ClusterEntry>,
    reserved_size: u32,
}

#[derive(Deserialize)]
struct ConfigFile {
    blocks: Vec<BlockEntry>,
    groups: Vec<GroupEntry>,
}

/// Reads and parses a TOML config file into a `FeeConfig`. Does not
/// call `FeeConfig::validate` — the caller does that once, right
/// before handing the config to `Engine::new`.
pub fn load(path: &Path) -> Result<FeeConfig>
{
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    let parsed: ConfigFile = toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?;

    let blocks = parsed
        .blocks
        .into_iter()
        .map(|b| BlockConfig { block_number: b.block_number, block_size: b.block_size, cluster_group: b.cluster_group, immediate: b.immediate })
        .collect();

    let groups = parsed
        .groups
        .into_iter()
        .map(|g| ClusterGroupConfig {
            clusters: g.clusters.into_iter().map(|c| ClusterConfig { start_addr: c.start_addr, length: c.length }).collect(),
            reserved_size: g.reserved_size,
        })
        .collect();

    Ok(FeeConfig { blocks, groups })
}
