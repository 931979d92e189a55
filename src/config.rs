//! Static geometry and catalog configuration, the Rust analogue of the
//! source's code-generated `Fee_Cfg.c`. An integrator builds one of
//! these in code (or, for the CLI, loads it from a config file) and
//! hands it to `Engine::new`; it never changes for the lifetime of the
//! engine.

/// Flag-page granularity; every flag page and every program unit is a
/// multiple of this.
pub const VIRTUAL_PAGE_SIZE: u32 = 8;
/// Size in bytes of a block header record on flash.
pub const BLOCK_OVERHEAD: u32 = 32;
/// Size in bytes of a cluster header record on flash.
pub const CLUSTER_OVERHEAD: u32 = 32;
/// Size of the engine's single shared scratch buffer, reused by every
/// job (read payloads, swap copies, header staging).
pub const DATA_BUFFER_SIZE: usize = 128;

pub const ERASED_VALUE: u8 = 0xFF;
pub const VALIDATED_VALUE: u8 = 0x81;
pub const INVALIDATED_VALUE: u8 = 0x18;

/// One entry in the static block catalog, sorted ascending by
/// `block_number`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockConfig {
    pub block_number: u16,
    pub block_size: u16,
    pub cluster_group: usize,
    /// If true, this block may be pre-allocated via `erase_immediate`
    /// and may be written into a cluster's reserved tail region.
    pub immediate: bool,
}

/// Static geometry of one cluster within a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterConfig {
    pub start_addr: u32,
    pub length: u32,
}

/// Static geometry of one cluster group: an ordered, rotating set of
/// clusters plus the tail region reserved for immediate blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterGroupConfig {
    pub clusters: Vec<ClusterConfig>,
    pub reserved_size: u32,
}

/// Root configuration: the full block catalog plus every cluster
/// group's geometry. Mirrors the integrator-supplied `Fee_Cfg.c`
/// catalog from the original AUTOSAR-style source; this crate's CLI
/// harness can load one from a TOML document instead of building it
/// in code (see `feecore-cli`'s `config_file` module).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeeConfig {
    pub blocks: Vec<BlockConfig>,
    pub groups: Vec<ClusterGroupConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cluster group {0} has fewer than 2 clusters")]
    TooFewClusters(usize),
    #[error("cluster {1} of group {0} is too small to hold a header and two block slots")]
    ClusterTooSmall(usize, usize),
    #[error("DATA_BUFFER_SIZE is not a multiple of VIRTUAL_PAGE_SIZE")]
    BufferNotPageMultiple,
    #[error("DATA_BUFFER_SIZE is smaller than BLOCK_OVERHEAD or CLUSTER_OVERHEAD")]
    BufferTooSmall,
    #[error("block catalog is not sorted ascending by block_number (index {0})")]
    CatalogNotSorted(usize),
    #[error("block {0} references cluster group {1}, which does not exist")]
    GroupOutOfRange(u16, usize),
}

impl FeeConfig {
    /// Validates the geometry invariants the job scheduler depends on.
    /// The original gets these for free from hand-written, reviewed
    /// tables; here they're checked once at construction time instead
    /// of trusted silently.
    pub fn validate(&self) -> Result<(), ConfigError>
    {
        if DATA_BUFFER_SIZE as u32 % VIRTUAL_PAGE_SIZE != 0 {
            return Err(ConfigError::BufferNotPageMultiple);
        }
        if (DATA_BUFFER_SIZE as u32) < BLOCK_OVERHEAD || (DATA_BUFFER_SIZE as u32) < CLUSTER_OVERHEAD {
            return Err(ConfigError::BufferTooSmall);
        }

        for (gi, group) in self.groups.iter().enumerate() {
            if group.clusters.len() < 2 {
                return Err(ConfigError::TooFewClusters(gi));
            }
            for (ci, cluster) in group.clusters.iter().enumerate() {
                if cluster.length < CLUSTER_OVERHEAD + 2 * BLOCK_OVERHEAD {
                    return Err(ConfigError::ClusterTooSmall(gi, ci));
                }
            }
        }

        for i in 1..self.blocks.len() {
            if self.blocks[i].block_number <= self.blocks[i - 1].block_number {
                return Err(ConfigError::CatalogNotSorted(i));
            }
        }

        for block in &self.blocks {
            if block.cluster_group >= self.groups.len() {
                return Err(ConfigError::GroupOutOfRange(block.block_number, block.cluster_group));
            }
        }

        Ok(())
    }

    /// Binary search of the catalog by logical block number.
    pub fn lookup(&self, block_number: u16) -> Option<usize>
    {
        self.blocks
            .binary_search_by_key(&block_number, |b| b.block_number)
            .ok()
    }
}

/// `ceil(size / VIRTUAL_PAGE_SIZE) * VIRTUAL_PAGE_SIZE`
pub fn align_to_page(size: u32) -> u32
{
    (size + VIRTUAL_PAGE_SIZE - 1) / VIRTUAL_PAGE_SIZE * VIRTUAL_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_page_rounds_up()
    {
        assert_eq!(align_to_page(0), 0);
        assert_eq!(align_to_page(1), 8);
        assert_eq!(align_to_page(8), 8);
        assert_eq!(align_to_page(9), 16);
    }

    fn sample_config() -> FeeConfig
    {
        FeeConfig {
            blocks: vec![
                BlockConfig { block_number: 1, block_size: 8, cluster_group: 0, immediate: true },
                BlockConfig { block_number: 2, block_size: 4, cluster_group: 0, immediate: true },
                BlockConfig { block_number: 3, block_size: 4, cluster_group: 0, immediate: true },
            ],
            groups: vec![ClusterGroupConfig {
                clusters: vec![
                    ClusterConfig { start_addr: 0, length: 2048 },
                    ClusterConfig { start_addr: 2048, length: 2048 },
                ],
                reserved_size: 256,
            }],
        }
    }

    #[test]
    fn validate_accepts_sample()
    {
        sample_config().validate().unwrap();
    }

    #[test]
    fn lookup_finds_and_misses()
    {
        let cfg = sample_config();
        assert_eq!(cfg.lookup(2), Some(1));
        assert_eq!(cfg.lookup(99), None);
    }

    #[test]
    fn validate_rejects_unsorted_catalog()
    {
        let mut cfg = sample_config();
        cfg.blocks.swap(0, 1);
        assert_eq!(cfg.validate(), Err(ConfigError::CatalogNotSorted(1)));
    }

    #[test]
    fn validate_rejects_single_cluster_group()
    {
        let mut cfg = sample_config();
        cfg.groups[0].clusters.truncate(1);
        assert_eq!(cfg.validate(), Err(ConfigError::TooFewClusters(0)));
    }
}
