//! Shared fixtures for the end-to-end scenario tests in `tests/`.
//! Mirrors the geometry walked through in spec §8's concrete
//! scenarios: two 2048-byte clusters in one group, 256 bytes reserved
//! for immediate blocks, three small blocks.

use feecore::{BlockConfig, ClusterConfig, ClusterGroupConfig, FeeConfig};

pub const FLASH_SIZE: u32 = 4096;

/// Three blocks, all eligible for immediate pre-allocation.
pub fn sample_config() -> FeeConfig
{
    FeeConfig {
        blocks: vec![
            BlockConfig { block_number: 1, block_size: 8, cluster_group: 0, immediate: true },
            BlockConfig { block_number: 2, block_size: 4, cluster_group: 0, immediate: true },
            BlockConfig { block_number: 3, block_size: 4, cluster_group: 0, immediate: true },
        ],
        groups: vec![ClusterGroupConfig {
            clusters: vec![ClusterConfig { start_addr: 0, length: 2048 }, ClusterConfig { start_addr: 2048, length: 2048 }],
            reserved_size: 256,
        }],
    }
}

/// Same geometry, plus a fourth, non-immediate block, for the swap
/// tests that need a write the reserved-area rule can never admit.
pub fn sample_config_with_non_immediate() -> FeeConfig
{
    let mut cfg = sample_config();
    cfg.blocks.push(BlockConfig { block_number: 4, block_size: 4, cluster_group: 0, immediate: false });
    cfg
}

/// Records whether the one in-flight request ended or errored, the
/// way an integrator's real notification hooks would.
#[derive(Default, Debug)]
pub struct TrackingObserver {
    pub ends: u32,
    pub errors: u32,
}

impl feecore::EngineObserver for TrackingObserver {
    fn job_end(&mut self)
    {
        self.ends += 1;
    }

    fn job_error(&mut self)
    {
        self.errors += 1;
    }
}
