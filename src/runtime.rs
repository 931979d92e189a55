//! Per-block and per-cluster-group mutable state, rebuilt by the scan
//! pipeline at `Init` and mutated only from inside the job scheduler.

use crate::status::BlockStatus;

/// Runtime record for one configured block. Indexed in parallel with
/// `FeeConfig::blocks`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRuntime {
    pub status: BlockStatus,
    /// Flash address of the latest data payload. 0 means not
    /// allocated.
    pub data_addr: u32,
    /// Flash address of the invalidation-flag page within the
    /// block's header. 0 means not present.
    pub invalid_addr: u32,
}

impl BlockRuntime {
    pub const fn never_written() -> Self
    {
        Self { status: BlockStatus::NeverWritten, data_addr: 0, invalid_addr: 0 }
    }
}

/// Runtime cursor state for one cluster group, established by the
/// scan pipeline and mutated only on swap completion (and by the
/// write chain as it appends).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterGroupRuntime {
    pub active_cluster_index: usize,
    /// Monotonic cluster id; 0 means no valid cluster has been found
    /// yet for this group.
    pub active_cluster_id: u32,
    /// Next free header address, grows upward from just after the
    /// active cluster's header.
    pub header_cursor: u32,
    /// Next free data address, grows downward from the active
    /// cluster's end.
    pub data_cursor: u32,
}

impl ClusterGroupRuntime {
    pub const fn unscanned() -> Self
    {
        Self { active_cluster_index: 0, active_cluster_id: 0, header_cursor: 0, data_cursor: 0 }
    }
}
