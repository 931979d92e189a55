//! Status enums mirrored from the runtime's block and cluster bookkeeping.

/// Status of one block's header as last observed on flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    /// Header and data are both present and checksummed correctly.
    Valid,
    /// The block was explicitly invalidated.
    Invalid,
    /// Header is present but the data behind it is not trustworthy
    /// (e.g. a torn write never reached the validation flag).
    Inconsistent,
    /// Header bytes failed the checksum or flag-page contract.
    HeaderInvalid,
    /// Synonym kept distinct from `Invalid` to mirror the source's
    /// separate "invalidated by request" terminal state.
    Invalidated,
    /// Used only transiently while scanning a cluster's header chain.
    HeaderBlank,
    /// Demoted during a swap when the source payload could not be read.
    InconsistentCopy,
    /// No header for this block has ever been observed.
    NeverWritten,
}

/// Status of one cluster header as last observed on flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterStatus {
    Valid,
    Invalid,
    Inconsistent,
    HeaderInvalid,
}

/// Coarse module lifecycle state, mirroring `GetStatus`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleStatus {
    Uninit,
    Idle,
    Busy,
    BusyInternal,
}

/// Outcome of the most recently completed (or in-flight) job, mirroring
/// `GetJobResult`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobResult {
    Ok,
    Pending,
    Failed,
    Canceled,
    BlockInconsistent,
    BlockInvalid,
}
