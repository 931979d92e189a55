//! The job working set: the small mutable state a step function reads
//! and writes, threaded across scheduler ticks in place of the
//! source's file-scope statics.

use crate::config::DATA_BUFFER_SIZE;

/// Every step the scheduler can be in. A total match over this enum
/// drives the whole engine; there is no default arm anywhere a
/// `CurrentJob` is matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurrentJob {
    Read,
    Write,
    WriteData,
    WriteUnalignedData,
    WriteValidate,
    WriteDone,
    InvalBlock,
    InvalBlockDone,
    EraseImmediate,
    EraseImmediateDone,
    IntScan,
    IntScanClrHdrParse,
    IntScanClr,
    IntScanClrFmt,
    IntScanClrFmtDone,
    IntScanBlockHdrParse,
    IntSwapBlock,
    IntSwapClrFmt,
    IntSwapDataRead,
    IntSwapDataWrite,
    IntSwapClrVldDone,
    Done,
}

impl CurrentJob {
    /// Tags `MainFunction` is willing to kick a step from. Every other
    /// tag only advances through a driver callback
    /// (`job_end_notification`/`job_error_notification`).
    pub fn is_initial(self) -> bool
    {
        matches!(
            self,
            CurrentJob::IntScan | CurrentJob::Read | CurrentJob::Write | CurrentJob::InvalBlock | CurrentJob::EraseImmediate
        )
    }
}

/// A raw pointer into the caller's destination buffer for an
/// in-flight `Read`, kept across scheduler ticks the way the source
/// keeps a static `Fee_pJobReadDataDestPtr`.
///
/// # Safety contract
/// The engine is strictly single-threaded cooperative (see the crate's
/// concurrency model): only one request is ever in flight, the pointer
/// is set at the start of `Engine::read` and cleared the moment the
/// read either completes or fails, and no other code may observe or
/// alias the destination slice while a read job is pending. Under
/// those conditions the pointer outlives every use made of it.
#[derive(Debug)]
pub(crate) struct ReadDest {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: `ReadDest` never aliases the pointee from more than one
// place at a time (see the type-level contract above), so moving one
// to another thread along with the `Engine` that owns it carries no
// more risk than moving the `&mut [u8]` it was built from would.
unsafe impl Send for ReadDest {}

impl ReadDest {
    /// # Safety
    /// `buf` must remain valid and exclusively owned by the engine for
    /// as long as the resulting `ReadDest` is alive.
    pub(crate) unsafe fn new(buf: &mut [u8]) -> Self
    {
        Self { ptr: buf.as_mut_ptr(), len: buf.len() }
    }

    pub(crate) fn len(&self) -> usize
    {
        self.len
    }

    /// Copies `src` into the destination buffer starting at byte
    /// `offset`. Panics if the write would run past the buffer, which
    /// would indicate a bug in the caller rather than a flash fault.
    pub(crate) fn copy_from(&mut self, offset: usize, src: &[u8])
    {
        assert!(offset + src.len() <= self.len, "read destination write out of bounds");
        // SAFETY: see the type-level contract; `offset + src.len() <=
        // self.len` was just checked.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(offset), src.len());
        }
    }

    /// Hands out the destination region as a slice so the driver can
    /// write into the caller's own buffer directly.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8]
    {
        // SAFETY: see the type-level contract.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

/// Iterator state for the startup scan pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ScanState {
    pub group_it: usize,
    pub cluster_it: usize,
    /// Current read address while walking either the cluster-header
    /// chain or a cluster's block-header chain.
    pub addr_iterator: u32,
    /// Set when a header in the current group's active cluster was
    /// found invalid or mismatched; forces `data_cursor` to be rearmed
    /// so the next write triggers a swap.
    pub swap_latch: bool,
}

/// Iterator state for the compaction (swap) pipeline.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SwapState {
    pub original_job: CurrentJob,
    pub group: usize,
    pub target_cluster_index: usize,
    /// Next block-catalog index to consider when looking for the next
    /// live block to copy.
    pub block_it: usize,
    /// Next free header-write position in the target cluster.
    pub hdr_addr_it: u32,
    /// Next free data-write position in the target cluster.
    pub data_addr_it: u32,
    /// Block currently being copied, if its payload copy is underway.
    pub current_block: Option<usize>,
    /// Base target address of the current block's payload.
    pub block_data_addr: u32,
    /// Aligned payload length of the current block.
    pub aligned_size: u32,
    /// Target-side write cursor for the in-progress payload copy;
    /// ranges over `[block_data_addr, block_data_addr + aligned_size]`.
    pub addr_iterator: u32,
    /// Header address used for the block currently being copied, kept
    /// so its own validate flag can be written once the copy finishes.
    pub current_block_hdr_addr: u32,
}

impl Default for SwapState {
    fn default() -> Self
    {
        Self {
            original_job: CurrentJob::Done,
            group: 0,
            target_cluster_index: 0,
            block_it: 0,
            hdr_addr_it: 0,
            data_addr_it: 0,
            current_block: None,
            block_data_addr: 0,
            aligned_size: 0,
            addr_iterator: 0,
            current_block_hdr_addr: 0,
        }
    }
}

/// The full job working set: inputs to the current request plus the
/// scan/swap iterators and the one shared data buffer.
pub(crate) struct JobState {
    pub current_job: CurrentJob,
    pub block_index: Option<usize>,
    pub block_offset: u32,
    pub block_length: u32,
    pub data_buffer: [u8; DATA_BUFFER_SIZE],
    /// Caller-owned payload for an in-flight `Write`. Unlike the read
    /// destination, this can simply be cloned in rather than aliased,
    /// since ownership transfers to the engine at the call site.
    pub write_payload: Vec<u8>,
    pub read_dest: Option<ReadDest>,
    pub scan: ScanState,
    pub swap: SwapState,
}

impl Default for JobState {
    fn default() -> Self
    {
        Self {
            current_job: CurrentJob::Done,
            block_index: None,
            block_offset: 0,
            block_length: 0,
            data_buffer: [0; DATA_BUFFER_SIZE],
            write_payload: Vec::new(),
            read_dest: None,
            scan: ScanState::default(),
            swap: SwapState::default(),
        }
    }
}
