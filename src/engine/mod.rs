//! The engine: owns every piece of mutable state and exposes the
//! public request API. Step functions for the scan and swap pipelines
//! live in sibling modules but are all `impl Engine` blocks on the
//! same type, mirroring how the source keeps one flat file-scope state
//! machine.

mod read;
mod scan;
mod swap;
mod write;

use crate::config::{align_to_page, ConfigError, FeeConfig, BLOCK_OVERHEAD, CLUSTER_OVERHEAD, VIRTUAL_PAGE_SIZE};
use crate::error::RawFlashError;
use crate::flash::RawFlash;
use crate::job::{CurrentJob, JobState, ReadDest};
use crate::observer::EngineObserver;
use crate::runtime::{BlockRuntime, ClusterGroupRuntime};
use crate::status::{JobResult, ModuleStatus};

/// Top-level engine state: static configuration, per-block and
/// per-cluster-group runtime, the job working set, and the upper
/// layer's notification hooks.
///
/// `Engine` has no interior mutability — every operation takes `&mut
/// self` — so it is `Send` whenever `O` is, and may be handed across
/// an integrator's own thread boundary between requests. It is not
/// `Sync`: nothing needs shared read access to one instance, and the
/// single-threaded cooperative model (see the crate's concurrency
/// model) forbids concurrent access outright.
pub struct Engine<O: EngineObserver = ()> {
    config: FeeConfig,
    blocks: Vec<BlockRuntime>,
    groups: Vec<ClusterGroupRuntime>,
    job: JobState,
    status: ModuleStatus,
    last_job_result: JobResult,
    observer: O,
}

/// Turns a raw-flash submission's accept/reject outcome into the
/// step-level result: accepted work is always asynchronous.
fn accept(result: Result<(), RawFlashError>) -> JobResult
{
    match result {
        Ok(()) => JobResult::Pending,
        Err(_) => JobResult::Failed,
    }
}

impl<O: EngineObserver> Engine<O> {
    /// Builds a fresh, uninitialized engine over `config`. Returns an
    /// error if the geometry is not self-consistent; see
    /// `FeeConfig::validate`.
    pub fn new(config: FeeConfig, observer: O) -> Result<Self, ConfigError>
    {
        config.validate()?;

        let blocks = vec![BlockRuntime::never_written(); config.blocks.len()];
        let groups = vec![ClusterGroupRuntime::unscanned(); config.groups.len()];

        Ok(Self {
            config,
            blocks,
            groups,
            job: JobState::default(),
            status: ModuleStatus::Uninit,
            last_job_result: JobResult::Ok,
            observer,
        })
    }

    pub fn status(&self) -> ModuleStatus
    {
        self.status
    }

    pub fn job_result(&self) -> JobResult
    {
        self.last_job_result
    }

    pub fn observer(&self) -> &O
    {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O
    {
        &mut self.observer
    }

    fn accept_idle_only(&self) -> bool
    {
        self.status == ModuleStatus::Idle
    }

    /// Reads `buf.len()` bytes of `block_number`'s payload starting at
    /// `offset`. Rejected unless the module is `Idle`.
    ///
    /// # Safety-relevant contract
    /// `buf` must not be touched by the caller again until the request
    /// completes (observed via `job_result`/the observer), since the
    /// engine writes into it from a later scheduler tick.
    pub fn read(&mut self, block_number: u16, offset: u32, buf: &mut [u8]) -> bool
    {
        if !self.accept_idle_only() {
            return false;
        }
        let idx = match self.config.lookup(block_number) {
            Some(idx) => idx,
            None => return false,
        };

        self.job.block_index = Some(idx);
        self.job.block_offset = offset;
        self.job.block_length = buf.len() as u32;
        // SAFETY: the engine is single-threaded and non-reentrant; `buf`
        // is not observed again until this request finishes.
        self.job.read_dest = Some(unsafe { ReadDest::new(buf) });
        self.job.current_job = CurrentJob::Read;
        self.status = ModuleStatus::Busy;
        self.last_job_result = JobResult::Pending;
        true
    }

    /// Writes `data` as the new payload for `block_number`. `data.len()`
    /// must match the block's configured size. Rejected unless the
    /// module is `Idle` — tighter than the general rule, since a write
    /// admitted mid-scan or mid-swap could race the cursors those
    /// internal jobs are still rebuilding.
    pub fn write(&mut self, block_number: u16, data: &[u8]) -> bool
    {
        if !self.accept_idle_only() {
            return false;
        }
        let idx = match self.config.lookup(block_number) {
            Some(idx) => idx,
            None => return false,
        };
        if data.len() != self.config.blocks[idx].block_size as usize {
            return false;
        }

        self.job.block_index = Some(idx);
        self.job.block_length = data.len() as u32;
        self.job.write_payload = data.to_vec();
        self.job.current_job = CurrentJob::Write;
        self.status = ModuleStatus::Busy;
        self.last_job_result = JobResult::Pending;
        true
    }

    /// Invalidates `block_number`. Must be called only while `Idle`.
    pub fn invalidate_block(&mut self, block_number: u16) -> bool
    {
        if !self.accept_idle_only() {
            return false;
        }
        let idx = match self.config.lookup(block_number) {
            Some(idx) => idx,
            None => return false,
        };

        self.job.block_index = Some(idx);
        self.job.current_job = CurrentJob::InvalBlock;
        self.status = ModuleStatus::Busy;
        self.last_job_result = JobResult::Pending;
        true
    }

    /// Pre-allocates space for an `immediate` block without writing any
    /// payload. Rejected for non-immediate blocks and unless `Idle`.
    pub fn erase_immediate_block(&mut self, block_number: u16) -> bool
    {
        if !self.accept_idle_only() {
            return false;
        }
        let idx = match self.config.lookup(block_number) {
            Some(idx) => idx,
            None => return false,
        };
        if !self.config.blocks[idx].immediate {
            return false;
        }

        self.job.block_index = Some(idx);
        self.job.current_job = CurrentJob::EraseImmediate;
        self.status = ModuleStatus::Busy;
        self.last_job_result = JobResult::Pending;
        true
    }

    /// Starts (or restarts) the startup scan. Rejected while a request
    /// is already in flight.
    pub fn init(&mut self) -> bool
    {
        if matches!(self.status, ModuleStatus::Busy | ModuleStatus::BusyInternal) {
            return false;
        }

        self.job = JobState::default();
        self.job.current_job = CurrentJob::IntScan;
        self.status = ModuleStatus::BusyInternal;
        self.last_job_result = JobResult::Pending;
        true
    }

    /// Must be invoked periodically. Steps the scheduler exactly once
    /// when the current tag is one the public API starts a request
    /// from; every other tag only advances through a driver
    /// notification.
    pub fn main_function(&mut self, flash: &mut dyn RawFlash)
    {
        if self.last_job_result != JobResult::Pending {
            return;
        }
        if !self.job.current_job.is_initial() {
            return;
        }

        let result = self.schedule(flash);
        self.apply_dispatch(result);
    }

    /// Invoked by the integrator once it has observed the previously
    /// submitted raw-flash operation succeed.
    pub fn job_end_notification(&mut self, flash: &mut dyn RawFlash)
    {
        let result = if self.job.current_job == CurrentJob::Done {
            JobResult::Ok
        } else {
            self.schedule(flash)
        };

        self.apply_dispatch(result);
    }

    /// Invoked by the integrator once it has observed the previously
    /// submitted raw-flash operation fail (or be canceled). Routes a
    /// handful of tags into their recovery path; every other tag
    /// simply adopts the failure.
    pub fn job_error_notification(&mut self, flash: &mut dyn RawFlash)
    {
        let result = match self.job.current_job {
            CurrentJob::IntScanBlockHdrParse => self.step_int_scan_block_hdr_parse(flash, false),
            CurrentJob::IntScanClrHdrParse => self.step_int_scan_clr_hdr_parse(flash, false),
            CurrentJob::IntSwapDataWrite => self.step_int_swap_data_write(flash, false),
            CurrentJob::Write
            | CurrentJob::WriteData
            | CurrentJob::WriteUnalignedData
            | CurrentJob::EraseImmediate
            | CurrentJob::EraseImmediateDone
            | CurrentJob::WriteValidate
            | CurrentJob::WriteDone => {
                self.rewind_group_cursor_for_current_block();
                JobResult::Failed
            }
            _ => JobResult::Failed,
        };

        let result = self.run_from(flash, result);
        self.apply_dispatch(result);
    }

    /// Drives the scheduler forward, re-dispatching the current tag
    /// while steps keep completing synchronously (`OK`), and stopping
    /// on `PENDING` or any terminal result.
    fn schedule(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        self.run_from(flash, JobResult::Ok)
    }

    fn run_from(&mut self, flash: &mut dyn RawFlash, mut result: JobResult) -> JobResult
    {
        loop {
            match result {
                JobResult::Ok => {
                    if self.job.current_job == CurrentJob::Done {
                        return JobResult::Ok;
                    }
                    result = self.dispatch_step(flash);
                }
                other => return other,
            }
        }
    }

    fn dispatch_step(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        match self.job.current_job {
            CurrentJob::Read => self.step_read(flash),
            CurrentJob::Write => self.step_write(flash),
            CurrentJob::WriteData => self.step_write_data(flash),
            CurrentJob::WriteUnalignedData => self.step_write_unaligned_data(flash),
            CurrentJob::WriteValidate => self.step_write_validate(flash),
            CurrentJob::WriteDone => self.step_write_done(flash),
            CurrentJob::InvalBlock => self.step_inval_block(flash),
            CurrentJob::InvalBlockDone => self.step_inval_block_done(flash),
            CurrentJob::EraseImmediate => self.step_erase_immediate(flash),
            CurrentJob::EraseImmediateDone => self.step_erase_immediate_done(flash),
            CurrentJob::IntScan => self.step_int_scan(flash),
            CurrentJob::IntScanClrHdrParse => self.step_int_scan_clr_hdr_parse(flash, true),
            CurrentJob::IntScanClr => self.step_int_scan_clr(flash),
            CurrentJob::IntScanClrFmt => self.step_int_scan_clr_fmt(flash),
            CurrentJob::IntScanClrFmtDone => self.step_int_scan_clr_fmt_done(flash),
            CurrentJob::IntScanBlockHdrParse => self.step_int_scan_block_hdr_parse(flash, true),
            CurrentJob::IntSwapBlock => self.step_int_swap_block(flash),
            CurrentJob::IntSwapClrFmt => self.step_int_swap_clr_fmt(flash),
            CurrentJob::IntSwapDataRead => self.step_int_swap_data_read(flash, true),
            CurrentJob::IntSwapDataWrite => self.step_int_swap_data_write(flash, true),
            CurrentJob::IntSwapClrVldDone => self.step_int_swap_clr_vld_done(flash),
            CurrentJob::Done => {
                log::warn!("scheduler dispatched while already DONE; treating as a no-op");
                JobResult::Ok
            }
        }
    }

    fn apply_dispatch(&mut self, result: JobResult)
    {
        self.last_job_result = result;

        match result {
            JobResult::Pending => {}
            JobResult::Ok => self.finish_request(true),
            _ => self.finish_request(false),
        }
    }

    fn finish_request(&mut self, success: bool)
    {
        let was_internal = self.status == ModuleStatus::BusyInternal;
        self.status = ModuleStatus::Idle;
        self.job.read_dest = None;

        if was_internal {
            return;
        }

        if success {
            self.observer.job_end();
        } else {
            self.observer.job_error();
        }
    }

    /// Begins the compaction pipeline for `group_idx`, saving
    /// `original_job` so the scheduler can resume it once the swap
    /// finishes.
    fn begin_swap(&mut self, flash: &mut dyn RawFlash, group_idx: usize, original_job: CurrentJob) -> JobResult
    {
        self.status = ModuleStatus::BusyInternal;

        let group_cfg = &self.config.groups[group_idx];
        let group_rt = self.groups[group_idx];
        let target_index = (group_rt.active_cluster_index + 1) % group_cfg.clusters.len();
        let target = group_cfg.clusters[target_index];

        self.job.swap.original_job = original_job;
        self.job.swap.group = group_idx;
        self.job.swap.target_cluster_index = target_index;
        self.job.swap.block_it = 0;
        self.job.swap.hdr_addr_it = target.start_addr + CLUSTER_OVERHEAD;
        self.job.swap.data_addr_it = target.start_addr + target.length;
        self.job.swap.current_block = None;

        self.job.current_job = CurrentJob::IntSwapClrFmt;
        accept(flash.erase(target.start_addr, target.length))
    }

    fn rewind_group_cursor_for_current_block(&mut self)
    {
        if let Some(idx) = self.job.block_index {
            let group_idx = self.config.blocks[idx].cluster_group;
            let header_cursor = self.groups[group_idx].header_cursor;
            self.groups[group_idx].data_cursor = header_cursor + 2 * BLOCK_OVERHEAD;
        }
    }

    /// §4.5: decides whether the currently requested block may append
    /// into the active cluster without first triggering a swap.
    fn reserved_area_writable(&self, block_index: usize) -> bool
    {
        let block_cfg = &self.config.blocks[block_index];
        let group_idx = block_cfg.cluster_group;
        let group_rt = self.groups[group_idx];
        let group_cfg = &self.config.groups[group_idx];

        let available = group_rt.data_cursor - group_rt.header_cursor;
        let aligned = align_to_page(block_cfg.block_size as u32);

        if aligned + 2 * BLOCK_OVERHEAD > available {
            return false;
        }

        if aligned + 2 * BLOCK_OVERHEAD + group_cfg.reserved_size <= available {
            return true;
        }

        if !block_cfg.immediate {
            return false;
        }

        let block_rt = self.blocks[block_index];
        if block_rt.invalid_addr == 0 && block_rt.data_addr == 0 {
            return true;
        }

        (block_rt.data_addr - (block_rt.invalid_addr + VIRTUAL_PAGE_SIZE)) > (BLOCK_OVERHEAD + group_cfg.reserved_size)
    }

    /// Read-only introspection of one block's runtime record, by
    /// logical block number. Not part of the original source's public
    /// surface (it has no "peek at one block's bookkeeping" API), but
    /// a natural, side-effect-free addition for integrators and tests
    /// that want to assert on recovered state without driving a full
    /// request.
    pub fn block_runtime(&self, block_number: u16) -> Option<BlockRuntime>
    {
        self.config.lookup(block_number).map(|idx| self.blocks[idx])
    }

    /// Read-only introspection of one cluster group's cursor state.
    pub fn cluster_group_runtime(&self, group: usize) -> Option<ClusterGroupRuntime>
    {
        self.groups.get(group).copied()
    }
}
