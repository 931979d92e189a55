//! The startup scan pipeline: `IntScan` walks every cluster's header
//! to find the active cluster per group, `IntScanClr` decides whether
//! that group needs a fresh format, and `IntScanBlockHdrParse` walks
//! the active cluster's block-header chain to rebuild runtime state.

use super::{accept, Engine};
use crate::codec::{deserialize_block_header, deserialize_cluster_header, serialize_cluster_header_prevalidated};
use crate::config::{align_to_page, BLOCK_OVERHEAD, CLUSTER_OVERHEAD, VIRTUAL_PAGE_SIZE};
use crate::flash::RawFlash;
use crate::job::{CurrentJob, ScanState};
use crate::observer::EngineObserver;
use crate::runtime::BlockRuntime;
use crate::status::{BlockStatus, ClusterStatus, JobResult};

impl<O: EngineObserver> Engine<O> {
    pub(super) fn step_int_scan(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        for group in self.groups.iter_mut() {
            *group = crate::runtime::ClusterGroupRuntime::unscanned();
        }
        for block in self.blocks.iter_mut() {
            *block = BlockRuntime::never_written();
        }
        self.job.scan = ScanState::default();

        let first = self.config.groups[0].clusters[0];
        self.job.scan.addr_iterator = first.start_addr;
        self.job.current_job = CurrentJob::IntScanClrHdrParse;

        self.submit_read(flash, first.start_addr, CLUSTER_OVERHEAD as usize)
    }

    pub(super) fn step_int_scan_clr_hdr_parse(&mut self, flash: &mut dyn RawFlash, buffer_valid: bool) -> JobResult
    {
        let group_idx = self.job.scan.group_it;
        let cluster_idx = self.job.scan.cluster_it;
        let cluster_cfg = self.config.groups[group_idx].clusters[cluster_idx];

        if buffer_valid {
            let buf = self.job.data_buffer[..CLUSTER_OVERHEAD as usize].to_vec();
            if let Ok(parsed) = deserialize_cluster_header(&buf) {
                if parsed.status == ClusterStatus::Valid
                    && parsed.start_addr == cluster_cfg.start_addr
                    && parsed.length == cluster_cfg.length
                    && parsed.cluster_id > self.groups[group_idx].active_cluster_id
                {
                    self.groups[group_idx].active_cluster_id = parsed.cluster_id;
                    self.groups[group_idx].active_cluster_index = cluster_idx;
                }
            }
        }

        let clusters_in_group = self.config.groups[group_idx].clusters.len();

        if cluster_idx + 1 < clusters_in_group {
            self.job.scan.cluster_it = cluster_idx + 1;
            let next = self.config.groups[group_idx].clusters[cluster_idx + 1];
            self.job.scan.addr_iterator = next.start_addr;
            self.job.current_job = CurrentJob::IntScanClrHdrParse;
            return self.submit_read(flash, next.start_addr, CLUSTER_OVERHEAD as usize);
        }

        if group_idx + 1 < self.config.groups.len() {
            self.job.scan.group_it = group_idx + 1;
            self.job.scan.cluster_it = 0;
            let next = self.config.groups[group_idx + 1].clusters[0];
            self.job.scan.addr_iterator = next.start_addr;
            self.job.current_job = CurrentJob::IntScanClrHdrParse;
            return self.submit_read(flash, next.start_addr, CLUSTER_OVERHEAD as usize);
        }

        self.job.scan.group_it = 0;
        self.job.scan.cluster_it = 0;
        self.step_int_scan_clr(flash)
    }

    pub(super) fn step_int_scan_clr(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let group_idx = self.job.scan.group_it;

        if group_idx >= self.config.groups.len() {
            self.job.current_job = CurrentJob::Done;
            return JobResult::Ok;
        }

        if self.groups[group_idx].active_cluster_id == 0 {
            let cluster0 = self.config.groups[group_idx].clusters[0];
            self.job.current_job = CurrentJob::IntScanClrFmt;
            return accept(flash.erase(cluster0.start_addr, cluster0.length));
        }

        let active_idx = self.groups[group_idx].active_cluster_index;
        let cluster = self.config.groups[group_idx].clusters[active_idx];

        self.groups[group_idx].header_cursor = cluster.start_addr + CLUSTER_OVERHEAD;
        self.groups[group_idx].data_cursor = cluster.start_addr + cluster.length;
        self.job.scan.addr_iterator = self.groups[group_idx].header_cursor;
        self.job.scan.swap_latch = false;

        self.job.current_job = CurrentJob::IntScanBlockHdrParse;
        self.submit_read(flash, self.job.scan.addr_iterator, BLOCK_OVERHEAD as usize)
    }

    pub(super) fn step_int_scan_clr_fmt(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let group_idx = self.job.scan.group_it;
        let cluster0 = self.config.groups[group_idx].clusters[0];

        let header = serialize_cluster_header_prevalidated(1, cluster0.start_addr, cluster0.length);
        let write_len = (CLUSTER_OVERHEAD - VIRTUAL_PAGE_SIZE) as usize;

        self.job.current_job = CurrentJob::IntScanClrFmtDone;
        accept(flash.write(cluster0.start_addr, &header[..write_len]))
    }

    pub(super) fn step_int_scan_clr_fmt_done(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let group_idx = self.job.scan.group_it;
        let cluster0 = self.config.groups[group_idx].clusters[0];

        self.groups[group_idx].active_cluster_index = 0;
        self.groups[group_idx].active_cluster_id = 1;
        self.groups[group_idx].header_cursor = cluster0.start_addr + CLUSTER_OVERHEAD;
        self.groups[group_idx].data_cursor = cluster0.start_addr + cluster0.length;

        for i in 0..self.config.blocks.len() {
            if self.config.blocks[i].cluster_group == group_idx {
                self.blocks[i] = BlockRuntime::never_written();
            }
        }

        self.job.scan.group_it = group_idx + 1;
        self.job.scan.cluster_it = 0;
        self.step_int_scan_clr(flash)
    }

    pub(super) fn step_int_scan_block_hdr_parse(&mut self, flash: &mut dyn RawFlash, buffer_valid: bool) -> JobResult
    {
        let group_idx = self.job.scan.group_it;
        let addr = self.job.scan.addr_iterator;

        let parsed = if buffer_valid {
            let buf = self.job.data_buffer[..BLOCK_OVERHEAD as usize].to_vec();
            deserialize_block_header(&buf).ok()
        } else {
            None
        };

        let advance_and_reread = |engine: &mut Self, flash: &mut dyn RawFlash| {
            engine.job.scan.addr_iterator = addr + BLOCK_OVERHEAD;
            engine.job.current_job = CurrentJob::IntScanBlockHdrParse;
            engine.submit_read(flash, addr + BLOCK_OVERHEAD, BLOCK_OVERHEAD as usize)
        };

        match parsed {
            None => {
                self.job.scan.swap_latch = true;
                self.groups[group_idx].header_cursor = addr + BLOCK_OVERHEAD;
                advance_and_reread(self, flash)
            }
            Some(p) if p.status == BlockStatus::HeaderInvalid => {
                self.job.scan.swap_latch = true;
                self.groups[group_idx].header_cursor = addr + BLOCK_OVERHEAD;
                advance_and_reread(self, flash)
            }
            Some(p) if p.status == BlockStatus::HeaderBlank => {
                if self.job.scan.swap_latch {
                    self.groups[group_idx].data_cursor = addr + 2 * BLOCK_OVERHEAD;
                    self.job.scan.swap_latch = false;
                }
                self.job.scan.group_it = group_idx + 1;
                self.job.scan.cluster_it = 0;
                self.step_int_scan_clr(flash)
            }
            Some(p) => {
                let aligned = align_to_page(p.length as u32);
                let data_cursor = self.groups[group_idx].data_cursor;
                let header_cursor = self.groups[group_idx].header_cursor;
                let lo = header_cursor + 2 * BLOCK_OVERHEAD;
                let hi = data_cursor.saturating_sub(aligned);

                let accepted = self.config.lookup(p.block_number).filter(|&idx| {
                    let cfg = self.config.blocks[idx];
                    cfg.cluster_group == group_idx
                        && cfg.block_size as u32 == p.length as u32
                        && cfg.immediate == p.immediate
                        && p.data_addr >= lo
                        && p.data_addr <= hi
                });

                match accepted {
                    Some(idx) => {
                        self.blocks[idx].status = p.status;
                        self.blocks[idx].data_addr = p.data_addr;
                        self.blocks[idx].invalid_addr = addr + BLOCK_OVERHEAD - VIRTUAL_PAGE_SIZE;
                        self.groups[group_idx].data_cursor = p.data_addr;
                    }
                    None => {
                        self.job.scan.swap_latch = true;
                    }
                }

                self.groups[group_idx].header_cursor = addr + BLOCK_OVERHEAD;
                advance_and_reread(self, flash)
            }
        }
    }

    fn submit_read(&mut self, flash: &mut dyn RawFlash, addr: u32, len: usize) -> JobResult
    {
        accept(flash.read(addr, &mut self.job.data_buffer[..len]))
    }
}
