//! The compaction (swap) pipeline: erase and format the next cluster,
//! copy every live block across in catalog order, validate the
//! cluster, then resume whichever request (`Write` or
//! `EraseImmediate`) triggered it.

use super::{accept, Engine};
use crate::codec::{serialize_block_header, serialize_block_validate_page, serialize_cluster_header, serialize_cluster_validate_page};
use crate::config::{align_to_page, BLOCK_OVERHEAD, DATA_BUFFER_SIZE, VIRTUAL_PAGE_SIZE};
use crate::flash::RawFlash;
use crate::job::CurrentJob;
use crate::observer::EngineObserver;
use crate::status::{BlockStatus, JobResult, ModuleStatus};

impl<O: EngineObserver> Engine<O> {
    pub(super) fn step_int_swap_clr_fmt(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let swap = self.job.swap;
        let target = self.config.groups[swap.group].clusters[swap.target_cluster_index];
        let new_cluster_id = self.groups[swap.group].active_cluster_id + 1;

        let header = serialize_cluster_header(new_cluster_id, target.start_addr, target.length);
        let body_len = (crate::config::CLUSTER_OVERHEAD - 2 * VIRTUAL_PAGE_SIZE) as usize;

        self.job.current_job = CurrentJob::IntSwapBlock;
        accept(flash.write(target.start_addr, &header[..body_len]))
    }

    fn next_swap_candidate(&self, from: usize) -> Option<usize>
    {
        let group = self.job.swap.group;
        for i in from..self.config.blocks.len() {
            let live = matches!(self.blocks[i].status, BlockStatus::Valid | BlockStatus::Inconsistent | BlockStatus::InconsistentCopy);
            if self.config.blocks[i].cluster_group == group && live {
                return Some(i);
            }
        }
        None
    }

    pub(super) fn step_int_swap_block(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let from = self.job.swap.block_it;

        let idx = match self.next_swap_candidate(from) {
            Some(idx) => idx,
            None => {
                let swap = self.job.swap;
                let target = self.config.groups[swap.group].clusters[swap.target_cluster_index];
                let page = serialize_cluster_validate_page();
                let addr = target.start_addr + crate::config::CLUSTER_OVERHEAD - 2 * VIRTUAL_PAGE_SIZE;

                self.job.current_job = CurrentJob::IntSwapClrVldDone;
                return accept(flash.write(addr, &page));
            }
        };

        let block_cfg = self.config.blocks[idx];
        let status = self.blocks[idx].status;
        let hdr_addr = self.job.swap.hdr_addr_it;

        let data_addr = if status == BlockStatus::Valid {
            let aligned = align_to_page(block_cfg.block_size as u32);
            let new_data_addr_it = self.job.swap.data_addr_it - aligned;

            self.job.swap.data_addr_it = new_data_addr_it;
            self.job.swap.current_block = Some(idx);
            self.job.swap.block_data_addr = new_data_addr_it;
            self.job.swap.aligned_size = aligned;
            self.job.swap.addr_iterator = new_data_addr_it;
            self.job.swap.current_block_hdr_addr = hdr_addr;

            new_data_addr_it
        } else {
            0
        };

        let header = serialize_block_header(block_cfg.block_number, block_cfg.block_size, data_addr, block_cfg.immediate);
        let body_len = (BLOCK_OVERHEAD - 2 * VIRTUAL_PAGE_SIZE) as usize;

        self.job.swap.hdr_addr_it = hdr_addr + BLOCK_OVERHEAD;

        if status == BlockStatus::Valid {
            self.job.current_job = CurrentJob::IntSwapDataRead;
        } else {
            self.job.swap.block_it = idx + 1;
            self.job.current_job = CurrentJob::IntSwapBlock;
        }

        accept(flash.write(hdr_addr, &header[..body_len]))
    }

    pub(super) fn step_int_swap_data_read(&mut self, flash: &mut dyn RawFlash, buffer_valid: bool) -> JobResult
    {
        let swap = self.job.swap;

        if !buffer_valid {
            if let Some(idx) = swap.current_block {
                self.blocks[idx].status = BlockStatus::InconsistentCopy;
            }
            self.job.swap.block_it = swap.current_block.map(|i| i + 1).unwrap_or(swap.block_it);
            self.job.swap.current_block = None;
            self.job.current_job = CurrentJob::IntSwapBlock;
            return self.step_int_swap_block(flash);
        }

        let end = swap.block_data_addr + swap.aligned_size;

        if swap.addr_iterator >= end {
            let addr = swap.current_block_hdr_addr + BLOCK_OVERHEAD - 2 * VIRTUAL_PAGE_SIZE;
            let page = serialize_block_validate_page();

            self.job.swap.block_it = swap.current_block.map(|i| i + 1).unwrap_or(swap.block_it);
            self.job.swap.current_block = None;
            self.job.current_job = CurrentJob::IntSwapBlock;
            return accept(flash.write(addr, &page));
        }

        let remaining = end - swap.addr_iterator;
        let chunk = remaining.min(DATA_BUFFER_SIZE as u32) as usize;
        let idx = swap.current_block.expect("data copy requires a current block");
        let source_addr = self.blocks[idx].data_addr + (swap.addr_iterator - swap.block_data_addr);

        self.job.current_job = CurrentJob::IntSwapDataWrite;

        match flash.read(source_addr, &mut self.job.data_buffer[..chunk]) {
            Ok(()) => JobResult::Pending,
            Err(_) => self.step_int_swap_data_read(flash, false),
        }
    }

    pub(super) fn step_int_swap_data_write(&mut self, flash: &mut dyn RawFlash, buffer_valid: bool) -> JobResult
    {
        if !buffer_valid {
            return self.step_int_swap_data_read(flash, false);
        }

        let swap = self.job.swap;
        let end = swap.block_data_addr + swap.aligned_size;
        let remaining = end - swap.addr_iterator;
        let chunk = remaining.min(DATA_BUFFER_SIZE as u32) as usize;
        let dest_addr = swap.addr_iterator;

        self.job.swap.addr_iterator = swap.addr_iterator + chunk as u32;
        self.job.current_job = CurrentJob::IntSwapDataRead;

        let buf = self.job.data_buffer[..chunk].to_vec();

        match flash.write(dest_addr, &buf) {
            Ok(()) => JobResult::Pending,
            Err(_) => self.step_int_swap_data_read(flash, false),
        }
    }

    pub(super) fn step_int_swap_clr_vld_done(&mut self, _flash: &mut dyn RawFlash) -> JobResult
    {
        let swap = self.job.swap;
        let group_idx = swap.group;
        let target = self.config.groups[group_idx].clusters[swap.target_cluster_index];

        let mut hdr_it = target.start_addr + crate::config::CLUSTER_OVERHEAD;
        let mut data_it = target.start_addr + target.length;

        for i in 0..self.config.blocks.len() {
            let cfg = self.config.blocks[i];
            if cfg.cluster_group != group_idx {
                continue;
            }

            match self.blocks[i].status {
                BlockStatus::Valid | BlockStatus::Inconsistent | BlockStatus::InconsistentCopy => {
                    self.blocks[i].invalid_addr = hdr_it + BLOCK_OVERHEAD - VIRTUAL_PAGE_SIZE;

                    match self.blocks[i].status {
                        BlockStatus::Valid => {
                            let aligned = align_to_page(cfg.block_size as u32);
                            data_it -= aligned;
                            self.blocks[i].data_addr = data_it;
                        }
                        BlockStatus::InconsistentCopy => {
                            self.blocks[i].status = BlockStatus::Inconsistent;
                            self.blocks[i].data_addr = 0;
                        }
                        _ => {
                            self.blocks[i].data_addr = 0;
                        }
                    }

                    hdr_it += BLOCK_OVERHEAD;
                }
                _ => {
                    self.blocks[i].data_addr = 0;
                    self.blocks[i].invalid_addr = 0;
                }
            }
        }

        self.groups[group_idx].active_cluster_index = swap.target_cluster_index;
        self.groups[group_idx].active_cluster_id += 1;
        self.groups[group_idx].header_cursor = hdr_it;
        self.groups[group_idx].data_cursor = data_it;

        self.status = ModuleStatus::Busy;
        self.job.current_job = swap.original_job;
        JobResult::Ok
    }
}
