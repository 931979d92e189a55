//! The write chain (`Write` → `WriteData` → [`WriteUnalignedData`] →
//! `WriteValidate` → `WriteDone`), the invalidate chain (`InvalBlock` →
//! `InvalBlockDone`) and the erase-immediate chain (`EraseImmediate` →
//! `EraseImmediateDone`).

use super::{accept, Engine};
use crate::codec::{serialize_block_header, serialize_block_invalidate_page, serialize_block_validate_page};
use crate::config::{align_to_page, BLOCK_OVERHEAD, ERASED_VALUE, VIRTUAL_PAGE_SIZE};
use crate::flash::RawFlash;
use crate::job::CurrentJob;
use crate::observer::EngineObserver;
use crate::status::{BlockStatus, JobResult};

impl<O: EngineObserver> Engine<O> {
    pub(super) fn step_write(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("write requires a resolved block index");
        let block_cfg = self.config.blocks[idx];
        let group_idx = block_cfg.cluster_group;

        if !self.reserved_area_writable(idx) {
            return self.begin_swap(flash, group_idx, CurrentJob::Write);
        }

        let group_rt = self.groups[group_idx];
        let aligned = align_to_page(block_cfg.block_size as u32);
        let data_addr = group_rt.data_cursor - aligned;
        let header_addr = group_rt.header_cursor;

        let header = serialize_block_header(block_cfg.block_number, block_cfg.block_size, data_addr, block_cfg.immediate);
        let body_len = (BLOCK_OVERHEAD - 2 * VIRTUAL_PAGE_SIZE) as usize;

        self.job.current_job = CurrentJob::WriteData;
        accept(flash.write(header_addr, &header[..body_len]))
    }

    pub(super) fn step_write_data(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("write requires a resolved block index");
        let block_cfg = self.config.blocks[idx];
        let group_idx = block_cfg.cluster_group;
        let group_rt = self.groups[group_idx];

        let aligned = align_to_page(block_cfg.block_size as u32);
        let data_addr = group_rt.data_cursor - aligned;
        let header_addr = group_rt.header_cursor;
        let invalid_addr = header_addr + BLOCK_OVERHEAD - VIRTUAL_PAGE_SIZE;

        self.blocks[idx].data_addr = data_addr;
        self.blocks[idx].invalid_addr = invalid_addr;
        self.blocks[idx].status = BlockStatus::Inconsistent;

        self.groups[group_idx].header_cursor = header_addr + BLOCK_OVERHEAD;
        self.groups[group_idx].data_cursor = data_addr;

        let size = block_cfg.block_size as u32;
        let payload = self.job.write_payload.clone();

        if size < VIRTUAL_PAGE_SIZE {
            let mut page = [ERASED_VALUE; VIRTUAL_PAGE_SIZE as usize];
            page[..size as usize].copy_from_slice(&payload);
            self.job.current_job = CurrentJob::WriteValidate;
            accept(flash.write(data_addr, &page))
        } else if aligned == size {
            self.job.current_job = CurrentJob::WriteValidate;
            accept(flash.write(data_addr, &payload))
        } else {
            let prefix_len = (size - size % VIRTUAL_PAGE_SIZE) as usize;
            self.job.current_job = CurrentJob::WriteUnalignedData;
            accept(flash.write(data_addr, &payload[..prefix_len]))
        }
    }

    pub(super) fn step_write_unaligned_data(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("write requires a resolved block index");
        let block_cfg = self.config.blocks[idx];
        let size = block_cfg.block_size as u32;
        let prefix_len = (size - size % VIRTUAL_PAGE_SIZE) as usize;

        let tail = self.job.write_payload[prefix_len..].to_vec();
        let mut page = [ERASED_VALUE; VIRTUAL_PAGE_SIZE as usize];
        page[..tail.len()].copy_from_slice(&tail);

        let data_addr = self.blocks[idx].data_addr + prefix_len as u32;

        self.job.current_job = CurrentJob::WriteValidate;
        accept(flash.write(data_addr, &page))
    }

    pub(super) fn step_write_validate(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("write requires a resolved block index");
        let page = serialize_block_validate_page();
        let addr = self.blocks[idx].invalid_addr - VIRTUAL_PAGE_SIZE;

        self.job.current_job = CurrentJob::WriteDone;
        accept(flash.write(addr, &page))
    }

    pub(super) fn step_write_done(&mut self, _flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("write requires a resolved block index");
        self.blocks[idx].status = BlockStatus::Valid;
        self.job.current_job = CurrentJob::Done;
        JobResult::Ok
    }

    pub(super) fn step_inval_block(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("invalidate requires a resolved block index");

        match self.blocks[idx].status {
            BlockStatus::Invalid | BlockStatus::Invalidated | BlockStatus::NeverWritten => {
                self.blocks[idx].status = BlockStatus::Invalid;
                self.job.current_job = CurrentJob::Done;
                JobResult::Ok
            }
            _ => {
                let page = serialize_block_invalidate_page();
                let addr = self.blocks[idx].invalid_addr;
                self.job.current_job = CurrentJob::InvalBlockDone;
                accept(flash.write(addr, &page))
            }
        }
    }

    pub(super) fn step_inval_block_done(&mut self, _flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("invalidate requires a resolved block index");
        self.blocks[idx].status = BlockStatus::Invalid;
        self.job.current_job = CurrentJob::Done;
        JobResult::Ok
    }

    pub(super) fn step_erase_immediate(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("erase_immediate requires a resolved block index");
        let group_idx = self.config.blocks[idx].cluster_group;

        if !self.reserved_area_writable(idx) {
            return self.begin_swap(flash, group_idx, CurrentJob::EraseImmediate);
        }

        self.job.current_job = CurrentJob::EraseImmediateDone;
        JobResult::Ok
    }

    pub(super) fn step_erase_immediate_done(&mut self, _flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("erase_immediate requires a resolved block index");
        let block_cfg = self.config.blocks[idx];
        let group_idx = block_cfg.cluster_group;
        let group_rt = self.groups[group_idx];

        let aligned = align_to_page(block_cfg.block_size as u32);
        let data_addr = group_rt.data_cursor - aligned;
        let header_addr = group_rt.header_cursor;
        let invalid_addr = header_addr + BLOCK_OVERHEAD - VIRTUAL_PAGE_SIZE;

        self.blocks[idx].data_addr = data_addr;
        self.blocks[idx].invalid_addr = invalid_addr;
        self.blocks[idx].status = BlockStatus::Inconsistent;

        self.groups[group_idx].header_cursor = header_addr + BLOCK_OVERHEAD;
        self.groups[group_idx].data_cursor = data_addr;

        self.job.current_job = CurrentJob::Done;
        JobResult::Ok
    }
}
