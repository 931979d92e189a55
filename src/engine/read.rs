//! The `Read` step: a single-tick job with no intermediate state.

use super::{accept, Engine};
use crate::flash::RawFlash;
use crate::job::CurrentJob;
use crate::observer::EngineObserver;
use crate::status::{BlockStatus, JobResult};

impl<O: EngineObserver> Engine<O> {
    pub(super) fn step_read(&mut self, flash: &mut dyn RawFlash) -> JobResult
    {
        let idx = self.job.block_index.expect("read requires a resolved block index");
        let status = self.blocks[idx].status;

        self.job.current_job = CurrentJob::Done;

        match status {
            BlockStatus::Valid => {
                let addr = self.blocks[idx].data_addr + self.job.block_offset;
                let len = self.job.block_length as usize;
                let dest = self.job.read_dest.as_mut().expect("read destination must be set");
                let slice = &mut dest.as_mut_slice()[..len];
                accept(flash.read(addr, slice))
            }
            BlockStatus::Invalid | BlockStatus::Invalidated => JobResult::BlockInvalid,
            BlockStatus::NeverWritten
            | BlockStatus::Inconsistent
            | BlockStatus::InconsistentCopy
            | BlockStatus::HeaderInvalid
            | BlockStatus::HeaderBlank => JobResult::BlockInconsistent,
        }
    }
}
