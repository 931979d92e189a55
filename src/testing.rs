//! An in-memory `RawFlash` fake with fault-injection knobs, used by
//! this crate's own tests and available to integrators who want the
//! same fixture for their own.

use crate::engine::Engine;
use crate::error::RawFlashError;
use crate::flash::{DriverJobResult, RawFlash};
use crate::observer::EngineObserver;

/// A flash device backed by a `Vec<u8>`. Every accepted operation
/// completes "instantly" from the caller's point of view: by the time
/// `erase`/`write`/`read` returns, `get_job_result` already reflects
/// the outcome. This is enough to drive the engine through its whole
/// asynchronous protocol without a real event loop.
pub struct MemoryFlash {
    data: Vec<u8>,
    last_result: DriverJobResult,
    reject_next: bool,
    fail_next: bool,
    cancel_next: bool,
    torn_write_len: Option<usize>,
    bit_flip: Option<(u32, u8)>,
}

impl MemoryFlash {
    /// Builds a `size`-byte device, blank (all `0xFF`).
    pub fn new(size: u32) -> Self
    {
        Self {
            data: vec![0xFF; size as usize],
            last_result: DriverJobResult::Ok,
            reject_next: false,
            fail_next: false,
            cancel_next: false,
            torn_write_len: None,
            bit_flip: None,
        }
    }

    /// Returns the device's full backing contents, for assertions.
    pub fn contents(&self) -> &[u8]
    {
        &self.data
    }

    /// The next `erase`/`write`/`read` call returns `Err` synchronously
    /// (submission rejected), as if the driver queue were full.
    pub fn reject_next_submission(&mut self)
    {
        self.reject_next = true;
    }

    /// The next `erase`/`write`/`read` call is accepted, but
    /// `get_job_result` reports `Failed` for it.
    pub fn fail_next_completion(&mut self)
    {
        self.fail_next = true;
    }

    /// The next `erase`/`write`/`read` call is accepted, but
    /// `get_job_result` reports `Canceled` for it.
    pub fn cancel_next_completion(&mut self)
    {
        self.cancel_next = true;
    }

    /// The next `write` only programs its first `len` bytes, leaving
    /// the remainder at the erased value — a torn write caused by
    /// power loss mid-program.
    pub fn tear_next_write(&mut self, len: usize)
    {
        self.torn_write_len = Some(len);
    }

    /// Flips the bits in `mask` at `addr` immediately after the next
    /// `write` or `erase` that touches it, simulating bit-level
    /// corruption independent of the write's own success.
    pub fn flip_bits_after_next_op(&mut self, addr: u32, mask: u8)
    {
        self.bit_flip = Some((addr, mask));
    }

    fn apply_pending_flip(&mut self, touched: std::ops::Range<u32>)
    {
        if let Some((addr, mask)) = self.bit_flip {
            if touched.contains(&addr) {
                self.data[addr as usize] ^= mask;
                self.bit_flip = None;
            }
        }
    }

    fn resolve_completion(&mut self) -> Result<(), RawFlashError>
    {
        if self.fail_next {
            self.fail_next = false;
            self.last_result = DriverJobResult::Failed;
        } else if self.cancel_next {
            self.cancel_next = false;
            self.last_result = DriverJobResult::Canceled;
        } else {
            self.last_result = DriverJobResult::Ok;
        }
        Ok(())
    }
}

impl RawFlash for MemoryFlash {
    fn erase(&mut self, addr: u32, len: u32) -> Result<(), RawFlashError>
    {
        if self.reject_next {
            self.reject_next = false;
            return Err(RawFlashError::DeviceRejected);
        }
        let end = addr as usize + len as usize;
        if end > self.data.len() {
            return Err(RawFlashError::OutOfRange);
        }

        self.data[addr as usize..end].fill(0xFF);
        self.apply_pending_flip(addr..addr + len);
        self.resolve_completion()
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), RawFlashError>
    {
        if self.reject_next {
            self.reject_next = false;
            return Err(RawFlashError::DeviceRejected);
        }
        let end = addr as usize + data.len();
        if end > self.data.len() {
            return Err(RawFlashError::OutOfRange);
        }

        let written_len = match self.torn_write_len.take() {
            Some(n) => n.min(data.len()),
            None => data.len(),
        };
        self.data[addr as usize..addr as usize + written_len].copy_from_slice(&data[..written_len]);
        self.apply_pending_flip(addr..addr + data.len() as u32);
        self.resolve_completion()
    }

    fn read(&mut self, addr: u32, out: &mut [u8]) -> Result<(), RawFlashError>
    {
        if self.reject_next {
            self.reject_next = false;
            return Err(RawFlashError::DeviceRejected);
        }
        let end = addr as usize + out.len();
        if end > self.data.len() {
            return Err(RawFlashError::OutOfRange);
        }

        out.copy_from_slice(&self.data[addr as usize..end]);
        self.resolve_completion()
    }

    fn get_job_result(&mut self) -> DriverJobResult
    {
        self.last_result
    }
}

/// Drives `engine` to completion against `flash`, alternating
/// `main_function` with the matching notification until the job result
/// is no longer `Pending`. Only suitable for drivers that resolve every
/// operation within the call that submitted it (`MemoryFlash` and the
/// CLI harness's file-backed flash both qualify; a driver with genuine
/// background completion needs its own event-loop-driven variant).
pub fn pump<O: EngineObserver, F: RawFlash>(engine: &mut Engine<O>, flash: &mut F)
{
    loop {
        engine.main_function(flash);

        match engine.job_result() {
            crate::status::JobResult::Pending => match flash.get_job_result() {
                DriverJobResult::Ok => engine.job_end_notification(flash),
                DriverJobResult::Failed | DriverJobResult::Canceled => engine.job_error_notification(flash),
                DriverJobResult::Pending => return,
            },
            _ => return,
        }
    }
}
