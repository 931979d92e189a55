//! The raw-flash driver contract consumed by the job scheduler. The
//! driver itself — sector erase, page-aligned program, byte-aligned
//! read — is an external collaborator; this module only defines the
//! boundary and its outcome type.

use crate::error::RawFlashError;

/// Outcome of the most recently submitted raw-flash operation, as
/// reported by the driver's own `get_job_result`. Distinct from
/// `status::JobResult`, which is the engine's own externally visible
/// result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverJobResult {
    Ok,
    Pending,
    Failed,
    Canceled,
}

/// Abstract raw-flash driver. Every accepted operation completes
/// asynchronously; the caller learns of completion by polling
/// `get_job_result` and then driving `Engine::job_end_notification` or
/// `Engine::job_error_notification` — the driver never reaches back
/// into the engine itself.
pub trait RawFlash {
    /// Erase a sector-aligned, sector-length region.
    fn erase(&mut self, addr: u32, len: u32) -> Result<(), RawFlashError>;

    /// Program a page-aligned buffer at a page-aligned address.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), RawFlashError>;

    /// Read `out.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, out: &mut [u8]) -> Result<(), RawFlashError>;

    /// Poll the outcome of the last accepted operation.
    fn get_job_result(&mut self) -> DriverJobResult;
}
