//! A `RawFlash` implementation backed by a plain host file, standing
//! in for a real NOR/NAND part while exercising the engine from the
//! command line. Every operation completes synchronously from the
//! caller's point of view, matching the in-process `MemoryFlash` test
//! fixture the library ships in `feecore::testing` — the only
//! difference is that the backing bytes live on disk between runs.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use feecore::{DriverJobResult, RawFlash, RawFlashError};

pub struct FileFlash {
    file: File,
    size: u32,
    last_result: DriverJobResult,
}

impl FileFlash {
    /// Opens (or creates, blank-filled) a `size`-byte flash image at
    /// `path`.
    pub fn open(path: &Path, size: u32) -> std::io::Result<Self>
    {
        let is_new = !path.exists();

        let mut file = OpenOptions::new().create(true).read(true).write(true).open(path)?;

        if is_new {
            file.write_all(&vec![0xFF; size as usize])?;
            file.flush()?;
        } else {
            let len = file.metadata()?.len();
            if len != size as u64 {
                log::warn!("{}: image is {} bytes, configured geometry expects {}", path.display(), len, size);
            }
        }

        Ok(Self { file, size, last_result: DriverJobResult::Ok })
    }

    fn bounds_ok(&self, addr: u32, len: u32) -> Result<(), RawFlashError>
    {
        if addr.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(RawFlashError::OutOfRange);
        }
        Ok(())
    }
}

impl RawFlash for FileFlash {
    fn erase(&mut self, addr: u32, len: u32) -> Result<(), RawFlashError>
    {
        self.bounds_ok(addr, len)?;
        log::trace!("flash erase addr={addr:#x} len={len:#x}");

        self.file.seek(SeekFrom::Start(addr as u64)).map_err(|_| RawFlashError::DeviceRejected)?;
        self.file.write_all(&vec![0xFF; len as usize]).map_err(|_| RawFlashError::DeviceRejected)?;

        self.last_result = DriverJobResult::Ok;
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), RawFlashError>
    {
        self.bounds_ok(addr, data.len() as u32)?;
        log::trace!("flash write addr={addr:#x} len={:#x}", data.len());

        self.file.seek(SeekFrom::Start(addr as u64)).map_err(|_| RawFlashError::DeviceRejected)?;
        self.file.write_all(data).map_err(|_| RawFlashError::DeviceRejected)?;

        self.last_result = DriverJobResult::Ok;
        Ok(())
    }

    fn read(&mut self, addr: u32, out: &mut [u8]) -> Result<(), RawFlashError>
    {
        self.bounds_ok(addr, out.len() as u32)?;
        log::trace!("flash read addr={addr:#x} len={:#x}", out.len());

        self.file.seek(SeekFrom::Start(addr as u64)).map_err(|_| RawFlashError::DeviceRejected)?;
        self.file.read_exact(out).map_err(|_| RawFlashError::DeviceRejected)?;

        self.last_result = DriverJobResult::Ok;
        Ok(())
    }

    fn get_job_result(&mut self) -> DriverJobResult
    {
        self.last_result
    }
}
