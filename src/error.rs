use thiserror::Error;

/// Errors returned by the codec when a byte range fails to parse as a
/// header, independent of what the flash driver itself reports.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("header buffer is not blank")]
    NotBlank,
    #[error("header is garbled")]
    HeaderInvalid,
    #[error("buffer too short for this header layout")]
    BufferTooShort,
}

/// Errors surfaced by a `RawFlash` implementation. The engine never
/// constructs these itself; it only reacts to `get_job_result`.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RawFlashError {
    #[error("address or length is not aligned to the required granularity")]
    Misaligned,
    #[error("address range falls outside the flash device")]
    OutOfRange,
    #[error("underlying device rejected the operation")]
    DeviceRejected,
}
