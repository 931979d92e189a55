//! Pure serialize/deserialize routines for cluster and block headers.
//!
//! Every multi-byte field is little-endian; this is a deliberate choice
//! (the layout has no inherent byte order) documented here once rather
//! than on every field.

use crate::config::{BLOCK_OVERHEAD, CLUSTER_OVERHEAD, ERASED_VALUE, INVALIDATED_VALUE, VALIDATED_VALUE, VIRTUAL_PAGE_SIZE};
use crate::error::CodecError;
use crate::status::{BlockStatus, ClusterStatus};

const BLOCK_HDR_LEN: usize = BLOCK_OVERHEAD as usize;
const CLUSTER_HDR_LEN: usize = CLUSTER_OVERHEAD as usize;
const PAGE_LEN: usize = VIRTUAL_PAGE_SIZE as usize;

// Block header field offsets.
const B_BLOCK_NUMBER: std::ops::Range<usize> = 0..2;
const B_LENGTH: std::ops::Range<usize> = 2..4;
const B_DATA_ADDR: std::ops::Range<usize> = 4..8;
const B_CHECKSUM: std::ops::Range<usize> = 8..12;
const B_RESERVED: usize = 12;
const B_VALID_PAGE: std::ops::Range<usize> = 16..24;
const B_INVALID_PAGE: std::ops::Range<usize> = 24..32;

// Cluster header field offsets.
const C_CLUSTER_ID: std::ops::Range<usize> = 0..4;
const C_START_ADDR: std::ops::Range<usize> = 4..8;
const C_LENGTH: std::ops::Range<usize> = 8..12;
const C_CHECKSUM: std::ops::Range<usize> = 12..16;
const C_VALID_PAGE: std::ops::Range<usize> = 16..24;
const C_INVALID_PAGE: std::ops::Range<usize> = 24..32;

/// Returns `Ok(())` iff every byte of `buf` equals `ERASED_VALUE`.
pub fn blank_check(buf: &[u8]) -> Result<(), CodecError>
{
    if buf.iter().all(|&b| b == ERASED_VALUE) {
        Ok(())
    } else {
        Err(CodecError::NotBlank)
    }
}

/// Parses one virtual page as a validity flag. `set=true` iff the
/// first byte matches `pattern`; `set=false` iff it is the erased
/// value. Any other first byte, or a non-blank remainder, is
/// `HeaderInvalid`.
pub fn deserialize_flag(page: &[u8], pattern: u8) -> Result<bool, CodecError>
{
    if page.len() != PAGE_LEN {
        return Err(CodecError::BufferTooShort);
    }

    let set = match page[0] {
        b if b == pattern => true,
        ERASED_VALUE => false,
        _ => return Err(CodecError::HeaderInvalid),
    };

    if blank_check(&page[1..]).is_err() {
        return Err(CodecError::HeaderInvalid);
    }

    Ok(set)
}

fn serialize_flag(pattern: u8) -> [u8; PAGE_LEN]
{
    let mut page = [ERASED_VALUE; PAGE_LEN];
    page[0] = pattern;
    page
}

fn block_checksum(block_number: u16, length: u16, data_addr: u32, immediate: bool) -> u32
{
    let mut sum = (block_number as u32).wrapping_add(length as u32).wrapping_add(data_addr);

    if immediate {
        sum = sum.wrapping_add(1);
        sum |= 0x8000_0000;
    } else {
        sum &= 0x7FFF_FFFF;
    }

    sum
}

/// Result of parsing a block header buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedBlockHeader {
    pub status: BlockStatus,
    pub block_number: u16,
    pub length: u16,
    pub data_addr: u32,
    pub immediate: bool,
}

/// Writes the fixed-layout fields for a block header: block number,
/// length, target data address and a checksum with the top bit
/// repurposed to encode `immediate`. The reserved byte and both flag
/// pages are left blank.
pub fn serialize_block_header(block_number: u16, length: u16, data_addr: u32, immediate: bool) -> [u8; BLOCK_HDR_LEN]
{
    let mut buf = [ERASED_VALUE; BLOCK_HDR_LEN];

    buf[B_BLOCK_NUMBER].copy_from_slice(&block_number.to_le_bytes());
    buf[B_LENGTH].copy_from_slice(&length.to_le_bytes());
    buf[B_DATA_ADDR].copy_from_slice(&data_addr.to_le_bytes());
    buf[B_CHECKSUM].copy_from_slice(&block_checksum(block_number, length, data_addr, immediate).to_le_bytes());
    buf[B_RESERVED] = 0;

    buf
}

/// Writes only the VALIDATED flag page for a block, suitable for
/// programming at `invalid_addr - VIRTUAL_PAGE_SIZE`.
pub fn serialize_block_validate_page() -> [u8; PAGE_LEN]
{
    serialize_flag(VALIDATED_VALUE)
}

/// Writes only the INVALIDATED flag page for a block.
pub fn serialize_block_invalidate_page() -> [u8; PAGE_LEN]
{
    serialize_flag(INVALIDATED_VALUE)
}

/// Parses a complete `BLOCK_OVERHEAD`-byte block header buffer.
pub fn deserialize_block_header(buf: &[u8]) -> Result<ParsedBlockHeader, CodecError>
{
    if buf.len() != BLOCK_HDR_LEN {
        return Err(CodecError::BufferTooShort);
    }

    if blank_check(buf).is_ok() {
        return Ok(ParsedBlockHeader {
            status: BlockStatus::HeaderBlank,
            block_number: 0,
            length: 0,
            data_addr: 0,
            immediate: false,
        });
    }

    let block_number = u16::from_le_bytes(buf[B_BLOCK_NUMBER].try_into().unwrap());
    let length = u16::from_le_bytes(buf[B_LENGTH].try_into().unwrap());
    let data_addr = u32::from_le_bytes(buf[B_DATA_ADDR].try_into().unwrap());
    let stored_checksum = u32::from_le_bytes(buf[B_CHECKSUM].try_into().unwrap());

    let immediate = stored_checksum & 0x8000_0000 != 0;
    let expected = block_checksum(block_number, length, data_addr, immediate);

    if (expected & 0x7FFF_FFFF) != (stored_checksum & 0x7FFF_FFFF) {
        return Ok(ParsedBlockHeader {
            status: BlockStatus::HeaderInvalid,
            block_number,
            length,
            data_addr,
            immediate,
        });
    }

    if blank_check(&buf[(B_RESERVED + 1)..B_VALID_PAGE.start]).is_err() {
        return Ok(ParsedBlockHeader {
            status: BlockStatus::HeaderInvalid,
            block_number,
            length,
            data_addr,
            immediate,
        });
    }

    let valid = deserialize_flag(&buf[B_VALID_PAGE], VALIDATED_VALUE);
    let invalid = deserialize_flag(&buf[B_INVALID_PAGE], INVALIDATED_VALUE);

    let (valid, invalid) = match (valid, invalid) {
        (Ok(v), Ok(i)) => (v, i),
        _ => {
            return Ok(ParsedBlockHeader {
                status: BlockStatus::HeaderInvalid,
                block_number,
                length,
                data_addr,
                immediate,
            })
        }
    };

    let status = if invalid {
        BlockStatus::Invalid
    } else if valid {
        BlockStatus::Valid
    } else {
        BlockStatus::Inconsistent
    };

    Ok(ParsedBlockHeader { status, block_number, length, data_addr, immediate })
}

fn cluster_checksum(cluster_id: u32, start_addr: u32, length: u32) -> u32
{
    cluster_id.wrapping_add(start_addr).wrapping_add(length)
}

/// Result of parsing a cluster header buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedClusterHeader {
    pub status: ClusterStatus,
    pub cluster_id: u32,
    pub start_addr: u32,
    pub length: u32,
}

/// Writes the fixed-layout fields for a cluster header; both flag
/// pages are left blank.
pub fn serialize_cluster_header(cluster_id: u32, start_addr: u32, length: u32) -> [u8; CLUSTER_HDR_LEN]
{
    let mut buf = [ERASED_VALUE; CLUSTER_HDR_LEN];

    buf[C_CLUSTER_ID].copy_from_slice(&cluster_id.to_le_bytes());
    buf[C_START_ADDR].copy_from_slice(&start_addr.to_le_bytes());
    buf[C_LENGTH].copy_from_slice(&length.to_le_bytes());
    buf[C_CHECKSUM].copy_from_slice(&cluster_checksum(cluster_id, start_addr, length).to_le_bytes());

    buf
}

/// Writes a cluster header body together with a pre-set VALIDATED
/// flag page, used when scan formats a fresh first cluster.
pub fn serialize_cluster_header_prevalidated(cluster_id: u32, start_addr: u32, length: u32) -> [u8; CLUSTER_HDR_LEN]
{
    let mut buf = serialize_cluster_header(cluster_id, start_addr, length);
    buf[C_VALID_PAGE].copy_from_slice(&serialize_flag(VALIDATED_VALUE));
    buf
}

pub fn serialize_cluster_validate_page() -> [u8; PAGE_LEN]
{
    serialize_flag(VALIDATED_VALUE)
}

/// Parses a complete `CLUSTER_OVERHEAD`-byte cluster header buffer.
pub fn deserialize_cluster_header(buf: &[u8]) -> Result<ParsedClusterHeader, CodecError>
{
    if buf.len() != CLUSTER_HDR_LEN {
        return Err(CodecError::BufferTooShort);
    }

    if blank_check(buf).is_ok() {
        return Ok(ParsedClusterHeader {
            status: ClusterStatus::HeaderInvalid,
            cluster_id: 0,
            start_addr: 0,
            length: 0,
        });
    }

    let cluster_id = u32::from_le_bytes(buf[C_CLUSTER_ID].try_into().unwrap());
    let start_addr = u32::from_le_bytes(buf[C_START_ADDR].try_into().unwrap());
    let length = u32::from_le_bytes(buf[C_LENGTH].try_into().unwrap());
    let stored_checksum = u32::from_le_bytes(buf[C_CHECKSUM].try_into().unwrap());

    if cluster_checksum(cluster_id, start_addr, length) != stored_checksum {
        return Ok(ParsedClusterHeader { status: ClusterStatus::HeaderInvalid, cluster_id, start_addr, length });
    }

    let valid = deserialize_flag(&buf[C_VALID_PAGE], VALIDATED_VALUE);
    let invalid = deserialize_flag(&buf[C_INVALID_PAGE], INVALIDATED_VALUE);

    let (valid, invalid) = match (valid, invalid) {
        (Ok(v), Ok(i)) => (v, i),
        _ => return Ok(ParsedClusterHeader { status: ClusterStatus::HeaderInvalid, cluster_id, start_addr, length }),
    };

    // Total decision tree over the two flag bits: the non-exclusive
    // if-chain in the source can misclassify an (invalid=true,
    // valid=true) page as VALID. Invalidated always wins here.
    let status = if invalid {
        ClusterStatus::Invalid
    } else if valid {
        ClusterStatus::Valid
    } else {
        ClusterStatus::Inconsistent
    };

    Ok(ParsedClusterHeader { status, cluster_id, start_addr, length })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_check_detects_erased_buffer()
    {
        assert!(blank_check(&[0xFF; 32]).is_ok());
        assert!(blank_check(&[0xFF, 0x00, 0xFF]).is_err());
    }

    #[test]
    fn block_header_round_trip_validated()
    {
        for &(block_number, length, data_addr, immediate) in &[
            (1u16, 8u16, 2040u32, true),
            (2, 4, 512, false),
            (0xFFFF, 0x7FFF, 0xFFFF_FFF0, true),
            (3, 0, 0, false),
        ] {
            let mut buf = serialize_block_header(block_number, length, data_addr, immediate);
            buf[B_VALID_PAGE].copy_from_slice(&serialize_block_validate_page());

            let parsed = deserialize_block_header(&buf).unwrap();
            assert_eq!(parsed.status, BlockStatus::Valid);
            assert_eq!(parsed.block_number, block_number);
            assert_eq!(parsed.length, length);
            assert_eq!(parsed.data_addr, data_addr);
            assert_eq!(parsed.immediate, immediate);
        }
    }

    #[test]
    fn block_header_blank_before_any_flag()
    {
        let buf = serialize_block_header(1, 8, 2040, true);
        let parsed = deserialize_block_header(&buf).unwrap();
        assert_eq!(parsed.status, BlockStatus::Inconsistent);
    }

    #[test]
    fn block_header_invalidated_wins()
    {
        let mut buf = serialize_block_header(1, 8, 2040, true);
        buf[B_VALID_PAGE].copy_from_slice(&serialize_block_validate_page());
        buf[B_INVALID_PAGE].copy_from_slice(&serialize_block_invalidate_page());

        let parsed = deserialize_block_header(&buf).unwrap();
        assert_eq!(parsed.status, BlockStatus::Invalid);
    }

    #[test]
    fn block_header_blank_buffer_is_header_blank()
    {
        let buf = [ERASED_VALUE; BLOCK_HDR_LEN];
        let parsed = deserialize_block_header(&buf).unwrap();
        assert_eq!(parsed.status, BlockStatus::HeaderBlank);
    }

    #[test]
    fn block_header_checksum_mismatch_is_header_invalid()
    {
        let mut buf = serialize_block_header(1, 8, 2040, true);
        buf[B_CHECKSUM.start] ^= 0x01;
        let parsed = deserialize_block_header(&buf).unwrap();
        assert_eq!(parsed.status, BlockStatus::HeaderInvalid);
    }

    #[test]
    fn cluster_header_round_trip_validated()
    {
        for &(cluster_id, start_addr, length) in &[(1u32, 0u32, 2048u32), (2, 2048, 2048), (0xFFFF_FFFF, 0, 1)] {
            let mut buf = serialize_cluster_header(cluster_id, start_addr, length);
            buf[C_VALID_PAGE].copy_from_slice(&serialize_cluster_validate_page());

            let parsed = deserialize_cluster_header(&buf).unwrap();
            assert_eq!(parsed.status, ClusterStatus::Valid);
            assert_eq!(parsed.cluster_id, cluster_id);
            assert_eq!(parsed.start_addr, start_addr);
            assert_eq!(parsed.length, length);
        }
    }

    #[test]
    fn cluster_header_prevalidated_reads_back_valid()
    {
        let buf = serialize_cluster_header_prevalidated(1, 0, 2048);
        let parsed = deserialize_cluster_header(&buf).unwrap();
        assert_eq!(parsed.status, ClusterStatus::Valid);
    }

    #[test]
    fn flag_page_rejects_garbage_first_byte()
    {
        let mut page = [ERASED_VALUE; PAGE_LEN];
        page[0] = 0x42;
        assert_eq!(deserialize_flag(&page, VALIDATED_VALUE), Err(CodecError::HeaderInvalid));
    }

    #[test]
    fn flag_page_rejects_non_blank_remainder()
    {
        let mut page = serialize_flag(VALIDATED_VALUE);
        page[3] = 0x00;
        assert_eq!(deserialize_flag(&page, VALIDATED_VALUE), Err(CodecError::HeaderInvalid));
    }
}
