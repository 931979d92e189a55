//! End-to-end scenarios straight from the engine's own testable
//! properties: cold start, invalidate, compaction by exhaustion,
//! recovery from a torn write, header corruption forcing a swap, and
//! the immediate-block reserved-area rule.

mod common;

use feecore::codec;
use feecore::config::{BLOCK_OVERHEAD, VIRTUAL_PAGE_SIZE};
use feecore::flash::RawFlash;
use feecore::testing::{pump, MemoryFlash};
use feecore::{BlockStatus, Engine, JobResult, ModuleStatus};

use common::{sample_config, sample_config_with_non_immediate, TrackingObserver, FLASH_SIZE};

fn booted(config: feecore::FeeConfig) -> (Engine<TrackingObserver>, MemoryFlash)
{
    let mut engine = Engine::new(config, TrackingObserver::default()).unwrap();
    let mut flash = MemoryFlash::new(FLASH_SIZE);

    engine.init();
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);
    assert_eq!(engine.status(), ModuleStatus::Idle);

    (engine, flash)
}

#[test]
fn cold_start_formats_cluster_zero_and_writes_first_block()
{
    let (mut engine, mut flash) = booted(sample_config());

    let g0 = engine.cluster_group_runtime(0).unwrap();
    assert_eq!(g0.active_cluster_index, 0);
    assert_eq!(g0.active_cluster_id, 1);
    assert_eq!(g0.header_cursor, 32);
    assert_eq!(g0.data_cursor, 2048);

    let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
    assert!(engine.write(1, &payload));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);

    assert_eq!(engine.block_runtime(1).unwrap().status, BlockStatus::Valid);
    assert_eq!(engine.block_runtime(1).unwrap().data_addr, 2040);
    assert_eq!(engine.block_runtime(1).unwrap().invalid_addr, 32 + BLOCK_OVERHEAD - VIRTUAL_PAGE_SIZE);

    let mut buf = [0u8; 8];
    assert!(engine.read(1, 0, &mut buf));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);
    assert_eq!(buf, payload);
}

#[test]
fn invalidate_then_read_reports_block_invalid_and_leaves_buffer_untouched()
{
    let (mut engine, mut flash) = booted(sample_config());

    assert!(engine.write(1, &[1, 2, 3, 4, 5, 6, 7, 8]));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);

    assert!(engine.invalidate_block(1));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);
    assert_eq!(engine.block_runtime(1).unwrap().status, BlockStatus::Invalid);

    let mut buf = [0u8; 8];
    assert!(engine.read(1, 0, &mut buf));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::BlockInvalid);
    assert_eq!(buf, [0u8; 8]);
}

#[test]
fn exhaustion_forces_swap_for_a_block_the_reserved_area_cannot_admit()
{
    let (mut engine, mut flash) = booted(sample_config_with_non_immediate());

    // Each rewrite of block 1 consumes 32 bytes of header plus 8
    // bytes of (page-aligned) data; after 43 of them the remaining gap
    // is too small for the soft stop to admit a non-immediate write.
    for _ in 0..43 {
        assert!(engine.write(1, &[1, 2, 3, 4, 5, 6, 7, 8]));
        pump(&mut engine, &mut flash);
        assert_eq!(engine.job_result(), JobResult::Ok);
    }

    assert_eq!(engine.cluster_group_runtime(0).unwrap().active_cluster_id, 1);

    assert!(engine.write(4, &[9, 9, 9, 9]));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);

    let g0 = engine.cluster_group_runtime(0).unwrap();
    assert_eq!(g0.active_cluster_index, 1);
    assert_eq!(g0.active_cluster_id, 2);

    assert_eq!(engine.block_runtime(1).unwrap().status, BlockStatus::Valid); // block 1 survived the swap
    assert_eq!(engine.block_runtime(4).unwrap().status, BlockStatus::Valid); // block 4 then wrote into the new cluster

    // The old active cluster (index 0) was erased as part of the swap.
    assert!(flash.contents()[0..32].iter().all(|&b| b == 0xFF));
}

#[test]
fn torn_write_is_recovered_as_inconsistent()
{
    let (mut engine, mut flash) = booted(sample_config());

    // Hand-craft a block-2 header and data payload on flash without
    // ever writing the VALIDATED flag page, simulating a power cut
    // between the data write and the validation write.
    let header = codec::serialize_block_header(2, 4, 2040, true);
    let body_len = (BLOCK_OVERHEAD - 2 * VIRTUAL_PAGE_SIZE) as usize;
    RawFlash::write(&mut flash, 32, &header[..body_len]).unwrap();

    let mut page = [0xFFu8; VIRTUAL_PAGE_SIZE as usize];
    page[..4].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
    RawFlash::write(&mut flash, 2040, &page).unwrap();

    assert!(engine.init());
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);

    assert_eq!(engine.block_runtime(2).unwrap().status, BlockStatus::Inconsistent);

    let mut buf = [0u8; 4];
    assert!(engine.read(2, 0, &mut buf));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::BlockInconsistent);

    assert!(engine.write(2, &[1, 2, 3, 4]));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);
    assert_eq!(engine.block_runtime(2).unwrap().status, BlockStatus::Valid);
}

#[test]
fn header_corruption_forces_a_swap_on_the_next_write()
{
    let (mut engine, mut flash) = booted(sample_config());

    assert!(engine.write(2, &[1, 2, 3, 4]));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);

    // Flip a bit in the checksum field of block 2's header (offset 8
    // within the header at address 32).
    let mut corrupted = [0u8; 1];
    RawFlash::read(&mut flash, 40, &mut corrupted).unwrap();
    corrupted[0] ^= 0x01;
    RawFlash::write(&mut flash, 40, &corrupted).unwrap();

    assert!(engine.init());
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);
    assert_eq!(engine.block_runtime(2).unwrap().status, BlockStatus::NeverWritten);

    assert!(engine.write(2, &[5, 6, 7, 8]));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);

    assert_eq!(engine.block_runtime(2).unwrap().status, BlockStatus::Valid);
    assert_eq!(engine.cluster_group_runtime(0).unwrap().active_cluster_id, 2);
}

#[test]
fn immediate_block_reserved_area_rule()
{
    let (mut engine, mut flash) = booted(sample_config_with_non_immediate());

    for _ in 0..43 {
        assert!(engine.write(1, &[1, 2, 3, 4, 5, 6, 7, 8]));
        pump(&mut engine, &mut flash);
        assert_eq!(engine.job_result(), JobResult::Ok);
    }

    // The reserved region is still blank: an immediate block that was
    // never written there before may append into it without forcing a
    // swap...
    assert!(engine.write(3, &[7, 7, 7, 7]));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);
    assert_eq!(engine.cluster_group_runtime(0).unwrap().active_cluster_id, 1, "writing into the reserved area must not force a swap");

    // ...but a non-immediate write at the same point of exhaustion
    // cannot be admitted and must force a swap instead.
    assert!(engine.write(4, &[8, 8, 8, 8]));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);
    assert_eq!(engine.cluster_group_runtime(0).unwrap().active_cluster_id, 2);
}

#[test]
fn erase_immediate_preallocates_without_writing_a_payload()
{
    let (mut engine, mut flash) = booted(sample_config());

    assert!(engine.erase_immediate_block(3));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::Ok);

    let rt = engine.block_runtime(3).unwrap();
    assert_eq!(rt.status, BlockStatus::Inconsistent);
    assert_ne!(rt.data_addr, 0);

    // No payload has been committed yet: reading must report the
    // block as not-yet-recoverable, same as any other torn write.
    let mut buf = [0u8; 4];
    assert!(engine.read(3, 0, &mut buf));
    pump(&mut engine, &mut flash);
    assert_eq!(engine.job_result(), JobResult::BlockInconsistent);
}

#[test]
fn erase_immediate_rejects_non_immediate_blocks()
{
    let (mut engine, _flash) = booted(sample_config_with_non_immediate());
    assert!(!engine.erase_immediate_block(4));
}
