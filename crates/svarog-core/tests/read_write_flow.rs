//! End-to-end read/write flows through the manager.

use svarog_core::{
    BlockConfig, BlockState, CrcKind, Error, JobResult, Svarog, SvarogConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn tick_until_settled(nvm: &mut Svarog, id: u16) -> JobResult {
    for _ in 0..100 {
        if nvm.job_result(id).unwrap() != JobResult::Pending {
            break;
        }
        nvm.main_function();
    }
    nvm.job_result(id).unwrap()
}

#[test]
fn native_round_trip() {
    init_tracing();
    let mut nvm = Svarog::new(SvarogConfig::default()).unwrap();
    nvm.register_block(BlockConfig::new(0, 256, 0x0000).crc(CrcKind::Crc16))
        .unwrap();

    // Fill the RAM mirror and flush it.
    nvm.write_mirror(0, &[0xAA; 256]).unwrap();
    nvm.write_block(0).unwrap();
    assert_eq!(tick_until_settled(&mut nvm, 0), JobResult::Ok);

    // Clear the mirror, then load the block back from the medium.
    nvm.write_mirror(0, &[0x00; 256]).unwrap();
    nvm.read_block(0).unwrap();
    assert_eq!(tick_until_settled(&mut nvm, 0), JobResult::Ok);

    let mut image = [0u8; 256];
    nvm.read_mirror(0, &mut image).unwrap();
    assert_eq!(image, [0xAA; 256]);
    assert_eq!(nvm.block_state(0).unwrap(), BlockState::Valid);
}

#[test]
fn queue_overflow_leaves_existing_jobs_intact() {
    init_tracing();
    let mut nvm = Svarog::new(SvarogConfig::default()).unwrap();

    // 33 blocks, one more than the queue holds.
    for id in 0..33u16 {
        nvm.register_block(
            BlockConfig::new(id, 256, u32::from(id) * 1024).crc(CrcKind::Crc16),
        )
        .unwrap();
        nvm.write_mirror(id, &[id as u8; 256]).unwrap();
    }

    for id in 0..32u16 {
        nvm.write_block(id).unwrap();
    }
    let err = nvm.write_block(32);
    assert!(matches!(err, Err(Error::QueueFull)));

    for id in 0..32u16 {
        assert_eq!(nvm.job_result(id).unwrap(), JobResult::Pending);
    }

    nvm.main_function();

    for id in 0..32u16 {
        assert_eq!(nvm.job_result(id).unwrap(), JobResult::Ok);
    }
    // The rejected request never became a job.
    assert_eq!(nvm.block_state(32).unwrap(), BlockState::Uninitialized);

    let diag = nvm.diagnostics();
    assert_eq!(diag.max_queue_depth, 32);
    assert_eq!(diag.queue_overflows, 1);
    assert_eq!(diag.jobs_processed, 32);
}

#[test]
fn dataset_round_robin() {
    init_tracing();
    let mut nvm = Svarog::new(SvarogConfig::default()).unwrap();
    nvm.register_block(BlockConfig::new(5, 256, 0x4000).crc(CrcKind::Crc16).dataset(3))
        .unwrap();
    assert_eq!(nvm.data_index(5).unwrap(), 0);

    for pattern in [0xAAu8, 0xBB, 0xCC] {
        nvm.write_block_with(5, &[pattern; 256]).unwrap();
        assert_eq!(tick_until_settled(&mut nvm, 5), JobResult::Ok);
    }
    // Started at 0, advanced 1 -> 2 -> 0.
    assert_eq!(nvm.data_index(5).unwrap(), 0);

    nvm.write_mirror(5, &[0u8; 256]).unwrap();
    nvm.read_block(5).unwrap();
    assert_eq!(tick_until_settled(&mut nvm, 5), JobResult::Ok);

    let mut image = [0u8; 256];
    nvm.read_mirror(5, &mut image).unwrap();
    assert_eq!(image, [0xCC; 256]);
}

#[test]
fn write_all_respects_protection_and_read_all_restores() {
    init_tracing();
    let mut nvm = Svarog::new(SvarogConfig::default()).unwrap();
    nvm.register_block(BlockConfig::new(0, 256, 0x0000).crc(CrcKind::Crc16))
        .unwrap();
    nvm.register_block(BlockConfig::new(1, 256, 0x0400).crc(CrcKind::Crc16))
        .unwrap();
    nvm.register_block(
        BlockConfig::new(2, 256, 0x0800)
            .crc(CrcKind::Crc16)
            .write_protected(),
    )
    .unwrap();

    nvm.write_mirror(0, &[0x10; 256]).unwrap();
    nvm.write_mirror(1, &[0x11; 256]).unwrap();
    nvm.write_mirror(2, &[0x12; 256]).unwrap();

    nvm.write_all().unwrap();
    nvm.main_function();

    assert_eq!(nvm.job_result(0).unwrap(), JobResult::Ok);
    assert_eq!(nvm.job_result(1).unwrap(), JobResult::Ok);
    // The protected block was skipped, not failed.
    assert_eq!(nvm.block_state(2).unwrap(), BlockState::Uninitialized);

    // Scribble over the mirrors, then restore everything from the medium.
    nvm.write_mirror(0, &[0u8; 256]).unwrap();
    nvm.write_mirror(1, &[0u8; 256]).unwrap();
    nvm.read_all().unwrap();
    nvm.main_function();

    let mut image = [0u8; 256];
    nvm.read_mirror(0, &mut image).unwrap();
    assert_eq!(image, [0x10; 256]);
    nvm.read_mirror(1, &mut image).unwrap();
    assert_eq!(image, [0x11; 256]);
    // The protected block's slot was never written; its read failed.
    assert_eq!(nvm.job_result(2).unwrap(), JobResult::NotOk);
    assert_eq!(nvm.block_state(2).unwrap(), BlockState::Invalid);
}

#[test]
fn rom_default_lands_in_mirror_on_failed_read() {
    init_tracing();
    let mut nvm = Svarog::new(SvarogConfig::default()).unwrap();
    nvm.register_block(
        BlockConfig::new(7, 256, 0x1000)
            .crc(CrcKind::Crc16)
            .rom_default(vec![0xC3; 256]),
    )
    .unwrap();

    // Nothing was ever written: the read fails but the ROM default is
    // published to the mirror.
    nvm.read_block(7).unwrap();
    assert_eq!(tick_until_settled(&mut nvm, 7), JobResult::NotOk);
    assert_eq!(nvm.block_state(7).unwrap(), BlockState::Invalid);

    let mut image = [0u8; 256];
    nvm.read_mirror(7, &mut image).unwrap();
    assert_eq!(image, [0xC3; 256]);
}

#[test]
fn write_after_write_round_trips_latest_data() {
    init_tracing();
    let mut nvm = Svarog::new(SvarogConfig::default()).unwrap();
    nvm.register_block(BlockConfig::new(0, 256, 0x0000).crc(CrcKind::Crc32))
        .unwrap();

    for round in 0..5u8 {
        let pattern = 0x30 + round;
        nvm.write_block_with(0, &[pattern; 256]).unwrap();
        assert_eq!(tick_until_settled(&mut nvm, 0), JobResult::Ok);

        nvm.write_mirror(0, &[0u8; 256]).unwrap();
        nvm.read_block(0).unwrap();
        assert_eq!(tick_until_settled(&mut nvm, 0), JobResult::Ok);

        let mut image = [0u8; 256];
        nvm.read_mirror(0, &mut image).unwrap();
        assert_eq!(image, [pattern; 256]);
    }

    // Each write cycles one erase on the slot's block.
    assert_eq!(nvm.block_erase_count(0).unwrap(), 5);
}
