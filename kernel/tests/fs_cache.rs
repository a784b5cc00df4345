//! Exercises the sector cache and the file header's indirect-block growth
//! under a file large enough to outgrow both the direct pointers and the
//! 16-entry cache, so eviction and indirect-block traffic actually happen.
use kernel::{Config, Kernel};
use machine::disk::SECTOR_SIZE;
use std::sync::Arc;

#[test]
fn a_file_spanning_many_sectors_survives_cache_eviction_round_trips() {
    let config = Config::default();
    let disk = Arc::new(machine::Disk::new_formatted(config.disk_sectors));
    let kernel = Kernel::boot(config, disk, true).unwrap();

    // 40 sectors is past both the 8 direct pointers and the 16-entry
    // cache, forcing the header to use an indirect block and the cache
    // to evict entries mid-write.
    let payload_sectors = 40;
    let payload: Vec<u8> = (0..payload_sectors * SECTOR_SIZE).map(|i| (i % 251) as u8).collect();

    kernel.fs.create("big.bin", payload.len()).unwrap();
    let file = kernel.fs.open("big.bin").unwrap();
    assert_eq!(file.write(&payload).unwrap(), payload.len());

    file.seek(0);
    let mut read_back = vec![0u8; payload.len()];
    assert_eq!(file.read(&mut read_back), payload.len());
    assert_eq!(read_back, payload);
}

#[test]
fn writing_more_sectors_than_the_cache_holds_evicts_and_flushes_dirty_entries() {
    let config = Config::default();
    let disk = Arc::new(machine::Disk::new_formatted(config.disk_sectors));
    let kernel = Kernel::boot(config, disk, true).unwrap();
    let cache = kernel.fs.cache();

    // One more than CACHE_SIZE (16): the last write evicts the first
    // entry, which must have been flushed rather than silently dropped.
    for sector in 100..117u32 {
        let mut data = [0u8; SECTOR_SIZE];
        data[0] = (sector - 100) as u8;
        cache.write_sector(sector, &data);
    }
    let reread = cache.read_sector(100);
    assert_eq!(reread[0], 0);
}
