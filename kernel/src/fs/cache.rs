//! The synchronous sector cache, wrapping the asynchronous
//! [`machine::Disk`] the same way the original `SynchDisk` wraps the
//! asynchronous `Disk`: a lock serializes disk access (the physical disk
//! handles one request at a time), and a semaphore lets the calling
//! thread block until the scheduled completion callback fires.
//!
//! A small fully-associative cache with the original's `ExpelCache`
//! least-recently-used eviction sits in front of the disk, write-back
//! rather than write-through: a dirty entry is only flushed to disk when
//! evicted or on [`SectorCache::flush_all`].
use crate::sync::{Lock, Semaphore};
use crate::thread::scheduler::Scheduler;
use machine::disk::SECTOR_SIZE;
use machine::{Disk, EventQueue};
use std::sync::{Arc, Mutex};

/// Number of sectors the cache holds at once.
pub const CACHE_SIZE: usize = 16;

struct CacheEntry {
    sector: Option<u32>,
    dirty: bool,
    last_used: u64,
    data: [u8; SECTOR_SIZE],
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            sector: None,
            dirty: false,
            last_used: 0,
            data: [0; SECTOR_SIZE],
        }
    }
}

pub struct SectorCache {
    disk: Arc<Disk>,
    event_queue: Arc<Mutex<EventQueue>>,
    io_lock: Lock,
    entries: Mutex<Vec<CacheEntry>>,
    clock: Mutex<u64>,
    scheduler: Arc<Scheduler>,
}

impl SectorCache {
    pub fn new(disk: Arc<Disk>, event_queue: Arc<Mutex<EventQueue>>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            disk,
            event_queue,
            io_lock: Lock::new(scheduler.clone()),
            entries: Mutex::new((0..CACHE_SIZE).map(|_| CacheEntry::empty()).collect()),
            clock: Mutex::new(0),
            scheduler,
        }
    }

    pub fn num_sectors(&self) -> usize {
        self.disk.num_sectors()
    }

    fn tick(&self) -> u64 {
        let mut c = self.clock.lock().unwrap();
        *c += 1;
        *c
    }

    fn find_cached(entries: &[CacheEntry], sector: u32) -> Option<usize> {
        entries.iter().position(|e| e.sector == Some(sector))
    }

    /// Pick a victim slot: first preference an empty slot, else the
    /// least-recently-used one. Flushes it to disk first if dirty.
    fn expel(&self, entries: &mut [CacheEntry]) -> usize {
        if let Some(idx) = entries.iter().position(|e| e.sector.is_none()) {
            return idx;
        }
        let (idx, _) = entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_used)
            .expect("cache has at least one entry");
        if entries[idx].dirty {
            self.disk_write_blocking(entries[idx].sector.unwrap(), &entries[idx].data);
        }
        idx
    }

    fn disk_read_blocking(&self, sector: u32) -> [u8; SECTOR_SIZE] {
        let mut buf = [0u8; SECTOR_SIZE];
        let sem = Arc::new(Semaphore::new(self.scheduler.clone(), 0));
        {
            let mut q = self.event_queue.lock().unwrap();
            let sem2 = sem.clone();
            self.disk
                .read_request(&mut q, sector as usize, &mut buf, move || sem2.up());
        }
        sem.down();
        buf
    }

    fn disk_write_blocking(&self, sector: u32, data: &[u8; SECTOR_SIZE]) {
        let sem = Arc::new(Semaphore::new(self.scheduler.clone(), 0));
        {
            let mut q = self.event_queue.lock().unwrap();
            let sem2 = sem.clone();
            self.disk
                .write_request(&mut q, sector as usize, data, move || sem2.up());
        }
        sem.down();
    }

    /// Read `sector`, serving from cache when possible.
    pub fn read_sector(&self, sector: u32) -> [u8; SECTOR_SIZE] {
        self.io_lock.acquire();
        let result = {
            let mut entries = self.entries.lock().unwrap();
            if let Some(idx) = Self::find_cached(&entries, sector) {
                let now = self.tick();
                entries[idx].last_used = now;
                entries[idx].data
            } else {
                let data = self.disk_read_blocking(sector);
                let idx = self.expel(&mut entries);
                let now = self.tick();
                entries[idx] = CacheEntry {
                    sector: Some(sector),
                    dirty: false,
                    last_used: now,
                    data,
                };
                data
            }
        };
        self.io_lock.release();
        result
    }

    /// Write `data` to `sector`. On a cache hit, marks the existing entry
    /// dirty rather than writing through; the sector reaches disk on
    /// eviction or flush. On a miss, writes straight to disk instead of
    /// claiming (and potentially evicting) a cache slot for a sector
    /// nobody has actually read yet.
    pub fn write_sector(&self, sector: u32, data: &[u8; SECTOR_SIZE]) {
        self.io_lock.acquire();
        {
            let mut entries = self.entries.lock().unwrap();
            match Self::find_cached(&entries, sector) {
                Some(idx) => {
                    let now = self.tick();
                    entries[idx] = CacheEntry {
                        sector: Some(sector),
                        dirty: true,
                        last_used: now,
                        data: *data,
                    };
                }
                None => {
                    self.disk_write_blocking(sector, data);
                }
            }
        }
        self.io_lock.release();
    }

    /// Write every dirty entry back to disk. Called on filesystem
    /// shutdown/unmount.
    pub fn flush_all(&self) {
        self.io_lock.acquire();
        let mut entries = self.entries.lock().unwrap();
        for e in entries.iter_mut() {
            if e.dirty {
                if let Some(sector) = e.sector {
                    self.disk_write_blocking(sector, &e.data);
                    e.dirty = false;
                }
            }
        }
        self.io_lock.release();
    }
}
