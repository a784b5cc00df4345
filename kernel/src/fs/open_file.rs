//! Open files.
//!
//! Grounded on the original's `OpenFile`/`OpenFileEntry`: every open of the
//! same underlying sector shares one reader-writer-locked [`SharedFile`], so
//! that two processes with the same file open see each other's writes and a
//! `Remove` of a still-open file can be deferred rather than silently
//! corrupting the other's reads. `ReadAt`/`WriteAt`'s read-modify-write
//! sector handling for unaligned offsets is carried over unchanged, just
//! expressed in terms of the [`SectorCache`] instead of raw `synchDisk`
//! calls.
use super::cache::SectorCache;
use super::free_map::FreeMap;
use super::header::FileHeader;
use crate::error::{KernelError, NachosError, Result};
use crate::sync::RwLock;
use crate::thread::scheduler::Scheduler;
use machine::disk::SECTOR_SIZE;
use std::sync::{Arc, Mutex};

/// Read up to `buf.len()` bytes starting at `position`, truncating at
/// end-of-file. Returns the number of bytes actually read.
pub(crate) fn read_at(header: &FileHeader, cache: &SectorCache, position: usize, buf: &mut [u8]) -> usize {
    let file_length = header.file_length();
    if buf.is_empty() || position >= file_length {
        return 0;
    }
    let num_bytes = buf.len().min(file_length - position);
    let first_sector = position / SECTOR_SIZE;
    let last_sector = (position + num_bytes - 1) / SECTOR_SIZE;
    for s in first_sector..=last_sector {
        let data = cache.read_sector(header.index_to_sector(cache, s));
        let sector_start = s * SECTOR_SIZE;
        let lo = position.max(sector_start) - sector_start;
        let hi = (position + num_bytes).min(sector_start + SECTOR_SIZE) - sector_start;
        let dst_start = sector_start + lo - position;
        buf[dst_start..dst_start + (hi - lo)].copy_from_slice(&data[lo..hi]);
    }
    num_bytes
}

/// Write `data` at `position`, assuming the header already covers
/// `position + data.len()` bytes (callers grow the header first). Partially
/// written sectors are read back first so the untouched bytes survive.
pub(crate) fn write_at(header: &FileHeader, cache: &SectorCache, position: usize, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    let first_sector = position / SECTOR_SIZE;
    let last_sector = (position + data.len() - 1) / SECTOR_SIZE;
    for s in first_sector..=last_sector {
        let sector_start = s * SECTOR_SIZE;
        let lo = position.max(sector_start) - sector_start;
        let hi = (position + data.len()).min(sector_start + SECTOR_SIZE) - sector_start;
        let mut sector_data = if lo == 0 && hi == SECTOR_SIZE {
            [0u8; SECTOR_SIZE]
        } else {
            cache.read_sector(header.index_to_sector(cache, s))
        };
        let src_start = sector_start + lo - position;
        sector_data[lo..hi].copy_from_slice(&data[src_start..src_start + (hi - lo)]);
        cache.write_sector(header.index_to_sector(cache, s), &sector_data);
    }
}

/// The inode-level shared state for one open file: exactly one `SharedFile`
/// exists per header sector at a time, no matter how many file descriptors
/// or processes have it open, so reads see concurrent writes and the
/// refcount reflects true sharing.
pub struct SharedFile {
    sector: u32,
    header: RwLock<FileHeader>,
    cache: Arc<SectorCache>,
    free_map: Arc<Mutex<FreeMap>>,
    refcount: Mutex<u32>,
    pending_remove: Mutex<bool>,
}

impl SharedFile {
    pub fn open(
        scheduler: Arc<Scheduler>,
        sector: u32,
        cache: Arc<SectorCache>,
        free_map: Arc<Mutex<FreeMap>>,
    ) -> Arc<Self> {
        let header = FileHeader::fetch_from(&cache, sector);
        Arc::new(Self {
            sector,
            header: RwLock::new(scheduler, header),
            cache,
            free_map,
            refcount: Mutex::new(0),
            pending_remove: Mutex::new(false),
        })
    }

    pub fn sector(&self) -> u32 {
        self.sector
    }

    fn retain(&self) {
        *self.refcount.lock().unwrap() += 1;
    }

    /// Drop one reference. Returns `true` once the last reference is gone,
    /// at which point the caller (the filesystem's open-file table) should
    /// drop its own entry and, if [`mark_pending_remove`] was called, finish
    /// deleting the file.
    fn release(&self) -> bool {
        let mut refcount = self.refcount.lock().unwrap();
        *refcount -= 1;
        *refcount == 0
    }

    pub fn refcount(&self) -> u32 {
        *self.refcount.lock().unwrap()
    }

    /// Record that `Remove` was requested while this file was still open.
    /// The caller deletes the directory entry immediately but leaves the
    /// header and data sectors alone until the last handle closes.
    pub fn mark_pending_remove(&self) {
        *self.pending_remove.lock().unwrap() = true;
    }

    pub fn is_pending_remove(&self) -> bool {
        *self.pending_remove.lock().unwrap()
    }

    pub fn length(&self) -> usize {
        self.header.read().file_length()
    }

    pub fn read_at(&self, position: usize, buf: &mut [u8]) -> usize {
        let header = self.header.read();
        read_at(&header, &self.cache, position, buf)
    }

    pub fn write_at(&self, position: usize, data: &[u8]) -> Result<usize> {
        let mut header = self.header.write();
        let file_length = header.file_length();
        let mut num_bytes = data.len();
        if position + num_bytes > file_length {
            let extra = position + num_bytes - file_length;
            let mut free_map = self.free_map.lock().unwrap();
            match header.grow(&mut free_map, &self.cache, extra) {
                Ok(()) => {}
                Err(NachosError::Kernel(KernelError::NoSpace)) => {
                    num_bytes = file_length.saturating_sub(position);
                }
                Err(e) => return Err(e),
            }
            drop(free_map);
            header.write_back(&self.cache, self.sector);
        }
        if num_bytes == 0 {
            return Ok(0);
        }
        write_at(&header, &self.cache, position, &data[..num_bytes]);
        Ok(num_bytes)
    }

    /// Release every data sector and the header's own sector. Only valid to
    /// call once the refcount has reached zero.
    pub fn deallocate(&self) {
        let header = self.header.write();
        let mut free_map = self.free_map.lock().unwrap();
        header.deallocate(&mut free_map, &self.cache);
        free_map.clear(self.sector);
    }
}

/// A per-descriptor handle onto a [`SharedFile`]: its own seek position,
/// shared data. Matches the original's `OpenFile`, whose `seekPosition` is
/// per-instance while `hdr`/`rwLock` live in the shared `OpenFileEntry`.
pub struct OpenFile {
    shared: Arc<SharedFile>,
    position: Mutex<usize>,
}

impl OpenFile {
    pub fn new(shared: Arc<SharedFile>) -> Self {
        shared.retain();
        Self {
            shared,
            position: Mutex::new(0),
        }
    }

    pub fn sector(&self) -> u32 {
        self.shared.sector()
    }

    pub fn shared(&self) -> &Arc<SharedFile> {
        &self.shared
    }

    pub fn seek(&self, position: usize) {
        *self.position.lock().unwrap() = position;
    }

    pub fn tell(&self) -> usize {
        *self.position.lock().unwrap()
    }

    pub fn length(&self) -> usize {
        self.shared.length()
    }

    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut pos = self.position.lock().unwrap();
        let n = self.shared.read_at(*pos, buf);
        *pos += n;
        n
    }

    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let mut pos = self.position.lock().unwrap();
        let n = self.shared.write_at(*pos, data)?;
        *pos += n;
        Ok(n)
    }

    pub fn read_at(&self, position: usize, buf: &mut [u8]) -> usize {
        self.shared.read_at(position, buf)
    }

    pub fn write_at(&self, position: usize, data: &[u8]) -> Result<usize> {
        self.shared.write_at(position, data)
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        if self.shared.release() && self.shared.is_pending_remove() {
            self.shared.deallocate();
        }
    }
}
