//! The simulated asynchronous disk.
//!
//! Real Nachos models a disk that accepts one outstanding request at a
//! time and signals completion some number of simulated ticks later via
//! an interrupt. We reproduce that contract on top of [`EventQueue`]:
//! [`Disk::read_request`]/[`Disk::write_request`] perform the byte-array
//! I/O immediately (there is nothing to actually wait on), but the
//! completion callback is *scheduled*, not invoked inline, so callers that
//! depend on the asynchronous contract (the kernel's sector cache, in
//! particular) cannot observe the request as done until the event queue
//! is pumped.
use crate::interrupt::EventQueue;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

/// Sector size, in bytes. Matches the spec's "fixed power of two, typically
/// 128 bytes" default.
pub const SECTOR_SIZE: usize = 128;

/// Average simulated latency of a disk request, in ticks, mirroring the
/// original Nachos disk model's rotational-latency constant.
pub const DISK_LATENCY_TICKS: u64 = 50;

/// A request to the simulated disk.
enum Op {
    Read,
    Write,
}

/// An asynchronous, sector-granular disk image backed by a host file (or
/// an in-memory buffer for tests).
pub struct Disk {
    backing: Mutex<Backing>,
    num_sectors: usize,
}

enum Backing {
    File(std::fs::File),
    Memory(Vec<u8>),
}

impl Backing {
    fn read_sector(&mut self, sector: usize, buf: &mut [u8; SECTOR_SIZE]) {
        match self {
            Backing::File(f) => {
                f.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64)).unwrap();
                f.read_exact(buf).unwrap();
            }
            Backing::Memory(m) => {
                let off = sector * SECTOR_SIZE;
                buf.copy_from_slice(&m[off..off + SECTOR_SIZE]);
            }
        }
    }

    fn write_sector(&mut self, sector: usize, buf: &[u8; SECTOR_SIZE]) {
        match self {
            Backing::File(f) => {
                f.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64)).unwrap();
                f.write_all(buf).unwrap();
            }
            Backing::Memory(m) => {
                let off = sector * SECTOR_SIZE;
                m[off..off + SECTOR_SIZE].copy_from_slice(buf);
            }
        }
    }
}

impl Disk {
    /// Format a fresh in-memory disk image of `num_sectors` sectors, all
    /// zeroed. Used by tests and by `-f` (format) in the CLI.
    pub fn new_formatted(num_sectors: usize) -> Self {
        Self {
            backing: Mutex::new(Backing::Memory(vec![0u8; num_sectors * SECTOR_SIZE])),
            num_sectors,
        }
    }

    /// Open (or create and zero-fill) a host file as the disk's backing
    /// store.
    pub fn open_file(path: &std::path::Path, num_sectors: usize) -> std::io::Result<Self> {
        let need_format = !path.exists();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        if need_format {
            file.set_len((num_sectors * SECTOR_SIZE) as u64)?;
        }
        Ok(Self {
            backing: Mutex::new(Backing::File(file)),
            num_sectors,
        })
    }

    /// Total sector count of this disk.
    pub fn num_sectors(&self) -> usize {
        self.num_sectors
    }

    fn submit(
        self: &Arc<Self>,
        queue: &mut EventQueue,
        sector: usize,
        op: Op,
        buf: &mut [u8; SECTOR_SIZE],
        on_done: impl FnOnce() + Send + 'static,
    ) {
        assert!(sector < self.num_sectors, "disk sector {sector} out of range");
        let mut backing = self.backing.lock().unwrap();
        match op {
            Op::Read => backing.read_sector(sector, buf),
            Op::Write => backing.write_sector(sector, buf),
        }
        drop(backing);
        queue.schedule(DISK_LATENCY_TICKS, on_done);
    }

    /// Issue a read request for `sector`. The sector contents are copied
    /// into `buf` synchronously (the host-backed image has no real seek
    /// latency to emulate), but `on_done` only runs once `queue` has ticked
    /// past the simulated completion deadline.
    pub fn read_request(
        self: &Arc<Self>,
        queue: &mut EventQueue,
        sector: usize,
        buf: &mut [u8; SECTOR_SIZE],
        on_done: impl FnOnce() + Send + 'static,
    ) {
        self.submit(queue, sector, Op::Read, buf, on_done);
    }

    /// Issue a write request for `sector`.
    pub fn write_request(
        self: &Arc<Self>,
        queue: &mut EventQueue,
        sector: usize,
        buf: &[u8; SECTOR_SIZE],
        on_done: impl FnOnce() + Send + 'static,
    ) {
        let mut scratch = *buf;
        self.submit(queue, sector, Op::Write, &mut scratch, on_done);
    }
}
