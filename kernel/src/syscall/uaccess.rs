//! User-space memory access for the syscall dispatcher.
//!
//! Grounded on `keos::syscall::uaccess`'s one-time, consuming pointer types
//! (`UserPtrRO`/`UserPtrWO`/`UserU8SliceRO`/`UserU8SliceWO`/`UserCString`),
//! which prevent TOCTOU by taking `self` on every access. The teacher's
//! version checks one flat range with `Task::access_ok` because its memory
//! is either fully mapped or not; this kernel's user memory is demand-paged,
//! so the range check becomes a fault-or-TLB-hit translation of every page
//! the access touches, done here instead of a single bounds check.
use crate::error::{KernelError, NachosError, Result};
use crate::mm::{AddressSpace, MemoryManager};
use machine::addressing::{Va, PAGE_SIZE};
use std::sync::Arc;

/// The context a syscall handler reads/writes user memory through: which
/// address space, which virtual-memory subsystem, and the tick stamp to
/// record for TLB/page LRU bookkeeping.
pub struct UserAccess<'a> {
    space: &'a Arc<AddressSpace>,
    mm: &'a MemoryManager,
    tick: u64,
}

impl<'a> UserAccess<'a> {
    pub fn new(space: &'a Arc<AddressSpace>, mm: &'a MemoryManager, tick: u64) -> Self {
        Self { space, mm, tick }
    }

    /// Copy `buf.len()` bytes starting at `addr` out of user memory,
    /// faulting in each page touched.
    pub fn read(&self, addr: usize, buf: &mut [u8]) -> Result<()> {
        self.for_each_page(addr, buf.len(), false, |pa, chunk, dst_off| {
            self.mm.read_frame(pa.frame(), pa.offset(), &mut buf[dst_off..dst_off + chunk]);
            Ok(())
        })
    }

    /// Copy `data` into user memory starting at `addr`, faulting in and
    /// dirtying each page touched.
    pub fn write(&self, addr: usize, data: &[u8]) -> Result<()> {
        self.for_each_page(addr, data.len(), true, |pa, chunk, src_off| {
            self.mm.write_frame(pa.frame(), pa.offset(), &data[src_off..src_off + chunk]);
            Ok(())
        })
    }

    /// Read a NUL-terminated string from user memory one byte at a time,
    /// matching the original's `exec`/`open`/`create` path, which reads
    /// the path string through the translation cache rather than assuming
    /// it's contiguous in host memory.
    pub fn read_cstring(&self, addr: usize, max_len: usize) -> Result<String> {
        let mut bytes = Vec::new();
        for i in 0..max_len {
            let mut byte = [0u8; 1];
            self.read(addr + i, &mut byte)?;
            if byte[0] == 0 {
                return String::from_utf8(bytes).map_err(|_| NachosError::Kernel(KernelError::InvalidArgument));
            }
            bytes.push(byte[0]);
        }
        Err(NachosError::Kernel(KernelError::InvalidArgument))
    }

    fn for_each_page(
        &self,
        addr: usize,
        len: usize,
        write: bool,
        mut visit: impl FnMut(machine::addressing::Pa, usize, usize) -> Result<()>,
    ) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        if addr.checked_add(len).is_none() {
            return Err(NachosError::Kernel(KernelError::BadAddress));
        }
        let end = addr + len;
        if end.div_ceil(PAGE_SIZE) > self.space.num_pages() {
            return Err(NachosError::Kernel(KernelError::BadAddress));
        }

        let mut cursor = addr;
        let mut done = 0;
        while cursor < end {
            let va = Va::new(cursor);
            let page_end = va.page_up().into_usize();
            let chunk = (end.min(page_end)) - cursor;
            let pa = self.mm.translate(self.space, va, self.tick, write)?;
            visit(pa, chunk, done)?;
            cursor += chunk;
            done += chunk;
        }
        Ok(())
    }
}
