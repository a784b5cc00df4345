//! Registers, physical memory and the software-filled TLB.
//!
//! This module deliberately stops short of a full MIPS fetch-decode-execute
//! loop. The kernel only ever interacts with the machine through traps
//! (syscalls, page faults, addressing errors) and through the user-memory
//! accessors built on [`PhysicalMemory`]; the bytecode interpreter that
//! would turn a compiled user program into a stream of such traps is
//! outside this core. [`Cpu::raise`] lets kernel-side tests and the
//! exception dispatcher inject traps directly, which is the only contract
//! the rest of the kernel depends on.
use crate::addressing::{FrameNumber, Vpn};
use std::fmt;

/// Register holding the syscall number on entry to the dispatcher.
pub const REG_SYSCALL_CODE: usize = 2;
/// Register holding a syscall's return value on exit.
pub const REG_RETURN: usize = 2;
/// Registers holding syscall arguments 0..=3.
pub const REG_ARGS: [usize; 4] = [4, 5, 6, 7];
/// Number of general-purpose registers, MIPS-style (r0 is hardwired zero).
pub const NUM_REGISTERS: usize = 32;

/// A snapshot of the user-visible register file, saved/restored across
/// context switches and exceptions.
#[derive(Clone, Copy)]
pub struct RegisterFile {
    pub gpr: [u64; NUM_REGISTERS],
    pub pc: u64,
    pub next_pc: u64,
}

impl RegisterFile {
    /// A fresh register file with every register zeroed, `pc`/`next_pc`
    /// set to `entry`/`entry + 4`.
    pub fn new(entry: u64) -> Self {
        Self {
            gpr: [0; NUM_REGISTERS],
            pc: entry,
            next_pc: entry + 4,
        }
    }

    /// Advance the program counter past the instruction that trapped, the
    /// way a syscall return must (a page fault must not call this, since
    /// the faulting instruction needs to be re-executed).
    pub fn advance_pc(&mut self) {
        self.pc = self.next_pc;
        self.next_pc += 4;
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterFile")
            .field("pc", &self.pc)
            .field("r2", &self.gpr[2])
            .finish_non_exhaustive()
    }
}

/// Physical memory as a flat byte array, shared by every address space.
pub struct PhysicalMemory {
    bytes: Vec<u8>,
}

impl PhysicalMemory {
    /// Allocate `num_frames` frames worth of zeroed physical memory.
    pub fn new(num_frames: usize, frame_size: usize) -> Self {
        Self {
            bytes: vec![0u8; num_frames * frame_size],
        }
    }

    /// Total size, in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read `buf.len()` bytes starting at physical offset `pa`.
    ///
    /// Panics (a fatal kernel invariant violation, never a user-triggerable
    /// path) if the range falls outside physical memory.
    pub fn read(&self, pa: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.bytes[pa..pa + buf.len()]);
    }

    /// Write `buf` starting at physical offset `pa`.
    pub fn write(&mut self, pa: usize, buf: &[u8]) {
        self.bytes[pa..pa + buf.len()].copy_from_slice(buf);
    }

    /// Zero an entire frame.
    pub fn zero_frame(&mut self, frame: FrameNumber, frame_size: usize) {
        let base = frame.0 * frame_size;
        self.bytes[base..base + frame_size].fill(0);
    }
}

/// One entry of the software-managed translation cache.
#[derive(Clone, Copy, Debug)]
pub struct TlbEntry {
    pub vpn: Vpn,
    pub frame: FrameNumber,
    pub valid: bool,
    pub dirty: bool,
    pub used: bool,
    pub last_used_tick: u64,
    /// Tick the entry was installed at. Unlike `last_used_tick`, this is
    /// never updated by [`Tlb::lookup`], so it still reflects arrival
    /// order for a FIFO victim-selection policy.
    pub inserted_tick: u64,
}

impl TlbEntry {
    const fn invalid() -> Self {
        Self {
            vpn: Vpn(0),
            frame: FrameNumber(0),
            valid: false,
            dirty: false,
            used: false,
            last_used_tick: 0,
            inserted_tick: 0,
        }
    }
}

/// The fixed-size software-filled TLB. Victim selection and refill policy
/// live in the kernel's page-fault handler; this struct only stores
/// entries and performs the associative lookup a real MMU would do in
/// hardware.
pub struct Tlb {
    entries: Vec<TlbEntry>,
}

impl Tlb {
    /// Create a TLB with `size` entries, all invalid.
    pub fn new(size: usize) -> Self {
        Self {
            entries: vec![TlbEntry::invalid(); size],
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `vpn`, marking the entry used and stamping `tick` on hit.
    pub fn lookup(&mut self, vpn: Vpn, tick: u64) -> Option<FrameNumber> {
        for e in self.entries.iter_mut() {
            if e.valid && e.vpn == vpn {
                e.used = true;
                e.last_used_tick = tick;
                return Some(e.frame);
            }
        }
        None
    }

    /// Read entry `index` directly (used by the kernel's LRU/FIFO victim
    /// selection, which needs to compare every slot).
    pub fn entry(&self, index: usize) -> TlbEntry {
        self.entries[index]
    }

    /// Overwrite entry `index` with a fresh mapping.
    pub fn install(&mut self, index: usize, vpn: Vpn, frame: FrameNumber, tick: u64) {
        self.entries[index] = TlbEntry {
            vpn,
            frame,
            valid: true,
            dirty: false,
            used: true,
            last_used_tick: tick,
            inserted_tick: tick,
        };
    }

    /// Mark the entry mapping `vpn`, if any, dirty (written through a store
    /// instruction).
    pub fn mark_dirty(&mut self, vpn: Vpn) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.valid && e.vpn == vpn) {
            e.dirty = true;
        }
    }

    /// Invalidate every entry mapping `vpn`. Used when a page is evicted or
    /// its address space is torn down.
    pub fn invalidate(&mut self, vpn: Vpn) {
        for e in self.entries.iter_mut() {
            if e.valid && e.vpn == vpn {
                *e = TlbEntry::invalid();
            }
        }
    }

    /// Invalidate every entry. Used on address-space switch, since stale
    /// entries from the outgoing address space must never be consulted.
    pub fn flush(&mut self) {
        for e in self.entries.iter_mut() {
            *e = TlbEntry::invalid();
        }
    }
}

/// A trap raised by the simulated CPU, decoded by the kernel's exception
/// dispatcher.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Exception {
    /// `syscall` instruction; the code and arguments are in [`RegisterFile`].
    Syscall,
    /// TLB miss or invalid page-table entry for `vpn`.
    PageFault { vpn: Vpn },
    /// Access to an address outside the address space, or to an
    /// unaligned/otherwise malformed address.
    AddressError { va: usize },
    /// Arithmetic overflow on a trapping instruction (e.g. `add`, not
    /// `addu`).
    ArithmeticOverflow,
}
