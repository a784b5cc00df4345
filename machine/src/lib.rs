//! The simulated machine: CPU registers and physical memory, a
//! sector-granular disk, a character console, and the interrupt/event-queue
//! plumbing that ties asynchronous device completions back into the
//! kernel's scheduler.
//!
//! Everything in this crate is an external collaborator to the kernel: it
//! has no scheduling policy, no file system, no knowledge of threads. It
//! exposes the contract the spec's machine simulator boundary describes
//! and nothing more.
pub mod addressing;
pub mod console;
pub mod cpu;
pub mod disk;
pub mod interrupt;

pub use addressing::{FrameNumber, Pa, Va, Vpn, PAGE_SIZE};
pub use console::Console;
pub use cpu::{Exception, PhysicalMemory, RegisterFile, Tlb};
pub use disk::{Disk, SECTOR_SIZE};
pub use interrupt::{disable, restore, EventQueue, InterruptGuard, InterruptState};
