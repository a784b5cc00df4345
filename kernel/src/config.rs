//! Kernel boot configuration.
//!
//! The original Nachos wires most of these as compile-time `#define`s or
//! process-wide globals set once at startup. We collect them into an
//! explicit struct instead, built by `nachos` from CLI flags and threaded
//! into [`crate::Kernel::boot`], so a test can boot several independently
//! configured kernels in one process.
use crate::mm::tlb::TlbReplacementPolicy;
use crate::thread::scheduler::SchedulerPolicy;

/// Number of physical frames backing the simulated machine's memory.
pub const DEFAULT_NUM_FRAMES: usize = 32;
/// Number of entries in the software TLB.
pub const DEFAULT_TLB_SIZE: usize = 4;
/// Ticks per scheduler time slice.
pub const DEFAULT_TIME_SLICE: u64 = 100;
/// Maximum number of live threads the kernel will create.
pub const DEFAULT_MAX_THREADS: usize = 128;
/// Default disk size, in sectors.
pub const DEFAULT_DISK_SECTORS: usize = 2048;
/// Number of page-sized slots in the swap area.
pub const DEFAULT_SWAP_SLOTS: usize = 64;

/// Kernel boot configuration, built by the host binary from CLI flags
/// (or defaults, for tests) and consumed once at boot.
#[derive(Clone, Debug)]
pub struct Config {
    pub num_frames: usize,
    pub tlb_size: usize,
    pub swap_slots: usize,
    pub time_slice_ticks: u64,
    pub max_threads: usize,
    pub disk_sectors: usize,
    pub scheduler_policy: SchedulerPolicy,
    pub tlb_replacement_policy: TlbReplacementPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_frames: DEFAULT_NUM_FRAMES,
            tlb_size: DEFAULT_TLB_SIZE,
            swap_slots: DEFAULT_SWAP_SLOTS,
            time_slice_ticks: DEFAULT_TIME_SLICE,
            max_threads: DEFAULT_MAX_THREADS,
            disk_sectors: DEFAULT_DISK_SECTORS,
            scheduler_policy: SchedulerPolicy::RoundRobin,
            tlb_replacement_policy: TlbReplacementPolicy::Lru,
        }
    }
}
