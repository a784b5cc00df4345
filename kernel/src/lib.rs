//! The cooperative thread kernel: scheduler, synchronization primitives,
//! demand-paged virtual memory, on-disk file system and the syscall
//! dispatcher that ties them to the simulated [`machine`] crate.
//!
//! Grounded on `keos::rust_main`/`SystemConfigurationBuilder`: [`Kernel::boot`]
//! is the single entry point that wires every subsystem together from a
//! [`Config`], replacing the original's compile-time globals and
//! process-wide statics with one explicit context object threaded through
//! the rest of the kernel (spec.md §9's "global mutable singleton →
//! explicit kernel context object" redesign).
pub mod config;
pub mod console;
pub mod error;
pub mod fs;
pub mod mm;
pub mod sync;
pub mod syscall;
pub mod thread;

pub use config::Config;
pub use error::{KernelError, NachosError, Result};

use console::SynchConsole;
use fs::FileSystem;
use mm::MemoryManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use syscall::Dispatcher;
use thread::scheduler::Scheduler;
use thread::ThreadBuilder;

/// Average number of host-clock milliseconds the background clock driver
/// sleeps between simulated ticks. The simulation has no real-time
/// requirement; this just keeps the driver thread from spinning at 100%
/// CPU while it pumps the event queue.
const CLOCK_DRIVER_PERIOD: std::time::Duration = std::time::Duration::from_millis(1);

/// A fully booted kernel: every subsystem wired together, with the
/// calling OS thread registered as the kernel's first schedulable thread
/// and a background thread driving the simulated clock.
pub struct Kernel {
    pub scheduler: Arc<Scheduler>,
    pub mm: Arc<MemoryManager>,
    pub fs: Arc<FileSystem>,
    pub console: Arc<SynchConsole>,
    pub dispatcher: Arc<Dispatcher>,
    pub event_queue: Arc<Mutex<machine::EventQueue>>,
    shutdown: Arc<AtomicBool>,
    clock_driver: Option<std::thread::JoinHandle<()>>,
}

impl Kernel {
    /// Boot a kernel against `disk`. If `format` is set, a fresh (empty)
    /// filesystem is laid down; otherwise the disk is mounted as an
    /// existing one. The calling OS thread becomes the kernel's first
    /// runnable thread, exactly as the thread that calls `Kernel::boot`
    /// becomes the only schedulable thread at the start of the original's
    /// `main`.
    pub fn boot(config: Config, disk: Arc<machine::Disk>, format: bool) -> Result<Self> {
        let scheduler = Arc::new(Scheduler::new(config.scheduler_policy, config.time_slice_ticks));
        ThreadBuilder::new("main").register_current(&scheduler);

        let event_queue = Arc::new(Mutex::new(machine::EventQueue::new()));
        let cache = Arc::new(fs::cache::SectorCache::new(disk, event_queue.clone(), scheduler.clone()));
        let fs = Arc::new(if format {
            FileSystem::format(cache, scheduler.clone(), config.disk_sectors)?
        } else {
            FileSystem::mount(cache, scheduler.clone())?
        });

        let mm = Arc::new(MemoryManager::with_tlb_replacement_policy(
            config.num_frames,
            config.swap_slots,
            config.tlb_size,
            config.tlb_replacement_policy,
        ));
        let console = Arc::new(SynchConsole::new(
            Arc::new(machine::Console::new()),
            event_queue.clone(),
            scheduler.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(mm.clone(), fs.clone(), console.clone(), config.max_threads));

        let shutdown = Arc::new(AtomicBool::new(false));
        let clock_driver = Self::spawn_clock_driver(scheduler.clone(), event_queue.clone(), shutdown.clone());

        Ok(Self {
            scheduler,
            mm,
            fs,
            console,
            dispatcher,
            event_queue,
            shutdown,
            clock_driver: Some(clock_driver),
        })
    }

    /// Background driver for the tick-driven event queue: advances the
    /// simulated clock and fires due disk/console completions and
    /// round-robin preemption checks, the hosted equivalent of the
    /// original's periodic timer interrupt. Runs on its own host OS thread
    /// since, unlike every kernel thread, it never holds the run token —
    /// it only ever touches the event queue and the scheduler's
    /// tick-accounting, both already lock-guarded.
    fn spawn_clock_driver(
        scheduler: Arc<Scheduler>,
        event_queue: Arc<Mutex<machine::EventQueue>>,
        shutdown: Arc<AtomicBool>,
    ) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("clock-driver".into())
            .spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    let now = event_queue.lock().unwrap().tick();
                    thread::on_tick(&scheduler, now as u64);
                    std::thread::sleep(CLOCK_DRIVER_PERIOD);
                }
            })
            .expect("failed to spawn the kernel's clock-driver thread")
    }

    /// Whether the syscall dispatcher has serviced a `halt`.
    pub fn halted(&self) -> bool {
        self.dispatcher.halted()
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(driver) = self.clock_driver.take() {
            let _ = driver.join();
        }
    }
}
