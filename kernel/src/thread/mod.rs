//! Thread control blocks, the cooperative scheduler's token-passing
//! dispatch, and the `Current`/`JoinHandle`/`ParkHandle` API surface kernel
//! code and syscalls build on.
pub mod scheduler;

use crate::fs::open_file::OpenFile;
use crate::mm::AddressSpace;
use machine::RegisterFile;
use scheduler::Scheduler;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Lowest legal (highest-urgency) priority value. Mirrors the spec's 0 =
/// highest, 5 = lowest priority range.
pub const HIGHEST_PRIORITY: u8 = 0;
/// Highest legal (lowest-urgency) priority value.
pub const LOWEST_PRIORITY: u8 = 5;
/// Default priority assigned to a thread that does not request one.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Lifecycle state of a kernel thread.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThreadState {
    Created,
    Ready,
    Running,
    Blocked,
    Exited(i32),
}

/// The scheduler-visible half of a thread: everything needed to enqueue,
/// dispatch and join it. Kept separate from the thread-local [`Thread`]
/// handle so `Arc<ThreadControl>` can be shared across threads (the
/// scheduler's ready queue, joiners, wakers) without exposing thread-local
/// state.
pub struct ThreadControl {
    pub tid: u64,
    pub name: String,
    pub priority: u8,
    pub state: Mutex<ThreadState>,
    pub(crate) run_flag: Mutex<bool>,
    pub(crate) run_cv: Condvar,
    exit_code: Mutex<Option<i32>>,
    exit_cv: Condvar,
    waiters: Mutex<Vec<Arc<ThreadControl>>>,
    ticks_used: AtomicU64,
    last_tick: AtomicU64,
    pub(crate) preempt_requested: AtomicBool,
}

impl ThreadControl {
    fn new(tid: u64, name: String, priority: u8, runnable_now: bool) -> Arc<Self> {
        Arc::new(Self {
            tid,
            name,
            priority,
            state: Mutex::new(if runnable_now {
                ThreadState::Running
            } else {
                ThreadState::Created
            }),
            run_flag: Mutex::new(runnable_now),
            run_cv: Condvar::new(),
            exit_code: Mutex::new(None),
            exit_cv: Condvar::new(),
            waiters: Mutex::new(Vec::new()),
            ticks_used: AtomicU64::new(0),
            last_tick: AtomicU64::new(0),
            preempt_requested: AtomicBool::new(false),
        })
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap()
    }
}

/// Per-thread state only the owning OS thread ever touches: name lookup,
/// the open-file table, last-tick bookkeeping used by the round-robin
/// policy's preemption check.
pub struct Thread {
    pub control: Arc<ThreadControl>,
    pub(crate) scheduler: Arc<Scheduler>,
    fd_table: Mutex<BTreeMap<i32, Arc<OpenFile>>>,
    next_fd: Mutex<i32>,
    address_space: Mutex<Option<Arc<AddressSpace>>>,
    /// The saved user-mode register file for a user thread, read and
    /// written by the syscall dispatcher on trap entry/exit. `None` for a
    /// pure kernel thread that never runs user code.
    registers: Mutex<Option<RegisterFile>>,
}

impl Thread {
    /// Allocate the next free file descriptor and install `file` under it.
    pub fn install_fd(&self, file: Arc<OpenFile>) -> i32 {
        let mut next = self.next_fd.lock().unwrap();
        let fd = *next;
        *next += 1;
        self.fd_table.lock().unwrap().insert(fd, file);
        fd
    }

    /// Look up an open file by descriptor.
    pub fn fd(&self, fd: i32) -> Option<Arc<OpenFile>> {
        self.fd_table.lock().unwrap().get(&fd).cloned()
    }

    /// Remove and return a file descriptor, as `close` does.
    pub fn take_fd(&self, fd: i32) -> Option<Arc<OpenFile>> {
        self.fd_table.lock().unwrap().remove(&fd)
    }

    /// The user address space this thread runs against, if it's a user
    /// process rather than a pure kernel thread.
    pub fn address_space(&self) -> Option<Arc<AddressSpace>> {
        self.address_space.lock().unwrap().clone()
    }

    pub fn set_address_space(&self, space: Arc<AddressSpace>) {
        *self.address_space.lock().unwrap() = Some(space);
    }

    pub fn registers(&self) -> RegisterFile {
        self.registers
            .lock()
            .unwrap()
            .expect("register file requested on a thread with no user-mode state")
    }

    pub fn set_registers(&self, regs: RegisterFile) {
        *self.registers.lock().unwrap() = Some(regs);
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<Thread>>> = const { RefCell::new(None) };
}

/// Accessor for the thread-local current-thread handle.
pub struct Current;

impl Current {
    /// Run `f` with a reference to the calling OS thread's kernel
    /// [`Thread`]. Panics (a fatal kernel invariant violation) if called
    /// from a host thread never registered with a scheduler.
    pub fn with<R>(f: impl FnOnce(&Arc<Thread>) -> R) -> R {
        CURRENT.with(|c| {
            let borrow = c.borrow();
            let th = borrow
                .as_ref()
                .expect("Current::with called outside a kernel thread");
            f(th)
        })
    }

    pub fn tid() -> u64 {
        Self::with(|t| t.control.tid)
    }

    pub fn control() -> Arc<ThreadControl> {
        Self::with(|t| t.control.clone())
    }

    /// Give up the CPU, returning to the ready queue at the back (FIFO /
    /// round-robin) or by priority.
    pub fn yield_now() {
        Self::with(|t| {
            *t.control.state.lock().unwrap() = ThreadState::Ready;
            t.scheduler.enqueue(t.control.clone());
            switch_out_and_wait(&t.scheduler, &t.control);
        });
    }

    /// Terminate the calling thread with `exit_code`, waking every joiner
    /// and handing the run token to the next ready thread. Never returns.
    pub fn exit(exit_code: i32) -> ! {
        Self::with(|t| {
            *t.control.state.lock().unwrap() = ThreadState::Exited(exit_code);
            *t.control.exit_code.lock().unwrap() = Some(exit_code);
            t.control.exit_cv.notify_all();
            let waiters = std::mem::take(&mut *t.control.waiters.lock().unwrap());
            for w in waiters {
                wake(&t.scheduler, w);
            }
            LIVE_THREADS.fetch_sub(1, Ordering::SeqCst);
            unregister_tid(t.control.tid);
            t.scheduler.dispatch_next();
        });
        loop {
            std::thread::park();
        }
    }
}

/// Block the calling thread (e.g. on a semaphore or lock) until some other
/// thread calls [`wake`] on it.
pub fn block_self(scheduler: &Arc<Scheduler>, me: &Arc<ThreadControl>) {
    *me.state.lock().unwrap() = ThreadState::Blocked;
    switch_out_and_wait(scheduler, me);
}

/// Move a blocked thread back onto the ready queue. Under
/// [`scheduler::SchedulerPolicy::Priority`], yields immediately if the
/// newly-readied thread outranks the caller, per the scheduler's contract
/// that the caller of ready(t) is responsible for that yield.
pub fn wake(scheduler: &Arc<Scheduler>, t: Arc<ThreadControl>) {
    *t.state.lock().unwrap() = ThreadState::Ready;
    let priority = t.priority;
    scheduler.enqueue(t);
    yield_if_outranked(scheduler, priority);
}

/// Yield the caller if `priority` would outrank the currently-running
/// thread under a strict-priority scheduler. A no-op under any other
/// policy, where dispatch order doesn't depend on priority at all.
fn yield_if_outranked(scheduler: &Arc<Scheduler>, priority: u8) {
    if scheduler.policy() != scheduler::SchedulerPolicy::Priority {
        return;
    }
    if let Some(running) = scheduler.current() {
        if priority < running.priority {
            Current::yield_now();
        }
    }
}

/// Idle-loop backoff while waiting for the ready queue to gain an entry.
/// Mirrors the original's `Interrupt::Idle()`: with no kernel thread
/// runnable, the simulated CPU just waits for the next asynchronous
/// completion (disk, console, timer) to wake one. Here that completion is
/// delivered by the kernel's background clock-driver OS thread, so this
/// thread briefly sleeps rather than spin entirely uncontested.
const IDLE_BACKOFF: std::time::Duration = std::time::Duration::from_micros(200);

fn switch_out_and_wait(scheduler: &Arc<Scheduler>, me: &Arc<ThreadControl>) {
    while scheduler.dispatch_next().is_none() {
        // No ready thread right now, including `me` itself: some
        // concurrent device completion (handled off the kernel-thread
        // pool, on the clock driver) has to `wake` someone first.
        std::thread::sleep(IDLE_BACKOFF);
    }
    let mut flag = me.run_flag.lock().unwrap();
    while !*flag {
        flag = me.run_cv.wait(flag).unwrap();
    }
    *flag = false;
    *me.state.lock().unwrap() = ThreadState::Running;
}

/// A handle used to join a thread and retrieve its exit code.
pub struct JoinHandle {
    control: Arc<ThreadControl>,
    scheduler: Arc<Scheduler>,
}

impl JoinHandle {
    pub fn tid(&self) -> u64 {
        self.control.tid
    }

    /// Block the calling kernel thread until the target exits, returning
    /// its exit code. Cooperates with the scheduler: the caller is taken
    /// off the ready queue while waiting, exactly like blocking on a
    /// semaphore.
    pub fn join(self) -> i32 {
        if let Some(code) = self.control.exit_code() {
            return code;
        }
        let me = Current::control();
        self.control.waiters.lock().unwrap().push(me.clone());
        loop {
            if let Some(code) = self.control.exit_code() {
                return code;
            }
            block_self(&self.scheduler, &me);
        }
    }
}

/// A handle to a thread that has been created but not yet made runnable.
pub struct ParkHandle {
    control: Arc<ThreadControl>,
    scheduler: Arc<Scheduler>,
}

impl ParkHandle {
    /// Move the parked thread onto the ready queue.
    pub fn unpark(self) {
        *self.control.state.lock().unwrap() = ThreadState::Ready;
        self.scheduler.enqueue(self.control);
    }
}

static NEXT_TID: AtomicU64 = AtomicU64::new(1);
static LIVE_THREADS: AtomicU64 = AtomicU64::new(1);
static LIVE_TIDS: Mutex<Option<std::collections::BTreeSet<u64>>> = Mutex::new(None);

fn register_tid(tid: u64) {
    LIVE_TIDS
        .lock()
        .unwrap()
        .get_or_insert_with(Default::default)
        .insert(tid);
}

fn unregister_tid(tid: u64) {
    if let Some(set) = LIVE_TIDS.lock().unwrap().as_mut() {
        set.remove(&tid);
    }
}

/// Whether `tid` currently names a live kernel thread. Used by the
/// message-passing mailbox to reject sends to a nonexistent destination.
pub fn is_alive(tid: u64) -> bool {
    LIVE_TIDS
        .lock()
        .unwrap()
        .as_ref()
        .is_some_and(|s| s.contains(&tid))
}

/// Builds and spawns a new kernel thread.
pub struct ThreadBuilder {
    name: String,
    priority: u8,
}

impl ThreadBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn priority(mut self, priority: u8) -> Self {
        assert!(priority <= LOWEST_PRIORITY, "priority out of range");
        self.priority = priority;
        self
    }

    fn build_and_start(
        self,
        scheduler: Arc<Scheduler>,
        max_threads: usize,
        runnable_now: bool,
        f: impl FnOnce() + Send + 'static,
    ) -> (Arc<ThreadControl>, std::thread::JoinHandle<()>) {
        if LIVE_THREADS.fetch_add(1, Ordering::SeqCst) as usize >= max_threads {
            panic!("thread-count exceeded (fatal kernel invariant violated)");
        }
        let tid = NEXT_TID.fetch_add(1, Ordering::SeqCst);
        let control = ThreadControl::new(tid, self.name.clone(), self.priority, runnable_now);
        register_tid(tid);
        let sched_for_thread = scheduler.clone();
        let control_for_thread = control.clone();
        let handle = std::thread::Builder::new()
            .name(self.name)
            .spawn(move || {
                let thread = Arc::new(Thread {
                    control: control_for_thread.clone(),
                    scheduler: sched_for_thread.clone(),
                    fd_table: Mutex::new(BTreeMap::new()),
                    next_fd: Mutex::new(2),
                    address_space: Mutex::new(None),
                    registers: Mutex::new(None),
                });
                CURRENT.with(|c| *c.borrow_mut() = Some(thread));
                if !runnable_now {
                    let mut flag = control_for_thread.run_flag.lock().unwrap();
                    while !*flag {
                        flag = control_for_thread.run_cv.wait(flag).unwrap();
                    }
                    *flag = false;
                }
                *control_for_thread.state.lock().unwrap() = ThreadState::Running;
                f();
                Current::exit(0);
            })
            .expect("failed to spawn backing OS thread for kernel thread");
        (control, handle)
    }

    /// Spawn the thread already on the ready queue, returning a
    /// [`JoinHandle`]. Under a strict-priority scheduler, yields the caller
    /// immediately if the new thread outranks it, matching the fork
    /// contract in spec.md §4.2.
    pub fn spawn(
        self,
        scheduler: &Arc<Scheduler>,
        max_threads: usize,
        f: impl FnOnce() + Send + 'static,
    ) -> JoinHandle {
        let priority = self.priority;
        let (control, _os_handle) =
            self.build_and_start(scheduler.clone(), max_threads, false, f);
        scheduler.enqueue(control.clone());
        yield_if_outranked(scheduler, priority);
        JoinHandle {
            control,
            scheduler: scheduler.clone(),
        }
    }

    /// Spawn the thread parked: it will not run until its [`ParkHandle`] is
    /// unparked.
    pub fn spawn_as_parked(
        self,
        scheduler: &Arc<Scheduler>,
        max_threads: usize,
        f: impl FnOnce() + Send + 'static,
    ) -> ParkHandle {
        let (control, _os_handle) =
            self.build_and_start(scheduler.clone(), max_threads, false, f);
        ParkHandle {
            control,
            scheduler: scheduler.clone(),
        }
    }

    /// Register the calling host OS thread itself as a kernel thread
    /// already holding the run token. Used exactly once, at boot, so the
    /// thread that calls `Kernel::boot` becomes the first schedulable
    /// kernel thread instead of a bystander.
    pub fn register_current(self, scheduler: &Arc<Scheduler>) -> Arc<ThreadControl> {
        let tid = NEXT_TID.fetch_add(1, Ordering::SeqCst);
        let control = ThreadControl::new(tid, self.name.clone(), self.priority, true);
        register_tid(tid);
        let thread = Arc::new(Thread {
            control: control.clone(),
            scheduler: scheduler.clone(),
            fd_table: Mutex::new(BTreeMap::new()),
            next_fd: Mutex::new(2),
            address_space: Mutex::new(None),
            registers: Mutex::new(None),
        });
        CURRENT.with(|c| *c.borrow_mut() = Some(thread));
        control
    }
}

/// Called by the kernel's clock-driving loop on every tick. Under
/// round-robin scheduling, if the running thread has used up its time
/// slice this sets its `preempt_requested` flag; it cannot force a context
/// switch directly; because the running thread is a real OS thread
/// executing arbitrary Rust, nothing but that thread can give up the CPU.
/// [`Current::check_preemption`] is the corresponding safe point, called
/// from the syscall dispatcher after each syscall returns — the nearest
/// hosted equivalent to Nachos checking for a pending timer interrupt
/// after every simulated instruction. No-op under FIFO/priority
/// scheduling, which never time-slices.
pub fn on_tick(scheduler: &Arc<Scheduler>, now: u64) {
    if scheduler.policy() != scheduler::SchedulerPolicy::RoundRobin {
        return;
    }
    let Some(current) = scheduler.current() else {
        return;
    };
    let last = current.last_tick.swap(now, Ordering::SeqCst);
    let used = current.ticks_used.fetch_add(now - last, Ordering::SeqCst) + (now - last);
    if used >= scheduler.time_slice_ticks() {
        current.ticks_used.store(0, Ordering::SeqCst);
        current.preempt_requested.store(true, Ordering::SeqCst);
    }
}

impl Current {
    /// Check and clear this thread's preemption flag, yielding if it was
    /// set. Call at a safe point, such as after handling a syscall.
    pub fn check_preemption() {
        let should_yield = Self::with(|t| {
            t.control
                .preempt_requested
                .swap(false, Ordering::SeqCst)
        });
        if should_yield {
            Self::yield_now();
        }
    }
}
