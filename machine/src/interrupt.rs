//! Interrupt enable/disable and the tick-driven event queue.
//!
//! The simulated machine is single-CPU and cooperative: "disabling
//! interrupts" is simply a flag the kernel's synchronization primitives
//! bracket their critical sections with (see [`disable`]/[`restore`]).
//! Because the whole simulator runs inside one host OS thread and the
//! kernel threads it schedules are cooperative green threads, this flag is
//! thread-local rather than atomic — there is never more than one
//! simulated CPU executing kernel code at a time.
use std::cell::Cell;

thread_local! {
    static ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether interrupts are currently enabled on this (simulated) CPU.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum InterruptState {
    /// Interrupts are enabled; the tick handler and device completions may
    /// run.
    On,
    /// Interrupts are disabled; callers are inside a critical section.
    Off,
}

impl InterruptState {
    /// Read the current interrupt state of this CPU.
    pub fn current() -> Self {
        if ENABLED.with(|e| e.get()) {
            InterruptState::On
        } else {
            InterruptState::Off
        }
    }
}

/// Disable interrupts, returning the previous state so the caller can
/// restore it later with [`restore`].
///
/// Synchronization primitives call this at the start of every critical
/// section. It is safe to call while interrupts are already disabled: the
/// previous state is always threaded back through `restore`, so nested
/// critical sections compose correctly.
#[inline]
pub fn disable() -> InterruptState {
    let prev = InterruptState::current();
    ENABLED.with(|e| e.set(false));
    prev
}

/// Restore interrupts to a previously saved state.
#[inline]
pub fn restore(prev: InterruptState) {
    ENABLED.with(|e| e.set(prev == InterruptState::On));
}

/// A RAII guard that disables interrupts on construction and restores the
/// previous state on drop.
///
/// Mirrors the teacher's `abyss::interrupt::InterruptGuard`: prefer this
/// over raw `disable()`/`restore()` pairs whenever the critical section has
/// a single lexical scope.
pub struct InterruptGuard {
    prev: InterruptState,
}

impl InterruptGuard {
    /// Disable interrupts and capture the previous state.
    pub fn new() -> Self {
        Self { prev: disable() }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        restore(self.prev);
    }
}

/// An event scheduled to fire after a number of simulated clock ticks have
/// elapsed. Used by [`crate::disk::Disk`] and [`crate::console::Console`]
/// to model asynchronous completion without real wall-clock time.
pub struct TimerEvent {
    pub(crate) deadline: u64,
    pub(crate) callback: Box<dyn FnOnce() + Send>,
}

/// The tick-driven event queue that stands in for hardware interrupt
/// delivery.
///
/// Every call to [`EventQueue::tick`] advances the simulated clock by one
/// tick and fires every event whose deadline has passed, in deadline
/// order. The kernel's timer interrupt (preemption) and the disk/console
/// completion interrupts are both modeled as events pushed onto this
/// queue, so a single driving loop (the CPU run loop) is enough to
/// deliver every asynchronous notification the spec calls for.
#[derive(Default)]
pub struct EventQueue {
    now: u64,
    events: Vec<TimerEvent>,
}

impl EventQueue {
    /// Create an empty event queue at tick 0.
    pub fn new() -> Self {
        Self {
            now: 0,
            events: Vec::new(),
        }
    }

    /// The current simulated tick count.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule `callback` to run after `delay` ticks.
    pub fn schedule(&mut self, delay: u64, callback: impl FnOnce() + Send + 'static) {
        self.events.push(TimerEvent {
            deadline: self.now + delay,
            callback: Box::new(callback),
        });
    }

    /// Advance the clock by one tick, running every event whose deadline
    /// has been reached. Returns the number of events fired.
    pub fn tick(&mut self) -> usize {
        self.now += 1;
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| e.deadline <= self.now);
        self.events = pending;
        let n = ready.len();
        for ev in ready {
            (ev.callback)();
        }
        n
    }
}
