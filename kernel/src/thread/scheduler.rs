//! The pluggable ready-queue policy, and the token-passing dispatcher that
//! stands in for a real context switch.
//!
//! Each kernel thread is backed by one parked host OS thread blocked on its
//! own [`std::sync::Condvar`]. At any instant only the thread holding the
//! run token is unparked; [`Scheduler::dispatch_next`] is the only place
//! that hands the token to a different thread, so the "exactly one thread
//! Running at a time" invariant holds by construction rather than by
//! locking discipline.
use super::ThreadControl;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Which ready-queue discipline the scheduler uses to pick the next thread.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerPolicy {
    /// First-in, first-out: never preempts, runs to completion or
    /// voluntary yield.
    Fifo,
    /// Strict priority: lower numeric priority value runs first; ties
    /// broken FIFO.
    Priority,
    /// FIFO ready queue with a time-slice preemption on each tick.
    RoundRobin,
}

pub(super) trait Queue: Send {
    fn push(&mut self, t: Arc<ThreadControl>);
    fn pop(&mut self) -> Option<Arc<ThreadControl>>;
    fn is_empty(&self) -> bool;
}

#[derive(Default)]
struct FifoQueue(VecDeque<Arc<ThreadControl>>);
impl Queue for FifoQueue {
    fn push(&mut self, t: Arc<ThreadControl>) {
        self.0.push_back(t);
    }
    fn pop(&mut self) -> Option<Arc<ThreadControl>> {
        self.0.pop_front()
    }
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Default)]
struct PriorityQueue(VecDeque<Arc<ThreadControl>>);
impl Queue for PriorityQueue {
    fn push(&mut self, t: Arc<ThreadControl>) {
        self.0.push_back(t);
    }
    fn pop(&mut self) -> Option<Arc<ThreadControl>> {
        let (idx, _) = self
            .0
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| t.priority)?;
        self.0.remove(idx)
    }
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Owns the ready queue and the "who holds the token" bookkeeping.
/// [`Queue`] is picked at construction time from [`SchedulerPolicy`] and
/// never changes afterward.
pub struct Scheduler {
    queue: Mutex<Box<dyn Queue>>,
    current: Mutex<Option<Arc<ThreadControl>>>,
    policy: SchedulerPolicy,
    time_slice_ticks: u64,
}

impl Scheduler {
    pub fn new(policy: SchedulerPolicy, time_slice_ticks: u64) -> Self {
        let queue: Box<dyn Queue> = match policy {
            SchedulerPolicy::Fifo | SchedulerPolicy::RoundRobin => {
                Box::new(FifoQueue::default())
            }
            SchedulerPolicy::Priority => Box::new(PriorityQueue::default()),
        };
        Self {
            queue: Mutex::new(queue),
            current: Mutex::new(None),
            policy,
            time_slice_ticks,
        }
    }

    pub fn policy(&self) -> SchedulerPolicy {
        self.policy
    }

    pub fn time_slice_ticks(&self) -> u64 {
        self.time_slice_ticks
    }

    /// The thread currently holding the run token, if any.
    pub fn current(&self) -> Option<Arc<ThreadControl>> {
        self.current.lock().unwrap().clone()
    }

    /// Place `t` onto the ready queue without touching the run token.
    /// Used both when a thread voluntarily yields (it re-enqueues itself
    /// first) and when an unrelated thread wakes a blocked one.
    pub(super) fn enqueue(&self, t: Arc<ThreadControl>) {
        self.queue.lock().unwrap().push(t);
    }

    /// Pop the next ready thread (if any) and hand it the run token. A
    /// `None` result means the ready queue is empty: the caller is the
    /// machine's idle loop and should keep pumping the event queue until
    /// some device completion wakes a thread.
    pub(super) fn dispatch_next(&self) -> Option<Arc<ThreadControl>> {
        let next = self.queue.lock().unwrap().pop();
        *self.current.lock().unwrap() = next.clone();
        if let Some(next) = &next {
            let mut flag = next.run_flag.lock().unwrap();
            *flag = true;
            next.run_cv.notify_one();
        }
        next
    }

    pub(super) fn ready_queue_is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadControl;

    fn control(tid: u64, priority: u8) -> Arc<ThreadControl> {
        ThreadControl::new(tid, format!("t{tid}"), priority, false)
    }

    #[test]
    fn fifo_queue_pops_in_arrival_order() {
        let mut q = FifoQueue::default();
        q.push(control(1, 3));
        q.push(control(2, 3));
        q.push(control(3, 3));
        assert_eq!(q.pop().unwrap().tid, 1);
        assert_eq!(q.pop().unwrap().tid, 2);
        assert_eq!(q.pop().unwrap().tid, 3);
        assert!(q.pop().is_none());
    }

    #[test]
    fn priority_queue_prefers_lower_value_and_breaks_ties_fifo() {
        let mut q = PriorityQueue::default();
        q.push(control(1, 3));
        q.push(control(2, 0));
        q.push(control(3, 0));
        q.push(control(4, 5));
        assert_eq!(q.pop().unwrap().tid, 2);
        assert_eq!(q.pop().unwrap().tid, 3);
        assert_eq!(q.pop().unwrap().tid, 1);
        assert_eq!(q.pop().unwrap().tid, 4);
    }

    #[test]
    fn dispatch_next_hands_out_the_run_token_and_sets_current() {
        let scheduler = Scheduler::new(SchedulerPolicy::Fifo, 10);
        assert!(scheduler.current().is_none());
        scheduler.enqueue(control(7, 3));
        let dispatched = scheduler.dispatch_next().unwrap();
        assert_eq!(dispatched.tid, 7);
        assert_eq!(scheduler.current().unwrap().tid, 7);
        assert!(*dispatched.run_flag.lock().unwrap());
        assert!(scheduler.dispatch_next().is_none());
    }
}
