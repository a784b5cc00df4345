//! Coverage for the sync primitives not already exercised by
//! `sync_scenarios.rs`: a condition-variable wait/signal handoff, the
//! generic `SynchList` queue, the reader/writer lock, and the message bus.
use kernel::sync::{ConditionVariable, Lock, MessageBus, RwLock, SynchList};
use kernel::thread::scheduler::{Scheduler, SchedulerPolicy};
use kernel::thread::ThreadBuilder;
use std::sync::Arc;

fn scheduler() -> Arc<Scheduler> {
    Arc::new(Scheduler::new(SchedulerPolicy::Fifo, 50))
}

#[test]
fn condvar_wait_blocks_until_a_separate_thread_signals() {
    let scheduler = scheduler();
    ThreadBuilder::new("test-main").register_current(&scheduler);

    let lock = Arc::new(Lock::new(scheduler.clone()));
    let cv = Arc::new(ConditionVariable::new(scheduler.clone()));
    let ready = Arc::new(std::sync::Mutex::new(false));

    let (l2, c2, r2) = (lock.clone(), cv.clone(), ready.clone());
    let signaler = ThreadBuilder::new("signaler").spawn(&scheduler, 16, move || {
        l2.acquire();
        *r2.lock().unwrap() = true;
        c2.signal(&l2);
        l2.release();
    });

    lock.acquire();
    while !*ready.lock().unwrap() {
        cv.wait(&lock);
    }
    lock.release();
    signaler.join();
    assert!(*ready.lock().unwrap());
}

#[test]
fn synch_list_append_wakes_a_blocked_remove() {
    let scheduler = scheduler();
    ThreadBuilder::new("test-main").register_current(&scheduler);

    let list = Arc::new(SynchList::new(scheduler.clone()));
    let l2 = list.clone();
    let appender = ThreadBuilder::new("appender").spawn(&scheduler, 16, move || {
        l2.append(42);
    });

    assert_eq!(list.remove(), 42);
    appender.join();
    assert!(list.is_empty());
}

#[test]
fn rwlock_allows_concurrent_readers_and_exclusive_writer() {
    let scheduler = scheduler();
    ThreadBuilder::new("test-main").register_current(&scheduler);

    let rw = RwLock::new(scheduler, 0i32);
    {
        let r1 = rw.read();
        let r2 = rw.read();
        assert_eq!(*r1, 0);
        assert_eq!(*r2, 0);
    }
    {
        let mut w = rw.write();
        *w += 1;
    }
    assert_eq!(*rw.read(), 1);
    assert!(rw.try_write().is_some());
}

#[test]
fn message_bus_delivers_only_to_live_registered_recipients() {
    let scheduler = scheduler();
    let me = ThreadBuilder::new("test-main").register_current(&scheduler);

    let bus = MessageBus::new();
    // `u64::MAX` can never collide with a real tid: `NEXT_TID` is a
    // monotonic counter shared by every test in this binary, starting at 1.
    assert!(!bus.send(u64::MAX, 99, b"nobody home"));
    // Alive but no mailbox registered yet.
    assert!(!bus.send(me.tid, 99, b"too early"));

    bus.register(me.tid);
    assert!(bus.send(me.tid, 99, b"hi"));
    let msg = bus.receive(me.tid, None).unwrap();
    assert_eq!(msg.sender, 99);
    assert_eq!(msg.payload, b"hi");
    assert!(bus.receive(me.tid, None).is_none());

    bus.unregister(me.tid);
    assert!(!bus.send(me.tid, 99, b"too late"));
}
