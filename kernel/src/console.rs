//! The synchronous console, wrapping the asynchronous [`machine::Console`]
//! the same way [`crate::fs::cache::SectorCache`] wraps [`machine::Disk`]:
//! a lock serializes access to the one physical device, and a semaphore
//! lets the calling thread block until the scheduled completion fires.
//! Grounded on the original's `SynchConsole`.
use crate::sync::{Lock, Semaphore};
use crate::thread::scheduler::Scheduler;
use machine::{Console, EventQueue};
use std::sync::{Arc, Mutex};

pub struct SynchConsole {
    console: Arc<Console>,
    event_queue: Arc<Mutex<EventQueue>>,
    read_lock: Lock,
    write_lock: Lock,
    scheduler: Arc<Scheduler>,
}

impl SynchConsole {
    pub fn new(console: Arc<Console>, event_queue: Arc<Mutex<EventQueue>>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            console,
            event_queue,
            read_lock: Lock::new(scheduler.clone()),
            write_lock: Lock::new(scheduler.clone()),
            scheduler,
        }
    }

    /// Block until the next input byte arrives (or the input queue was
    /// already empty when requested).
    pub fn read_byte(&self) -> Option<u8> {
        self.read_lock.acquire();
        let sem = Arc::new(Semaphore::new(self.scheduler.clone(), 0));
        let result = Arc::new(Mutex::new(None));
        {
            let mut q = self.event_queue.lock().unwrap();
            let sem2 = sem.clone();
            let result2 = result.clone();
            self.console.read_request(&mut q, move |byte| {
                *result2.lock().unwrap() = Some(byte);
                sem2.up();
            });
        }
        sem.down();
        self.read_lock.release();
        result.lock().unwrap().take().flatten()
    }

    /// Block until `byte` has been written out.
    pub fn write_byte(&self, byte: u8) {
        self.write_lock.acquire();
        let sem = Arc::new(Semaphore::new(self.scheduler.clone(), 0));
        {
            let mut q = self.event_queue.lock().unwrap();
            let sem2 = sem.clone();
            self.console.write_request(&mut q, byte, move || sem2.up());
        }
        sem.down();
        self.write_lock.release();
    }
}
