//! The simulated console: a byte-at-a-time input/output device.
//!
//! Modeled on Nachos's `SynchConsole`: reads and writes complete
//! asynchronously, signaled through the same [`EventQueue`] mechanism as
//! the disk, so kernel-side code must wait for a read-available or
//! write-done callback rather than assuming the operation finished inline.
use crate::interrupt::EventQueue;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Simulated per-character latency, in ticks.
pub const CHAR_LATENCY_TICKS: u64 = 10;

/// A console backed by in-memory queues, suitable for both interactive use
/// (fed from stdin/stdout by the host binary) and for tests that script a
/// fixed input sequence.
pub struct Console {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
}

impl Console {
    /// Create a console with no buffered input.
    pub fn new() -> Self {
        Self {
            input: Mutex::new(VecDeque::new()),
            output: Mutex::new(Vec::new()),
        }
    }

    /// Feed bytes into the console's input queue, as if typed by a user.
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Everything written to the console so far.
    pub fn output_so_far(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }

    /// Request the next input byte. `on_done` runs once `queue` reaches the
    /// completion deadline, receiving `Some(byte)` or `None` if the input
    /// queue was empty at request time.
    pub fn read_request(&self, queue: &mut EventQueue, on_done: impl FnOnce(Option<u8>) + Send + 'static) {
        let byte = self.input.lock().unwrap().pop_front();
        queue.schedule(CHAR_LATENCY_TICKS, move || on_done(byte));
    }

    /// Request that `byte` be written to the console. `on_done` runs once
    /// the write completes.
    pub fn write_request(&self, queue: &mut EventQueue, byte: u8, on_done: impl FnOnce() + Send + 'static) {
        self.output.lock().unwrap().push(byte);
        queue.schedule(CHAR_LATENCY_TICKS, on_done);
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}
