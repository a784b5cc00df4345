//! Thread-to-thread message passing: fixed-capacity datagrams delivered
//! into a per-recipient mailbox, looked up by TID through a small global
//! registry (nothing in the original Nachos corresponds to this directly;
//! it generalizes the per-thread `pending-message list` the same way
//! `SynchList` generalizes a plain FIFO queue).
use crate::thread;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Maximum payload size of a single message.
pub const MESSAGE_MAX_LEN: usize = 256;

/// A message: a sender TID plus a length-prefixed byte payload.
#[derive(Clone)]
pub struct Message {
    pub sender: u64,
    pub payload: Vec<u8>,
}

/// The kernel-wide mailbox registry. One `MessageBus` is created per
/// booted kernel.
#[derive(Default)]
pub struct MessageBus {
    mailboxes: Mutex<HashMap<u64, VecDeque<Message>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty mailbox for `tid`. Called when a thread starts.
    pub fn register(&self, tid: u64) {
        self.mailboxes.lock().unwrap().entry(tid).or_default();
    }

    /// Drop `tid`'s mailbox and any undelivered messages in it. Called
    /// when a thread exits.
    pub fn unregister(&self, tid: u64) {
        self.mailboxes.lock().unwrap().remove(&tid);
    }

    /// Enqueue `payload` from `sender` onto `dest`'s mailbox. Returns
    /// `false` if `dest` does not name a live thread or the payload
    /// exceeds [`MESSAGE_MAX_LEN`].
    pub fn send(&self, dest: u64, sender: u64, payload: &[u8]) -> bool {
        if payload.len() > MESSAGE_MAX_LEN || !thread::is_alive(dest) {
            return false;
        }
        let mut mailboxes = self.mailboxes.lock().unwrap();
        match mailboxes.get_mut(&dest) {
            Some(q) => {
                q.push_back(Message {
                    sender,
                    payload: payload.to_vec(),
                });
                true
            }
            None => false,
        }
    }

    /// Pop the next message addressed to `recipient`, optionally filtered
    /// by `src`. Messages are FIFO per (sender, receiver) pair, which a
    /// single per-recipient FIFO queue already guarantees since messages
    /// from one sender are always appended in order.
    pub fn receive(&self, recipient: u64, src: Option<u64>) -> Option<Message> {
        let mut mailboxes = self.mailboxes.lock().unwrap();
        let queue = mailboxes.get_mut(&recipient)?;
        let index = match src {
            Some(want) => queue.iter().position(|m| m.sender == want)?,
            None => 0,
        };
        if queue.is_empty() {
            return None;
        }
        queue.remove(index)
    }
}
