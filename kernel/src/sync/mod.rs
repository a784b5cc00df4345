//! Synchronization primitives, all built from interrupt disabling and the
//! scheduler's block/wake pair, exactly as the original `synch.cc` builds
//! locks and condition variables on top of a semaphore.
pub mod barrier;
pub mod condvar;
pub mod lock;
pub mod message;
pub mod rwlock;
pub mod semaphore;
pub mod synclist;

pub use barrier::Barrier;
pub use condvar::ConditionVariable;
pub use lock::Lock;
pub use message::MessageBus;
pub use rwlock::RwLock;
pub use semaphore::Semaphore;
pub use synclist::SynchList;
