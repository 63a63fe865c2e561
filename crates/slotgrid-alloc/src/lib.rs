//! SlotGrid fair-share allocator — pure water-filling.
//!
//! This crate holds no scheduler state: it is a function from
//! (share requests, capacity) to a fair-share vector, so the
//! allocation algorithm can be tested in isolation. Both the
//! pool-level and the job-level allocation passes of the scheduler
//! call the same function.

pub mod waterfill;

pub use waterfill::{ShareRequest, compute_fair_shares};
