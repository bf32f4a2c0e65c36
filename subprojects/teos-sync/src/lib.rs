//! # teos-sync
//!
//! Monitor primitives for the teos kernel simulation.
//!
//! The kernel serializes every operation under one big lock, and all blocking
//! protocols are monitor-style: a condition variable wait atomically releases
//! the lock and reacquires it before returning, a broadcast wakes every
//! waiter without releasing anything. The types here wrap [`parking_lot`]
//! behind that exact surface, with no lock poisoning: a panicking execution
//! context unwinds through its guards and the remaining contexts keep going.

pub mod condvar;
pub mod mutex;
pub mod oneshot;
mod result;
