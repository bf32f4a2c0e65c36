//! # teos-sched
//!
//! Execution contexts for the kernel simulation.
//!
//! Each simulated kernel thread runs on a host OS thread, called a *context*
//! here. Contexts follow the classic two-step lifecycle: [`context::spawn`]
//! creates one in the suspended state, [`context::Context::start`] makes it
//! runnable, and [`exit::exit`] is the terminal sleep a context never comes
//! back from. The kernel above decides who may run when; this crate only
//! provides the mechanics.

pub mod context;
pub mod exit;
