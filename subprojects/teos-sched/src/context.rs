//! Execution contexts over host OS threads.
//!
//! A context is created in the *suspended* state: the host thread exists but
//! blocks on a start gate before any of the context's code runs. This mirrors
//! the create/start split of real thread syscalls and lets the kernel publish
//! a thread's bookkeeping under its lock before the thread can observe
//! anything.

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    thread,
    time::Duration,
};

use log::trace;
use teos_sync::oneshot;

use crate::exit::ExitSignal;

/// Handle to a spawned execution context.
///
/// Dropping the handle of a context that was never started releases its host
/// thread without running the context body.
pub struct Context {
    gate: Option<oneshot::Sender<()>>,
    host: thread::JoinHandle<()>,
}

/// Spawns a context in the suspended state.
///
/// `body` does not run until [`Context::start`] fires the start gate. The
/// body ends either by returning or through [`exit`](crate::exit::exit);
/// any other panic escaping it is surfaced by [`Context::reap`].
pub fn spawn<F>(name: String, body: F) -> Result<Context, SpawnError>
where
    F: FnOnce() + Send + 'static,
{
    trace!("context {name} created");
    let (gate, armed) = oneshot::channel();
    let host = thread::Builder::new().name(name).spawn(move || {
        // Suspended until start(); a dropped gate means the context was
        // abandoned before ever becoming runnable.
        if armed.recv().is_err() {
            return;
        }
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(()) => {}
            Err(payload) if payload.is::<ExitSignal>() => {}
            Err(payload) => panic::resume_unwind(payload),
        }
    })?;
    Ok(Context {
        gate: Some(gate),
        host,
    })
}

impl Context {
    /// Transitions the context from suspended to runnable.
    ///
    /// Starting an already started context is a no-op.
    pub fn start(&mut self) {
        if let Some(gate) = self.gate.take() {
            trace!("context {:?} runnable", self.host.thread().name());
            let _ = gate.send(());
        }
    }

    /// Returns `true` once the context's host thread has finished.
    pub fn is_finished(&self) -> bool {
        self.host.is_finished()
    }

    /// Blocks until the context has finished and releases its host thread.
    ///
    /// An `Err` carries the payload of a panic that escaped the context
    /// body, ready to be rethrown with [`std::panic::resume_unwind`].
    pub fn reap(self) -> thread::Result<()> {
        let Context { gate, host } = self;
        drop(gate);
        host.join()
    }
}

/// How a context body came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The body returned a value.
    Returned(i32),
    /// The body went through the terminal sleep; whatever bookkeeping it
    /// owed was done before the unwind.
    Exited,
}

/// Runs a context body to completion, separating a normal return from a
/// terminal [`exit`](crate::exit::exit).
///
/// Panics other than the terminal unwind keep propagating to the caller.
pub fn run<F>(body: F) -> Completion
where
    F: FnOnce() -> i32,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => Completion::Returned(value),
        Err(payload) if payload.is::<ExitSignal>() => Completion::Exited,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Yields the host CPU so another runnable context may proceed.
pub fn yield_now() {
    thread::yield_now();
}

/// Suspends the calling context for at least `nanos` nanoseconds.
pub fn sleep(nanos: u64) {
    thread::sleep(Duration::from_nanos(nanos));
}

/// Error type for [`spawn`].
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The host refused to start a new thread.
    #[error("host thread spawn failed: {0}")]
    Host(#[from] io::Error),
}
