//! Kernel instance, boot and the context drain loop.
//!
//! All kernel state sits behind one big mutex owned by a [`Kernel`] handle.
//! There is no global instance: every boot builds its own kernel, so several
//! simulated machines can run side by side in one host process (the test
//! suites do exactly that).

use std::{panic, sync::Arc};

use log::debug;
use teos_sched::context::Context;
use teos_sync::mutex::{Mutex, MutexGuard};

use crate::{
    proc::{MAX_PROC, Pcb, Pid},
    streams::StreamTable,
    thread::{Ptcb, Task, Tid, spawn_task_context},
};

/// Handle to one simulated machine.
///
/// Cloning is cheap and shares the machine; every execution context carries
/// a clone. The machine runs until [`run`](Kernel::run) has drained every
/// context.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    state: Mutex<KernelState>,
}

/// Everything behind the kernel-wide lock.
pub(crate) struct KernelState {
    /// Process table arena; a pid is a slot index and slot 0 stays empty.
    pub(crate) procs: Vec<Option<Pcb>>,
    pub(crate) streams: StreamTable,
    /// Handles of every spawned execution context, drained by `run`.
    pub(crate) contexts: Vec<Context>,
    next_tid: u64,
}

impl KernelState {
    fn new() -> KernelState {
        KernelState {
            procs: vec![None],
            streams: StreamTable::new(),
            contexts: Vec::new(),
            next_tid: 1,
        }
    }

    /// Draws a fresh thread id; ids are never reused within an instance.
    pub(crate) fn alloc_tid(&mut self) -> Tid {
        let tid = Tid::new(self.next_tid);
        self.next_tid += 1;
        tid
    }

    /// First free process-table slot; pids become reusable once a zombie is
    /// reaped.
    pub(crate) fn alloc_pid(&mut self) -> Option<Pid> {
        for i in 1..self.procs.len() {
            if self.procs[i].is_none() {
                return Some(Pid::new(i));
            }
        }
        if self.procs.len() < MAX_PROC {
            self.procs.push(None);
            return Some(Pid::new(self.procs.len() - 1));
        }
        None
    }

    pub(crate) fn proc(&self, pid: Pid) -> &Pcb {
        match self.procs.get(pid.index()).and_then(Option::as_ref) {
            Some(pcb) => pcb,
            None => panic!("no process at p{pid}"),
        }
    }

    pub(crate) fn proc_mut(&mut self, pid: Pid) -> &mut Pcb {
        match self.procs.get_mut(pid.index()).and_then(Option::as_mut) {
            Some(pcb) => pcb,
            None => panic!("no process at p{pid}"),
        }
    }
}

impl Kernel {
    /// Boots a machine: installs the root process (pid 1) with `init` as its
    /// main task and makes it runnable.
    ///
    /// The boot returns as soon as the root context exists; call
    /// [`run`](Kernel::run) to let the machine execute to quiescence.
    pub fn boot(init: Task, args: &[u8]) -> Kernel {
        let kernel = Kernel {
            inner: Arc::new(KernelInner {
                state: Mutex::new(KernelState::new()),
            }),
        };

        let mut st = kernel.lock_state();
        let Some(root) = st.alloc_pid() else {
            panic!("fresh process table refused a pid");
        };
        debug_assert_eq!(root, Pid::ROOT);
        let tid = st.alloc_tid();

        let mut pcb = Pcb::new(None);
        pcb.args = Some(args.into());
        pcb.main_thread = Some(tid);
        pcb.thread_count = 1;
        pcb.insert_wrapper(Ptcb::new(tid, init, None));
        // The console pair; children inherit it through exec.
        pcb.fid_table[0] = Some(st.streams.alloc());
        pcb.fid_table[1] = Some(st.streams.alloc());
        st.procs[root.index()] = Some(pcb);

        debug!("boot: root process p{root} online (main t{tid})");
        spawn_task_context(&mut st, &kernel, root, tid);
        drop(st);
        kernel
    }

    /// Runs the machine to quiescence and returns the root process's exit
    /// status.
    ///
    /// Finished contexts are joined one by one; contexts spawned while
    /// draining are picked up too, so this returns only when no execution
    /// context remains. A context that died of a real panic (a broken kernel
    /// invariant, or a panicking task body) has its payload rethrown here.
    pub fn run(&self) -> i32 {
        loop {
            let ctx = self.lock_state().contexts.pop();
            match ctx {
                Some(ctx) => {
                    if let Err(payload) = ctx.reap() {
                        panic::resume_unwind(payload);
                    }
                }
                None => break,
            }
        }
        let status = {
            let st = self.lock_state();
            st.proc(Pid::ROOT).exit_status.unwrap_or(0)
        };
        debug!("halt: init status {status}");
        status
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, KernelState> {
        self.inner.state.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{proc, thread};

    fn init_returns_status(_args: &[u8]) -> i32 {
        41
    }

    #[test]
    fn test_run_returns_init_return_value() {
        let kernel = Kernel::boot(init_returns_status, &[]);
        assert_eq!(kernel.run(), 41);
    }

    fn init_exits_explicitly(_args: &[u8]) -> i32 {
        proc::exit(7)
    }

    #[test]
    fn test_run_returns_explicit_exit_status() {
        let kernel = Kernel::boot(init_exits_explicitly, &[]);
        assert_eq!(kernel.run(), 7);
    }

    fn init_thread_exits(_args: &[u8]) -> i32 {
        // Ends the main thread without recording a process status.
        thread::exit(9)
    }

    #[test]
    fn test_plain_thread_exit_reports_status_zero() {
        let kernel = Kernel::boot(init_thread_exits, &[]);
        assert_eq!(kernel.run(), 0);
    }

    fn init_sees_args(args: &[u8]) -> i32 {
        assert_eq!(args, b"boot payload");
        0
    }

    #[test]
    fn test_boot_args_reach_the_init_task() {
        let kernel = Kernel::boot(init_sees_args, b"boot payload");
        assert_eq!(kernel.run(), 0);
    }

    fn chain_tail(_args: &[u8]) -> i32 {
        3
    }

    fn chain_head(_args: &[u8]) -> i32 {
        // The second thread outlives the main one; its exit runs the
        // process teardown.
        thread::create(chain_tail, &[]);
        thread::exit(0)
    }

    #[test]
    fn test_drain_picks_up_late_contexts() {
        let kernel = Kernel::boot(chain_head, &[]);
        assert_eq!(kernel.run(), 0);
        let st = kernel.lock_state();
        assert_eq!(st.proc(Pid::ROOT).live_wrappers(), 0);
    }
}
