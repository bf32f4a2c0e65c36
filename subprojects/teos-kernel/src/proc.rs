//! Processes: table entities, exec, the wait/zombie protocol.
//!
//! A process is a slot in the kernel's arena table; its pid is the slot
//! index. Parent/child relations are stored as indices in both directions:
//! a child keeps `parent`, the parent keeps the child's pid in `children`
//! and, once the child has terminated, in `exited` as well. A zombie sits in
//! both collections until the parent acknowledges it through
//! [`wait_child`], which frees the slot and makes the pid reusable.

use std::{fmt, sync::Arc};

use log::trace;
use static_assertions::const_assert;
use teos_sync::condvar::Condvar;

use crate::{
    current,
    kernel::KernelState,
    streams::{Fid, MAX_FILEID},
    thread::{self, Ptcb, Task, Tid, spawn_task_context},
};

/// Upper bound on simultaneously live processes.
pub const MAX_PROC: usize = 65_536;

const_assert!(MAX_PROC > 1);

/// Identifier of a process: its slot in the kernel process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(usize);

impl Pid {
    /// The root process. It is the first process booted, it adopts every
    /// orphan, and it never has a parent of its own.
    pub const ROOT: Pid = Pid(1);

    pub(crate) fn new(index: usize) -> Pid {
        Pid(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcState {
    Running,
    Zombie,
}

/// Process control record.
pub(crate) struct Pcb {
    /// `None` only for the root process (and permanently so).
    pub(crate) parent: Option<Pid>,
    pub(crate) state: ProcState,
    /// Threads of this process that have not yet exited.
    pub(crate) thread_count: usize,
    /// Wrapper records, one per thread; slot order carries no meaning.
    pub(crate) threads: Vec<Option<Ptcb>>,
    /// Cleared when the last thread exits.
    pub(crate) main_thread: Option<Tid>,
    /// Every child, live or zombie.
    pub(crate) children: Vec<Pid>,
    /// Terminated children awaiting acknowledgment; each also appears in
    /// `children` until reaped.
    pub(crate) exited: Vec<Pid>,
    /// Signaled whenever a child lands on `exited`.
    pub(crate) child_exit: Arc<Condvar>,
    pub(crate) fid_table: [Option<Fid>; MAX_FILEID],
    /// Argument buffer captured at exec; the main thread runs on a copy,
    /// the termination cascade releases the original.
    pub(crate) args: Option<Box<[u8]>>,
    /// Recorded by [`exit`]; what [`wait_child`] reports to the parent.
    pub(crate) exit_status: Option<i32>,
}

impl Pcb {
    pub(crate) fn new(parent: Option<Pid>) -> Pcb {
        Pcb {
            parent,
            state: ProcState::Running,
            thread_count: 0,
            threads: Vec::new(),
            main_thread: None,
            children: Vec::new(),
            exited: Vec::new(),
            child_exit: Arc::new(Condvar::new()),
            fid_table: [None; MAX_FILEID],
            args: None,
            exit_status: None,
        }
    }

    /// Stores a wrapper in the first free slot.
    pub(crate) fn insert_wrapper(&mut self, wrapper: Ptcb) -> usize {
        match self.threads.iter().position(Option::is_none) {
            Some(slot) => {
                self.threads[slot] = Some(wrapper);
                slot
            }
            None => {
                self.threads.push(Some(wrapper));
                self.threads.len() - 1
            }
        }
    }

    pub(crate) fn wrapper(&self, tid: Tid) -> Option<&Ptcb> {
        self.threads.iter().flatten().find(|w| w.tid == tid)
    }

    pub(crate) fn wrapper_mut(&mut self, tid: Tid) -> Option<&mut Ptcb> {
        self.threads.iter_mut().flatten().find(|w| w.tid == tid)
    }

    pub(crate) fn remove_wrapper(&mut self, tid: Tid) -> Option<Ptcb> {
        let slot = self
            .threads
            .iter()
            .position(|s| s.as_ref().is_some_and(|w| w.tid == tid))?;
        self.threads[slot].take()
    }

    /// Wrapper records still in the table, exited or not.
    pub(crate) fn live_wrappers(&self) -> usize {
        self.threads.iter().flatten().count()
    }
}

/// Error type for [`exec`].
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Every process-table slot is taken.
    #[error("process table full ({MAX_PROC} entries)")]
    TableFull,
}

/// Error type for [`wait_child`].
#[derive(Debug, thiserror::Error)]
pub enum WaitChildError {
    /// The pid does not name a child of the calling process. Also reported
    /// when another thread of the parent reaped the child first.
    #[error("p{0} is not a child of the calling process")]
    NotAChild(Pid),
    /// The calling process has no children at all.
    #[error("no children to wait for")]
    NoChildren,
}

/// Starts a new process running `task` and returns its pid.
///
/// The child starts with one thread, the caller as parent, a copy of `args`
/// as its argument buffer, and the parent's console streams (fids 0 and 1)
/// shared by reference.
pub fn exec(task: Task, args: &[u8]) -> Result<Pid, ExecError> {
    let (kernel, pid, _) = current::context();
    let mut st = kernel.lock_state();

    let Some(child) = st.alloc_pid() else {
        return Err(ExecError::TableFull);
    };
    let tid = st.alloc_tid();

    let mut pcb = Pcb::new(Some(pid));
    pcb.args = Some(args.into());
    pcb.main_thread = Some(tid);
    pcb.thread_count = 1;
    pcb.insert_wrapper(Ptcb::new(tid, task, None));
    for i in 0..2 {
        let inherited = st.proc(pid).fid_table[i];
        if let Some(fid) = inherited {
            st.streams.incref(fid);
        }
        pcb.fid_table[i] = inherited;
    }

    st.procs[child.index()] = Some(pcb);
    st.proc_mut(pid).children.push(child);
    trace!("[p{pid}] exec -> p{child} (main t{tid})");

    spawn_task_context(&mut st, &kernel, child, tid);
    Ok(child)
}

/// Returns the calling process's pid. Pure, never fails.
pub fn get_pid() -> Pid {
    let (_, pid, _) = current::context();
    pid
}

/// Number of threads of the calling process that have not yet exited.
pub fn thread_count() -> usize {
    let (kernel, pid, _) = current::context();
    kernel.lock_state().proc(pid).thread_count
}

/// Terminates the calling process with `status`.
///
/// Only the status is recorded here; sibling threads keep running and the
/// process goes down for real when its last thread exits. The calling
/// thread itself exits with the same value and never returns.
pub fn exit(status: i32) -> ! {
    let (kernel, pid, _) = current::context();
    {
        let mut st = kernel.lock_state();
        trace!("[p{pid}] exit({status})");
        st.proc_mut(pid).exit_status = Some(status);
    }
    thread::exit(status)
}

/// Waits for a child to terminate and acknowledges it.
///
/// With `Some(pid)` this blocks until that particular child is a zombie;
/// with `None` it blocks until any child is, and reaps the earliest one.
/// Reaping removes the child from both child collections, frees its table
/// slot (the pid becomes reusable) and returns its pid and recorded exit
/// status. A child that went down without an explicit [`exit`] reports
/// status 0.
pub fn wait_child(which: Option<Pid>) -> Result<(Pid, i32), WaitChildError> {
    let (kernel, pid, _) = current::context();
    let mut st = kernel.lock_state();

    let child = match which {
        Some(child) => {
            loop {
                let cv = {
                    let pcb = st.proc(pid);
                    if !pcb.children.contains(&child) {
                        return Err(WaitChildError::NotAChild(child));
                    }
                    if pcb.exited.contains(&child) {
                        break;
                    }
                    pcb.child_exit.clone()
                };
                st = cv.wait(st);
            }
            child
        }
        None => loop {
            let cv = {
                let pcb = st.proc(pid);
                if let Some(&zombie) = pcb.exited.first() {
                    break zombie;
                }
                if pcb.children.is_empty() {
                    return Err(WaitChildError::NoChildren);
                }
                pcb.child_exit.clone()
            };
            st = cv.wait(st);
        },
    };

    let status = reap(&mut st, pid, child);
    trace!("[p{pid}] reaped p{child}, status {status}");
    Ok((child, status))
}

/// Acknowledges a zombie: unlinks it from the parent and frees its slot.
fn reap(st: &mut KernelState, parent: Pid, child: Pid) -> i32 {
    let pcb = st.proc_mut(parent);
    if let Some(i) = pcb.exited.iter().position(|&p| p == child) {
        pcb.exited.remove(i);
    }
    if let Some(i) = pcb.children.iter().position(|&p| p == child) {
        pcb.children.remove(i);
    }

    let Some(dead) = st.procs[child.index()].take() else {
        panic!("reaping an empty slot p{child}");
    };
    debug_assert_eq!(dead.state, ProcState::Zombie);
    debug_assert_eq!(dead.live_wrappers(), 0);
    dead.exit_status.unwrap_or(0)
}
