//! Process-tree scenarios: exec, wait, and the termination cascade.

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use teos_kernel::{
    kernel::Kernel,
    logger, proc,
    proc::{Pid, WaitChildError},
};

fn spin_until(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        teos_sched::context::yield_now();
    }
}

static HANDOFF_C_GO: AtomicBool = AtomicBool::new(false);
static HANDOFF_Z_DOWN: AtomicBool = AtomicBool::new(false);

fn handoff_c(_args: &[u8]) -> i32 {
    spin_until(&HANDOFF_C_GO);
    6
}

fn handoff_z(_args: &[u8]) -> i32 {
    HANDOFF_Z_DOWN.store(true, Ordering::SeqCst);
    proc::exit(3)
}

fn handoff_middle(_args: &[u8]) -> i32 {
    proc::exec(handoff_c, &[]).unwrap();
    proc::exec(handoff_z, &[]).unwrap();
    // Go down with one running child and, usually, one unreaped zombie;
    // both end up with the root either way.
    spin_until(&HANDOFF_Z_DOWN);
    proc::exit(4)
}

#[test]
fn test_cascade_hands_children_and_zombies_to_the_root() {
    fn init(_args: &[u8]) -> i32 {
        let middle = proc::exec(handoff_middle, &[]).unwrap();
        let (reaped, status) = proc::wait_child(Some(middle)).unwrap();
        assert_eq!((reaped, status), (middle, 4));

        // Both grandchildren are ours now.
        let (_, first) = proc::wait_child(None).unwrap();
        HANDOFF_C_GO.store(true, Ordering::SeqCst);
        let (_, second) = proc::wait_child(None).unwrap();
        let mut statuses = [first, second];
        statuses.sort_unstable();
        assert_eq!(statuses, [3, 6]);

        assert!(matches!(
            proc::wait_child(None),
            Err(WaitChildError::NoChildren)
        ));
        0
    }

    logger::init(LevelFilter::Warn);
    assert_eq!(Kernel::boot(init, &[]).run(), 0);
}

fn chain_leaf(_args: &[u8]) -> i32 {
    5
}

fn chain_middle(_args: &[u8]) -> i32 {
    assert_ne!(proc::get_pid(), Pid::ROOT);
    let leaf = proc::exec(chain_leaf, &[]).unwrap();
    let (_, status) = proc::wait_child(Some(leaf)).unwrap();
    status + 10
}

#[test]
fn test_exit_statuses_flow_up_an_exec_chain() {
    fn init(_args: &[u8]) -> i32 {
        assert_eq!(proc::get_pid(), Pid::ROOT);
        let middle = proc::exec(chain_middle, &[]).unwrap();
        let (_, status) = proc::wait_child(Some(middle)).unwrap();
        assert_eq!(status, 15);

        // The zombie was acknowledged; a second wait no longer knows it.
        assert!(matches!(
            proc::wait_child(Some(middle)),
            Err(WaitChildError::NotAChild(_))
        ));
        0
    }

    assert_eq!(Kernel::boot(init, &[]).run(), 0);
}

fn slow_two(_args: &[u8]) -> i32 {
    teos_sched::context::sleep(20_000_000);
    2
}

#[test]
fn test_wait_any_blocks_until_a_child_goes_down() {
    fn init(_args: &[u8]) -> i32 {
        proc::exec(slow_two, &[]).unwrap();
        let (_, status) = proc::wait_child(None).unwrap();
        assert_eq!(status, 2);
        0
    }

    assert_eq!(Kernel::boot(init, &[]).run(), 0);
}

fn echo_args(args: &[u8]) -> i32 {
    i32::from(args[0]) + i32::from(args[1])
}

#[test]
fn test_exec_passes_the_argument_buffer() {
    fn init(_args: &[u8]) -> i32 {
        let child = proc::exec(echo_args, &[8, 13]).unwrap();
        let (_, status) = proc::wait_child(Some(child)).unwrap();
        assert_eq!(status, 21);
        0
    }

    assert_eq!(Kernel::boot(init, &[]).run(), 0);
}
