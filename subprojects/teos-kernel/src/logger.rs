//! Stderr logger for the simulation.
//!
//! Routes the `log` facade to stderr, tagging each line with the execution
//! context it came from. Host thread names double as context names, so a
//! line reads like `[TRACE] p1.t2: joins t3`.

use log::{LevelFilter, Metadata, Record};

static LOGGER: KernelLogger = KernelLogger;

struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let host = std::thread::current();
            eprintln!(
                "[{:<5}] {}: {}",
                record.level(),
                host.name().unwrap_or("host"),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Installs the logger and sets the level cap.
///
/// Later calls only adjust the level; the facade accepts one logger per
/// process and several kernels (or several tests) may share it.
pub fn init(max_level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(max_level);
}
