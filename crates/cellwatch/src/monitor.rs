//! Advisory read-timeout monitor
//!
//! A background thread polls the shared scan marker and clears it when a
//! read has been in flight longer than the configured ceiling. The read is
//! *not* interrupted: the blocking call keeps running, and the scan loop
//! classifies the file as timed out when it finds its marker gone. A file
//! that never returns still stalls the loop; the monitor only makes the
//! overrun visible.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::context::ScanContext;

pub struct TimeoutMonitor {
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimeoutMonitor {
    /// Spawn a monitor that checks the marker every `poll` against `limit`
    pub fn spawn(context: Arc<ScanContext>, limit: Duration, poll: Duration) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let thread_done = done.clone();
        let handle = std::thread::spawn(move || {
            while !thread_done.load(Ordering::SeqCst) {
                std::thread::sleep(poll);
                check_once(&context, limit);
            }
        });
        TimeoutMonitor {
            done,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimeoutMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One monitor pass: clear and report the marker if its read overran `limit`
pub(crate) fn check_once(context: &ScanContext, limit: Duration) -> Option<PathBuf> {
    let in_flight = context.current()?;
    if in_flight.started.elapsed() <= limit {
        return None;
    }
    log::warn!(
        "read of {} exceeded {}s ceiling, marking as timed out",
        in_flight.path.display(),
        limit.as_secs()
    );
    context.clear_current();
    Some(in_flight.path)
}
