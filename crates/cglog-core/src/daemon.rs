//! Background flush daemon.
//!
//! A named thread wakes every interval and flushes a target. It holds only a
//! weak reference to what it flushes, so it never keeps an engine alive, and
//! it can be stopped (and joined) at any time.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Something the daemon can flush.
pub trait Flush: Send + Sync + 'static {
    fn flush(&self);
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleep until `deadline` or until stopped; true if stopped.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }
}

/// Handle to a running flush thread. Dropping it stops the thread.
pub struct FlushDaemon {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    interval: Duration,
}

impl FlushDaemon {
    /// Start flushing `target` every `interval`.
    pub fn spawn<T: Flush>(interval: Duration, target: Weak<T>) -> std::io::Result<Self> {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);

        let handle = thread::Builder::new()
            .name("cglog-flush".into())
            .spawn(move || run(interval, target, thread_signal))?;
        let thread_id = handle.thread().id();

        tracing::debug!(interval_ms = interval.as_millis() as u64, "flush daemon started");
        Ok(Self {
            signal,
            handle: Some(handle),
            thread_id,
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take() {
            // The last strong reference to the target may be dropped on the
            // daemon thread itself; joining there would deadlock.
            if thread::current().id() != self.thread_id {
                let _ = handle.join();
            }
            tracing::debug!("flush daemon stopped");
        }
    }
}

impl Drop for FlushDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<T: Flush>(interval: Duration, target: Weak<T>, signal: Arc<StopSignal>) {
    let mut deadline = Instant::now() + interval;
    loop {
        if signal.wait_until(deadline) {
            return;
        }
        match target.upgrade() {
            Some(target) => target.flush(),
            None => return,
        }
        deadline += interval;
        let now = Instant::now();
        if deadline < now {
            deadline = now + interval;
        }
    }
}
