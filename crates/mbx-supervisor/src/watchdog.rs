//! Stall detector: forces the process to exit if the supervisor's tick
//! loop stops calling [`Watchdog::update`].
//!
//! Grounded verbatim on `original_source/watchdog.py`'s `Watchdog`
//! class: a dedicated background task (there, a daemon thread) wakes
//! every `timeout` and checks whether `update` has been called since
//! its last wake; if not, it logs and force-exits. `faulthandler.dump_traceback()`
//! has no portable Rust equivalent; a `tracing::error!` takes its
//! place as the last thing logged before exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mbx_core::timing::WATCHDOG_TIMEOUT;

/// Pure stall check, factored out so it's testable without sleeping a
/// real task or exiting the process.
fn is_stalled(last_update_ms: u64, now_ms: u64, timeout: Duration) -> bool {
    now_ms.saturating_sub(last_update_ms) > timeout.as_millis() as u64
}

pub struct Watchdog {
    start: Instant,
    last_update_ms: Arc<AtomicU64>,
    timeout: Duration,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            start: Instant::now(),
            last_update_ms: Arc::new(AtomicU64::new(0)),
            timeout,
        }
    }

    /// Records that the supervisor is alive. Matches `Watchdog.update`.
    pub fn update(&self) {
        let ms = self.start.elapsed().as_millis() as u64;
        self.last_update_ms.store(ms, Ordering::SeqCst);
    }

    /// Starts the background stall-detector task. Matches `Watchdog.start`
    /// (`self.update(); threading.Thread(target=self.run, daemon=True).start()`).
    pub fn start(&self) {
        self.update();
        let last_update_ms = self.last_update_ms.clone();
        let start = self.start;
        let timeout = self.timeout;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(timeout).await;
                let now_ms = start.elapsed().as_millis() as u64;
                let last = last_update_ms.load(Ordering::SeqCst);
                if is_stalled(last, now_ms, timeout) {
                    tracing::error!("watchdog timeout: supervisor tick loop stalled");
                    std::process::exit(1);
                }
            }
        });
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(WATCHDOG_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_stalled_immediately_after_update() {
        assert!(!is_stalled(1_000, 1_050, Duration::from_secs(30)));
    }

    #[test]
    fn stalled_once_timeout_elapses_with_no_update() {
        assert!(is_stalled(0, 30_001, Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn update_advances_the_recorded_timestamp() {
        let wd = Watchdog::new(Duration::from_secs(30));
        wd.update();
        let first = wd.last_update_ms.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        wd.update();
        let second = wd.last_update_ms.load(Ordering::SeqCst);
        assert!(second >= first);
    }
}
