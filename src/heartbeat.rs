/// Keep-alive ping thread
///
/// Pings the board at a fixed interval until the shutdown flag is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::board::SharedBoard;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(3);
const WAKE_SLICE: Duration = Duration::from_millis(50);

pub struct Heartbeat {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start(board: SharedBoard, interval: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            while flag.load(Ordering::Relaxed) {
                log::debug!(target: "heartbeat", "Ping to board...");
                match board.lock() {
                    Ok(mut b) => {
                        if let Err(e) = b.send_ping() {
                            log::warn!(target: "heartbeat", "Ping failed: {}", e);
                        }
                    }
                    Err(_) => {
                        log::error!(target: "heartbeat", "Board lock poisoned, stopping heartbeat");
                        break;
                    }
                }
                let started = Instant::now();
                while flag.load(Ordering::Relaxed) && started.elapsed() < interval {
                    thread::sleep(WAKE_SLICE.min(interval));
                }
            }
            log::info!(target: "heartbeat", "Heartbeat stopped");
        });
        Self { running, handle: Some(handle) }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
            && self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Set the shutdown flag and wait for the thread to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
