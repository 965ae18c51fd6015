//! Periodic background refresh of the real-time snapshot.
//!
//! Fetching is delegated to a caller-supplied [`FeedSource`]; the task only
//! schedules cycles and hands the raw bytes to the engine. A failed or
//! malformed fetch never touches the existing snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::TransitEngine;
use crate::models::Result;

/// Supplier of raw GTFS-RT protobuf bytes.
///
/// Implementations own the transport (HTTP client, file reader, test
/// fixture); the engine never performs I/O itself.
pub trait FeedSource: Send + Sync {
    fn fetch_trip_updates(&self) -> Result<Vec<u8>>;
    fn fetch_vehicle_positions(&self) -> Result<Vec<u8>>;
}

#[derive(Clone, Copy, Debug)]
pub struct RefreshConfig {
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Handle to the background refresh thread. Dropping it stops the thread.
pub struct RefreshTask {
    stop_flag: Arc<AtomicBool>,
    wakeup: Arc<(Mutex<()>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
    /// Spawn the refresh loop. The first cycle runs immediately, then once
    /// per configured interval until [`stop`](Self::stop) or drop.
    pub fn spawn(
        engine: Arc<TransitEngine>,
        source: Arc<dyn FeedSource>,
        config: RefreshConfig,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let wakeup = Arc::new((Mutex::new(()), Condvar::new()));

        let thread_stop = stop_flag.clone();
        let thread_wakeup = wakeup.clone();
        let handle = std::thread::Builder::new()
            .name("realtime-refresh".into())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    engine.refresh_cycle(source.as_ref());
                    debug!("refresh cycle complete");

                    let (lock, cvar) = &*thread_wakeup;
                    let guard = match lock.lock() {
                        Ok(g) => g,
                        Err(_) => break,
                    };
                    // Woken early only on stop
                    let _ = cvar.wait_timeout(guard, config.interval);
                }
            });

        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                warn!(error = %e, "could not spawn refresh thread");
                None
            }
        };

        Self {
            stop_flag,
            wakeup,
            handle,
        }
    }

    /// Stop the loop and wait for the thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let (_, cvar) = &*self.wakeup;
        cvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}
