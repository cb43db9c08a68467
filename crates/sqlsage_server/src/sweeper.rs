use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use sqlsage_core::{PoolManager, SessionRegistry};

/// Default interval between sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Background thread reclaiming idle pools and expired sessions.
pub struct Sweeper {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn start(pools: Arc<PoolManager>, sessions: Arc<SessionRegistry>) -> Self {
        Self::start_with_interval(pools, sessions, SWEEP_INTERVAL)
    }

    pub fn start_with_interval(
        pools: Arc<PoolManager>,
        sessions: Arc<SessionRegistry>,
        interval: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::Builder::new()
            .name("sqlsage-sweeper".to_string())
            .spawn(move || {
                log::info!("Sweeper started (interval {}s)", interval.as_secs());

                // Short sleep slices keep shutdown prompt without
                // waking often enough to matter.
                let slice = Duration::from_millis(interval.as_millis().min(250) as u64);
                let mut elapsed = Duration::ZERO;

                while !stop_flag.load(Ordering::Relaxed) {
                    std::thread::sleep(slice);
                    elapsed += slice;
                    if elapsed < interval {
                        continue;
                    }
                    elapsed = Duration::ZERO;

                    let reclaimed_pools = pools.sweep_idle();
                    let expired_sessions = sessions.sweep_expired();

                    if reclaimed_pools > 0 || expired_sessions > 0 {
                        log::info!(
                            "Sweep reclaimed {} pools, {} sessions",
                            reclaimed_pools,
                            expired_sessions
                        );
                    }
                }

                log::info!("Sweeper stopped");
            })
            .expect("failed to spawn sweeper thread");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
