use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use officesim_core::types::SimulationStatus;

use crate::error::{Result, TickError};
use crate::manager::TickManager;

/// What the auto-tick loop needs from the engine. The engine implements
/// this; the loop never sees the engine type directly.
#[async_trait]
pub trait AdvanceDriver: Send + Sync {
    /// Current persisted simulation state, or `None` on a read failure
    /// (the loop terminates).
    fn status(&self) -> Option<SimulationStatus>;

    /// Auto-pause supervision, run once per iteration before advancing.
    /// Must never panic; failures are the implementor's to log.
    async fn supervise(&self);

    /// Advance the simulation by one tick. An error disables auto-tick.
    async fn advance_one(&self)
        -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Persist the auto-tick flag.
    fn set_auto_tick(&self, enabled: bool);
}

pub(crate) struct AutoTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TickManager {
    /// Spawn the auto-tick task. At most one task is alive at a time; a
    /// live task makes this a no-op apart from re-enabling the flag.
    pub fn start_auto_tick(self: &Arc<Self>, driver: Arc<dyn AdvanceDriver>) -> Result<()> {
        let running = driver.status().map(|s| s.is_running).unwrap_or(false);
        if !running {
            return Err(TickError::NotRunning);
        }
        driver.set_auto_tick(true);

        let mut slot = self.auto_task.lock().unwrap();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                return Ok(());
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            run_auto_tick_loop(manager, driver, shutdown_rx).await;
        });
        *slot = Some(AutoTask {
            shutdown: shutdown_tx,
            handle,
        });
        info!("auto-tick task started");
        Ok(())
    }

    /// Disable the flag, signal the task, and join it within a 2 s timeout.
    pub async fn stop_auto_tick(&self, driver: &dyn AdvanceDriver) -> Result<()> {
        driver.set_auto_tick(false);
        let task = self.auto_task.lock().unwrap().take();
        let Some(task) = task else {
            return Ok(());
        };
        let _ = task.shutdown.send(true);
        match tokio::time::timeout(Duration::from_secs(2), task.handle).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("automatic tick task did not exit cleanly within timeout");
                Err(TickError::StopTimeout)
            }
        }
    }

    pub fn auto_tick_alive(&self) -> bool {
        self.auto_task
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }
}

async fn run_auto_tick_loop(
    manager: Arc<TickManager>,
    driver: Arc<dyn AdvanceDriver>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("auto-tick loop running");
    loop {
        // Re-read every iteration so set_tick_interval applies immediately.
        let interval = manager.tick_interval();
        if interval > 0.0 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(interval)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
        } else {
            // Max speed: just yield so stop signals get a chance to land.
            tokio::task::yield_now().await;
            if *shutdown.borrow() {
                break;
            }
        }

        let Some(status) = driver.status() else {
            error!("auto-tick loop could not read simulation state; stopping");
            break;
        };
        if !status.is_running || !status.auto_tick {
            break;
        }

        driver.supervise().await;

        // advance_one serializes on the advance mutex internally.
        if let Err(e) = driver.advance_one().await {
            error!(error = %e, "automatic tick failed; disabling auto ticks");
            driver.set_auto_tick(false);
            break;
        }
    }
    info!("auto-tick loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Mutex;

    struct FakeDriver {
        ticks: AtomicI64,
        auto_tick: AtomicBool,
        running: AtomicBool,
        fail_at: Option<i64>,
        supervisions: AtomicI64,
        state: Mutex<()>,
    }

    impl FakeDriver {
        fn new(fail_at: Option<i64>) -> Self {
            Self {
                ticks: AtomicI64::new(0),
                auto_tick: AtomicBool::new(true),
                running: AtomicBool::new(true),
                fail_at,
                supervisions: AtomicI64::new(0),
                state: Mutex::new(()),
            }
        }
    }

    #[async_trait]
    impl AdvanceDriver for FakeDriver {
        fn status(&self) -> Option<SimulationStatus> {
            let _guard = self.state.lock().unwrap();
            Some(SimulationStatus {
                current_tick: self.ticks.load(Ordering::SeqCst),
                is_running: self.running.load(Ordering::SeqCst),
                auto_tick: self.auto_tick.load(Ordering::SeqCst),
            })
        }

        async fn supervise(&self) {
            self.supervisions.fetch_add(1, Ordering::SeqCst);
        }

        async fn advance_one(
            &self,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let next = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_at == Some(next) {
                return Err("boom".into());
            }
            Ok(())
        }

        fn set_auto_tick(&self, enabled: bool) {
            self.auto_tick.store(enabled, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn refuses_to_start_when_not_running() {
        let tm = Arc::new(TickManager::new(8, 0.0));
        let driver = Arc::new(FakeDriver::new(None));
        driver.running.store(false, Ordering::SeqCst);
        let err = tm.start_auto_tick(driver).unwrap_err();
        assert!(matches!(err, TickError::NotRunning));
    }

    #[tokio::test]
    async fn advances_until_stopped() {
        let tm = Arc::new(TickManager::new(8, 0.0));
        let driver = Arc::new(FakeDriver::new(None));
        tm.start_auto_tick(driver.clone() as Arc<dyn AdvanceDriver>)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tm.stop_auto_tick(driver.as_ref()).await.unwrap();
        assert!(driver.ticks.load(Ordering::SeqCst) > 0);
        assert!(!driver.auto_tick.load(Ordering::SeqCst));
        assert!(!tm.auto_tick_alive());
        assert!(driver.supervisions.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn disables_itself_on_advance_error() {
        let tm = Arc::new(TickManager::new(8, 0.0));
        let driver = Arc::new(FakeDriver::new(Some(3)));
        tm.start_auto_tick(driver.clone() as Arc<dyn AdvanceDriver>)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(driver.ticks.load(Ordering::SeqCst), 3);
        assert!(!driver.auto_tick.load(Ordering::SeqCst));
        assert!(!tm.auto_tick_alive());
    }

    #[tokio::test]
    async fn second_start_is_a_no_op_while_alive() {
        let tm = Arc::new(TickManager::new(8, 0.05));
        let driver = Arc::new(FakeDriver::new(None));
        tm.start_auto_tick(driver.clone() as Arc<dyn AdvanceDriver>)
            .unwrap();
        tm.start_auto_tick(driver.clone() as Arc<dyn AdvanceDriver>)
            .unwrap();
        assert!(tm.auto_tick_alive());
        tm.stop_auto_tick(driver.as_ref()).await.unwrap();
    }
}
