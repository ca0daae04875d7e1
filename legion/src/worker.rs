//! Scheduling of control loop iterations

use crate::controller::ControlLoop;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A scheduled control loop.
///
/// Iterations run one at a time on a single task; the next one is armed
/// only after the previous one returns, so the poll interval is measured
/// end-to-start.
pub struct LoopHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    /// Schedule the loop, first iteration after `first_delay`
    pub fn spawn(control: Arc<ControlLoop>, first_delay: Duration) -> Self {
        let (cancel, mut cancelled) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut delay = first_delay;
            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                // Never interrupted once started
                control.poll();

                delay = Duration::from_millis(u64::from(control.tunables().snapshot().poll_interval_ms));
            }
            debug!("Control loop stopped");
        });

        Self { cancel, task }
    }

    /// Cancel pending iterations and wait for any in-flight one to finish
    pub async fn cancel(self) {
        let _ = self.cancel.send(());
        if let Err(e) = self.task.await {
            error!("Control loop task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
