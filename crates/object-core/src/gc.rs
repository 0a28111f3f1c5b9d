//! Background garbage collection
//!
//! Periodically sweeps a [`MediaObjectGraph`] and releases objects idle past
//! their garbage period. A sweep is a client release in every respect except
//! that losing a race to a concurrent release is not an error.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::graph::MediaObjectGraph;

/// Called after every sweep with the number of objects it released
pub type SweepHook = Box<dyn Fn(usize) + Send + Sync>;

/// Handle to a running sweep task
pub struct GarbageCollector {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl GarbageCollector {
    /// Start sweeping `graph` every `interval`
    pub fn spawn(graph: Arc<MediaObjectGraph>, interval: Duration) -> Self {
        Self::spawn_with_hook(graph, interval, Box::new(|_| {}))
    }

    /// Like [`GarbageCollector::spawn`], running `after_sweep` once each
    /// sweep has finished
    pub fn spawn_with_hook(graph: Arc<MediaObjectGraph>, interval: Duration, after_sweep: SweepHook) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Garbage collector running every {:?}", interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let collected = graph.collect_garbage(Instant::now()).await;
                        debug!("Garbage sweep released {} object(s)", collected);
                        after_sweep(collected);
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Garbage collector stopped");
        });

        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Stop the task and wait for the current sweep to finish
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
