use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Batch optimizer run on its own cadence, outside the dispatch loop.
pub trait Optimizer: Send {
    fn solve(&mut self, iterations: usize);
}

/// Does no work; counts how often it was asked to.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NullOptimizer {
    pub calls: usize,
    pub iterations: usize,
}

impl Optimizer for NullOptimizer {
    fn solve(&mut self, iterations: usize) {
        self.calls += 1;
        self.iterations += iterations;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub period_ms: u64,
    pub iterations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            iterations: 10,
        }
    }
}

/// Calls `solve` on a shared optimizer every period until stopped or dropped.
pub struct OptimizerWorker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OptimizerWorker {
    pub fn spawn<O>(optimizer: Arc<Mutex<O>>, config: OptimizerConfig) -> Self
    where
        O: Optimizer + 'static,
    {
        let (stop, stop_rx) = bounded::<()>(1);
        let period = Duration::from_millis(config.period_ms.max(1));
        let handle = thread::spawn(move || {
            let mut rounds = 0u64;
            loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        optimizer.lock().solve(config.iterations);
                        rounds += 1;
                        trace!(rounds, "optimizer round");
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!(rounds, "optimizer worker stopped");
        });
        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    /// Signals the worker and waits for the current round to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OptimizerWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_solves_on_cadence_until_stopped() {
        let optimizer = Arc::new(Mutex::new(NullOptimizer::default()));
        let worker = OptimizerWorker::spawn(
            Arc::clone(&optimizer),
            OptimizerConfig {
                period_ms: 2,
                iterations: 3,
            },
        );
        thread::sleep(Duration::from_millis(60));
        worker.stop();

        let calls = optimizer.lock().calls;
        assert!(calls > 0);
        assert_eq!(optimizer.lock().iterations, calls * 3);

        thread::sleep(Duration::from_millis(10));
        assert_eq!(optimizer.lock().calls, calls);
    }
}
