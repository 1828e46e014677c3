//! Background sampling thread.
//!
//! The collector runs on a tokio runtime owned by a dedicated thread so
//! serial I/O never blocks the UI. Commands go in over a tokio channel;
//! events come back over a std channel the UI drains without awaiting.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sps30_core::{PortResolver, ReadingSource};
use sps30_service::{Collector, Command, Sampler, SamplerEvent};
use sps30_store::{CsvLogger, HistoryStore};

use crate::tray;

/// Longest the UI waits for the worker to close the port on exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the worker needs besides the reading source.
pub struct WorkerSetup {
    pub resolver: PortResolver,
    pub logger: CsvLogger,
    pub history: Arc<HistoryStore>,
    pub sample_period: Duration,
    pub failure_threshold: u32,
    pub start_paused: bool,
}

/// Handle to the running worker thread.
pub struct SamplerWorker {
    commands: mpsc::Sender<Command>,
    events: std_mpsc::Receiver<SamplerEvent>,
    thread: Option<JoinHandle<()>>,
}

impl SamplerWorker {
    /// Start sampling `source` on a new thread.
    pub fn spawn<S>(source: S, setup: WorkerSetup) -> Result<Self>
    where
        S: ReadingSource + 'static,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("sps30-sampler")
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;

        let (command_tx, command_rx) = mpsc::channel::<Command>(32);
        let (event_tx, mut event_rx) = mpsc::channel::<SamplerEvent>(64);
        let (std_tx, std_rx) = std_mpsc::channel::<SamplerEvent>();

        let sampler = Sampler::new(
            Arc::new(source),
            setup.resolver,
            setup.logger,
            setup.history,
        )
        .with_failure_threshold(setup.failure_threshold)
        .paused(setup.start_paused);
        let collector = Collector::new(sampler, setup.sample_period, command_rx, event_tx);

        let thread = std::thread::Builder::new()
            .name("sps30-worker".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    // Ends once the collector drops its event sender.
                    let forward = tokio::spawn(async move {
                        while let Some(event) = event_rx.recv().await {
                            if std_tx.send(event).is_err() {
                                break; // UI closed
                            }
                            tray::request_repaint();
                        }
                    });

                    collector.run().await;
                    let _ = forward.await;
                });
                // Don't wait on serial I/O left behind by an abandoned tick.
                runtime.shutdown_timeout(Duration::from_secs(1));
                info!("Worker thread stopped");
            })
            .context("Failed to spawn worker thread")?;

        Ok(Self {
            commands: command_tx,
            events: std_rx,
            thread: Some(thread),
        })
    }

    /// Queue a command without blocking the UI.
    pub fn send(&self, command: Command) {
        if let Err(e) = self.commands.try_send(command) {
            warn!("Failed to send {:?} to worker: {}", command, e);
        }
    }

    /// Events received since the last call.
    pub fn drain(&self) -> Vec<SamplerEvent> {
        self.events.try_iter().collect()
    }

    /// Stop the collector, close the port and join the thread.
    ///
    /// Waits at most [`SHUTDOWN_TIMEOUT`]; a worker still busy after that
    /// is detached and ends with the process.
    pub fn shutdown(&mut self) {
        self.shutdown_within(SHUTDOWN_TIMEOUT);
    }

    /// Returns whether the worker thread finished within `timeout`.
    fn shutdown_within(&mut self, timeout: Duration) -> bool {
        let Some(thread) = self.thread.take() else {
            return true;
        };
        debug!("Sending shutdown command");
        if self.commands.try_send(Command::Shutdown).is_err() {
            debug!("Worker already stopped or command queue full");
        }

        let deadline = Instant::now() + timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                warn!("Worker did not stop within {:?}; detaching it", timeout);
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        if thread.join().is_err() {
            warn!("Worker thread panicked");
        }
        true
    }
}

impl Drop for SamplerWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sps30_core::MockSource;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn setup(dir: &TempDir, history: Arc<HistoryStore>) -> WorkerSetup {
        WorkerSetup {
            resolver: PortResolver::new(None, vec!["COM5".to_string()]),
            logger: CsvLogger::new(dir.path().join("logs")).unwrap(),
            history,
            sample_period: Duration::from_millis(20),
            failure_threshold: 3,
            start_paused: false,
        }
    }

    fn wait_for(worker: &SamplerWorker, pred: impl Fn(&SamplerEvent) -> bool) -> SamplerEvent {
        loop {
            let event = worker
                .events
                .recv_timeout(WAIT)
                .expect("worker produced no matching event");
            if pred(&event) {
                return event;
            }
        }
    }

    #[test]
    fn test_worker_connects_and_records() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(HistoryStore::new());
        let mut worker = SamplerWorker::spawn(
            MockSource::new().with_port("COM5"),
            setup(&dir, Arc::clone(&history)),
        )
        .unwrap();

        let connected = wait_for(&worker, |e| matches!(e, SamplerEvent::Connected { .. }));
        assert_eq!(
            connected,
            SamplerEvent::Connected {
                port: "COM5".to_string()
            }
        );
        wait_for(&worker, |e| matches!(e, SamplerEvent::Reading(_)));
        assert!(!history.is_empty());

        worker.shutdown();
        let logged = std::fs::read_dir(dir.path().join("logs")).unwrap().count();
        assert_eq!(logged, 1);
    }

    #[test]
    fn test_worker_pause_command() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(HistoryStore::new());
        let mut worker = SamplerWorker::spawn(
            MockSource::new().with_port("COM5"),
            setup(&dir, history),
        )
        .unwrap();

        wait_for(&worker, |e| matches!(e, SamplerEvent::Reading(_)));
        worker.send(Command::Pause);
        wait_for(&worker, |e| *e == SamplerEvent::Paused);
        worker.send(Command::Resume);
        wait_for(&worker, |e| *e == SamplerEvent::Resumed);

        worker.shutdown();
    }

    #[test]
    fn test_shutdown_does_not_wait_for_hung_poll() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(HistoryStore::new());
        let source = MockSource::new().with_port("COM5");
        source.set_poll_delay(Duration::from_secs(3600));
        let mut worker = SamplerWorker::spawn(source, setup(&dir, history)).unwrap();

        // Let the first tick reach its trial poll.
        std::thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        assert!(worker.shutdown_within(WAIT));
        assert!(started.elapsed() < WAIT);
    }

    #[test]
    fn test_shutdown_twice_is_harmless() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(HistoryStore::new());
        let mut worker =
            SamplerWorker::spawn(MockSource::new(), setup(&dir, history)).unwrap();

        wait_for(&worker, |e| matches!(e, SamplerEvent::NoPortFound { .. }));
        worker.shutdown();
        worker.shutdown();
    }
}
