//! Background collector: drives the sampler from a timer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use sps30_core::ReadingSource;

use crate::messages::{Command, SamplerEvent};
use crate::sampler::Sampler;

/// Owns a [`Sampler`] and ticks it every sample period.
///
/// Commands that arrive during a tick are held until it finishes, except
/// [`Command::Shutdown`], which abandons the tick so a slow port scan does
/// not hold up exit. The collector stops on [`Command::Shutdown`] or when
/// every command sender is dropped.
pub struct Collector<S: ReadingSource> {
    sampler: Sampler<S>,
    period: Duration,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<SamplerEvent>,
}

impl<S: ReadingSource> Collector<S> {
    /// Create a new collector.
    pub fn new(
        sampler: Sampler<S>,
        period: Duration,
        commands: mpsc::Receiver<Command>,
        events: mpsc::Sender<SamplerEvent>,
    ) -> Self {
        Self {
            sampler,
            period,
            commands,
            events,
        }
    }

    /// Run until shut down. Returns the sampler with its port closed.
    pub async fn run(mut self) -> Sampler<S> {
        info!("Starting collector (sample period {:?})", self.period);

        let mut timer = interval(self.period);
        // A slow poll delays the schedule instead of causing a burst of ticks.
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let Some(deferred) = self.tick_until_shutdown().await else {
                        break;
                    };
                    for command in deferred {
                        self.handle(command).await;
                    }
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("Command channel closed");
                        break;
                    };
                    if !self.handle(command).await {
                        break;
                    }
                }
            }
        }

        self.sampler.shutdown().await;
        info!("Collector stopped");
        self.sampler
    }

    /// Run one tick and publish its events, collecting commands received
    /// meanwhile. Returns `None` if a shutdown cut the tick short; the
    /// collected commands never include [`Command::Shutdown`].
    async fn tick_until_shutdown(&mut self) -> Option<Vec<Command>> {
        let mut deferred = Vec::new();
        let events = {
            let tick = self.sampler.tick();
            tokio::pin!(tick);
            loop {
                tokio::select! {
                    events = &mut tick => break events,
                    command = self.commands.recv() => match command {
                        Some(Command::Shutdown) | None => {
                            info!("Shutdown during tick; abandoning it");
                            return None;
                        }
                        Some(command) => deferred.push(command),
                    },
                }
            }
        };
        self.publish(events).await;
        Some(deferred)
    }

    /// Apply one command. Returns `false` on shutdown.
    async fn handle(&mut self, command: Command) -> bool {
        debug!("Command: {:?}", command);
        let events = match command {
            Command::Pause => self.sampler.pause().into_iter().collect(),
            Command::Resume => self.sampler.resume().into_iter().collect(),
            Command::ConnectionTest => self.sampler.connection_test().await,
            Command::Shutdown => return false,
        };
        self.publish(events).await;
        true
    }

    async fn publish(&self, events: Vec<SamplerEvent>) {
        for event in events {
            if self.events.send(event).await.is_err() {
                debug!("Event receiver dropped");
                return;
            }
        }
    }
}
