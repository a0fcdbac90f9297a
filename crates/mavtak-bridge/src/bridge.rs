//! Bridge lifecycle: listener task, emission timer, and shutdown

use crate::dispatcher::Dispatcher;
use crate::encoder::{CotEncoder, EncodeError};
use crate::listener::Listener;
use crate::status::{LogLevel, StatusStore, VehiclePosition};
use crate::tracker::StateTracker;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use mavtak_core::{BridgeSettings, Result};
use mavtak_cot::serialize_event_bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// State shared by the listener, the emitter and status readers
#[derive(Debug, Default)]
pub struct BridgeContext {
    pub tracker: StateTracker,
    pub status: Arc<StatusStore>,
}

impl BridgeContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result of one emission cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmitReport {
    pub events: usize,
    pub encode_errors: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Periodically turns tracked vehicles into CoT and dispatches it
pub struct Emitter {
    encoder: CotEncoder,
    dispatcher: Dispatcher,
    context: Arc<BridgeContext>,
    expiry: Option<Duration>,
}

impl Emitter {
    pub fn new(
        encoder: CotEncoder,
        dispatcher: Dispatcher,
        context: Arc<BridgeContext>,
        expiry: Option<Duration>,
    ) -> Self {
        Self {
            encoder,
            dispatcher,
            context,
            expiry,
        }
    }

    /// Runs a single cycle at `now`.
    ///
    /// Vehicles without a position fix, or gone stale, are skipped without
    /// counting as errors.
    pub async fn emit_once(&self, now: DateTime<Utc>) -> EmitReport {
        let mut report = EmitReport::default();
        let status = &self.context.status;

        for state in self.context.tracker.emittable(now, self.expiry) {
            let event = match self.encoder.try_encode(&state, now) {
                Ok(event) => event,
                Err(EncodeError::NotReady { .. }) => continue,
                Err(e) => {
                    warn!(vehicle_id = state.vehicle_id, error = %e, "Skipping vehicle");
                    status.record_encode_error(&e.to_string());
                    report.encode_errors += 1;
                    continue;
                }
            };

            let payload = serialize_event_bytes(&event);
            let dispatched = self.dispatcher.dispatch(&payload).await;
            report.delivered += dispatched.delivered;
            report.failed += dispatched.failed;
            report.events += 1;

            status.record_event_emitted();
            status.update_position(VehiclePosition {
                vehicle_id: state.vehicle_id,
                uid: event.uid.clone(),
                lat: state.lat,
                lon: state.lon,
                alt: state.alt,
                heading: state.heading,
                speed: state.speed,
                updated_at: now,
            });

            if dispatched.delivered > 0 {
                status.log(
                    LogLevel::Info,
                    format!(
                        "CoT sent for {} to {} destination(s)",
                        event.uid, dispatched.delivered
                    ),
                );
            }

            debug!(
                uid = %event.uid,
                bytes = payload.len(),
                delivered = dispatched.delivered,
                failed = dispatched.failed,
                "CoT event emitted"
            );
        }

        report
    }

    /// Emits on a fixed interval until the shutdown flag flips
    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("Emitter received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.emit_once(Utc::now()).await;
                }
            }
        }

        info!("Emitter stopped");
    }
}

/// Entry point for starting the pipeline
pub struct Bridge;

impl Bridge {
    /// Binds sockets and spawns the listener and emitter tasks.
    ///
    /// Must be called from within a Tokio runtime. A listener bind failure is
    /// returned as an error and nothing is left running.
    pub fn start(settings: &BridgeSettings) -> Result<BridgeHandle> {
        Self::start_with_context(settings, Arc::new(BridgeContext::new()))
    }

    pub fn start_with_context(
        settings: &BridgeSettings,
        context: Arc<BridgeContext>,
    ) -> Result<BridgeHandle> {
        settings.validate()?;

        let listener = Listener::bind(settings, Arc::clone(&context))?;
        let local_addr = listener.local_addr();

        let dispatcher = Dispatcher::from_settings(settings, Arc::clone(&context.status))?;
        let destinations = dispatcher.destination_names();
        let emitter = Emitter::new(
            CotEncoder::new(settings),
            dispatcher,
            Arc::clone(&context),
            settings.vehicle_expiry(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(listener.run(shutdown_rx.clone())),
            tokio::spawn(emitter.run(settings.emit_interval(), shutdown_rx)),
        ];

        context.status.set_running(true);
        context.status.log(
            LogLevel::Info,
            format!(
                "Bridge started on {local_addr}, sending to {}",
                destinations.join(", ")
            ),
        );
        info!(
            listen = %local_addr,
            destinations = ?destinations,
            interval_ms = settings.emit_interval_ms,
            "Bridge started"
        );

        Ok(BridgeHandle {
            local_addr,
            destinations,
            context,
            shutdown_tx,
            tasks,
        })
    }
}

/// Handle to a running bridge
pub struct BridgeHandle {
    local_addr: SocketAddr,
    destinations: Vec<String>,
    context: Arc<BridgeContext>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.context
    }

    pub fn is_running(&self) -> bool {
        self.context.status.is_running()
    }

    /// Signals shutdown and waits up to `grace` for both tasks to finish.
    ///
    /// Tasks still running after the grace period are aborted.
    pub async fn shutdown(self, grace: Duration) {
        info!(grace_ms = grace.as_millis() as u64, "Stopping bridge");
        let _ = self.shutdown_tx.send(true);

        let aborts: Vec<_> = self.tasks.iter().map(|t| t.abort_handle()).collect();
        match timeout(grace, join_all(self.tasks)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!(error = %e, "Bridge task ended abnormally");
                    }
                }
            }
            Err(_) => {
                warn!("Bridge tasks did not stop within grace period, aborting");
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        self.context.status.set_running(false);
        self.context.status.log(LogLevel::Info, "Bridge stopped");
        info!("Bridge stopped");
    }
}
