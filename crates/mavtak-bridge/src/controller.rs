//! Owns the running bridge so it can be reconfigured at runtime

use crate::bridge::{Bridge, BridgeContext, BridgeHandle};
use mavtak_core::{BridgeSettings, Result};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Running bridge plus the settings it was started with.
///
/// The tracker and counters in the shared [`BridgeContext`] survive restarts.
pub struct BridgeController {
    context: Arc<BridgeContext>,
    settings: RwLock<BridgeSettings>,
    handle: Mutex<Option<BridgeHandle>>,
}

impl BridgeController {
    pub fn start(settings: BridgeSettings) -> Result<Self> {
        Self::start_with_context(settings, Arc::new(BridgeContext::new()))
    }

    pub fn start_with_context(
        settings: BridgeSettings,
        context: Arc<BridgeContext>,
    ) -> Result<Self> {
        let handle = Bridge::start_with_context(&settings, Arc::clone(&context))?;

        Ok(Self {
            context,
            settings: RwLock::new(settings),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.context
    }

    /// Settings of the running (or last running) bridge
    pub fn settings(&self) -> BridgeSettings {
        self.settings.read().clone()
    }

    /// Listener address, `None` once shut down
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.lock().await.as_ref().map(BridgeHandle::local_addr)
    }

    /// Stops the running bridge and starts it again with `settings`.
    ///
    /// Invalid settings are rejected before anything is stopped. When the new
    /// settings fail to start, the previous ones are brought back up and the
    /// start error is returned.
    pub async fn restart(&self, settings: BridgeSettings) -> Result<SocketAddr> {
        settings.validate()?;

        let mut handle = self.handle.lock().await;
        let previous = self.settings();

        if let Some(running) = handle.take() {
            running.shutdown(previous.shutdown_grace()).await;
        }

        match Bridge::start_with_context(&settings, Arc::clone(&self.context)) {
            Ok(started) => {
                let local_addr = started.local_addr();
                *handle = Some(started);
                *self.settings.write() = settings;
                info!(listen = %local_addr, "Bridge restarted with new settings");
                Ok(local_addr)
            }
            Err(e) => {
                warn!(error = %e, "New settings failed to start, restoring previous settings");
                self.context
                    .status
                    .record_error(format!("Reconfiguration failed: {e}"));

                match Bridge::start_with_context(&previous, Arc::clone(&self.context)) {
                    Ok(restored) => *handle = Some(restored),
                    Err(restore) => {
                        error!(error = %restore, "Failed to restore previous bridge settings")
                    }
                }
                Err(e)
            }
        }
    }

    /// Stops the bridge; later calls are no-ops
    pub async fn shutdown(&self) {
        let grace = self.settings.read().shutdown_grace();
        let running = self.handle.lock().await.take();
        if let Some(running) = running {
            running.shutdown(grace).await;
        }
    }
}
