//! Routes connection events to the surface they are addressed to.
//!
//! The registry owns one [`SurfaceProxy`] per attached surface, keyed by
//! surface id.  It consumes the [`ClientEvent`] stream from the connection
//! layer and:
//!
//! - re-registers every known surface each time a session becomes ready;
//! - shows an animated "Connecting" card on every surface while there is no
//!   session;
//! - forwards per-surface events (draw, brightness, lock state, ...) to the
//!   matching proxy and drops events for unknown ids.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::ClientEvent;
use super::surface_driver::{CardRenderer, SurfaceDriver};
use super::surface_link::SurfaceLink;
use super::surface_proxy::SurfaceProxy;

/// Timing for the disconnected status animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTimings {
    /// How often the "Connecting" card is redrawn.
    pub tick: Duration,
}

impl Default for StatusTimings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
        }
    }
}

/// Text of the connecting card for animation step `step`: one to three dots.
pub fn connecting_status(step: usize) -> String {
    format!("Connecting{}", ".".repeat(step % 3 + 1))
}

pub struct SurfaceRegistry {
    link: Arc<dyn SurfaceLink>,
    card_renderer: Arc<dyn CardRenderer>,
    timings: StatusTimings,
    surfaces: Mutex<HashMap<String, Arc<SurfaceProxy>>>,
    connected: Mutex<bool>,
    status_ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SurfaceRegistry {
    pub fn new(
        link: Arc<dyn SurfaceLink>,
        card_renderer: Arc<dyn CardRenderer>,
        timings: StatusTimings,
    ) -> Arc<Self> {
        Arc::new(Self {
            link,
            card_renderer,
            timings,
            surfaces: Mutex::new(HashMap::new()),
            connected: Mutex::new(false),
            status_ticker: Mutex::new(None),
        })
    }

    /// Attaches a surface: initialises the driver and, if a session is ready,
    /// registers it with the server.
    pub async fn add_surface(
        self: &Arc<Self>,
        driver: Arc<dyn SurfaceDriver>,
    ) -> anyhow::Result<Arc<SurfaceProxy>> {
        let surface_id = driver.surface_id().to_string();
        anyhow::ensure!(
            !self.surfaces().contains_key(&surface_id),
            "surface {surface_id} is already attached"
        );

        let proxy = SurfaceProxy::new(driver, Arc::clone(&self.link), Arc::clone(&self.card_renderer));
        proxy
            .driver()
            .init_device(proxy.context())
            .await
            .with_context(|| format!("initialising surface {surface_id}"))?;

        self.surfaces().insert(surface_id.clone(), Arc::clone(&proxy));
        info!(surface = %surface_id, "surface attached");

        if self.is_connected() {
            self.register(&proxy);
        } else {
            proxy.show_status(&connecting_status(0));
            self.start_status_ticker();
        }
        Ok(proxy)
    }

    /// Detaches a surface: stops its drawing, closes the driver and withdraws
    /// it from the server.
    pub async fn remove_surface(&self, surface_id: &str) -> bool {
        let Some(proxy) = self.surfaces().remove(surface_id) else {
            return false;
        };
        proxy.close().await;
        self.link.remove_device(surface_id);
        info!(surface = %surface_id, "surface detached");
        true
    }

    /// Detaches every surface.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.surfaces().keys().cloned().collect();
        for id in ids {
            self.remove_surface(&id).await;
        }
        self.stop_status_ticker();
    }

    pub fn get(&self, surface_id: &str) -> Option<Arc<SurfaceProxy>> {
        self.surfaces().get(surface_id).cloned()
    }

    pub fn surface_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.surfaces().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consumes connection events until the channel closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<ClientEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("event channel closed; registry loop exiting");
        self.stop_status_ticker();
    }

    /// Applies one connection event.
    pub async fn handle_event(self: &Arc<Self>, event: ClientEvent) {
        match event {
            ClientEvent::Connecting | ClientEvent::Disconnected => {
                self.set_connected(false);
                self.start_status_ticker();
            }
            ClientEvent::Connected(capabilities) => {
                info!(
                    api = %capabilities.api_version,
                    lock_overlay = capabilities.supports_lock_overlay,
                    "session ready; registering surfaces"
                );
                self.set_connected(true);
                self.stop_status_ticker();
                for proxy in self.all() {
                    self.register(&proxy);
                }
            }
            ClientEvent::Error(message) => warn!("connection error: {message}"),
            ClientEvent::Draw(state) => {
                if let Some(proxy) = self.lookup(&state.surface_id) {
                    proxy.draw(state);
                }
            }
            ClientEvent::Brightness {
                surface_id,
                percent,
            } => {
                if let Some(proxy) = self.lookup(&surface_id) {
                    proxy.set_brightness(percent).await;
                }
            }
            ClientEvent::NewDevice { surface_id } => {
                if let Some(proxy) = self.lookup(&surface_id) {
                    info!(surface = %surface_id, "surface registered");
                    proxy.device_added().await;
                }
            }
            ClientEvent::ClearDeck { surface_id } => {
                if let Some(proxy) = self.lookup(&surface_id) {
                    proxy.clear_deck();
                }
            }
            ClientEvent::VariableValue {
                surface_id,
                name,
                value,
            } => {
                if let Some(proxy) = self.lookup(&surface_id) {
                    proxy.on_variable_value(&name, &value).await;
                }
            }
            ClientEvent::LockedState {
                surface_id,
                locked,
                character_count,
            } => {
                if let Some(proxy) = self.lookup(&surface_id) {
                    proxy.on_locked_status(locked, character_count).await;
                }
            }
            ClientEvent::DeviceErrored {
                surface_id,
                message,
            } => {
                // The surface stays attached and is retried on the next session.
                warn!(surface = %surface_id, "server rejected surface: {message}");
                if let Some(proxy) = self.lookup(&surface_id) {
                    proxy.show_status(&message);
                }
            }
            ClientEvent::DeviceRemoved { surface_id } => {
                if let Some(proxy) = self.lookup(&surface_id) {
                    info!(surface = %surface_id, "server removed surface");
                    proxy.blank_device();
                }
            }
        }
    }

    fn register(&self, proxy: &SurfaceProxy) {
        let driver = proxy.driver();
        if let Err(e) = self
            .link
            .add_device(proxy.surface_id(), driver.product_name(), driver.register_props())
        {
            warn!(surface = %proxy.surface_id(), "could not register surface: {e:#}");
        }
    }

    fn lookup(&self, surface_id: &str) -> Option<Arc<SurfaceProxy>> {
        let proxy = self.get(surface_id);
        if proxy.is_none() {
            debug!(surface = %surface_id, "event for unknown surface dropped");
        }
        proxy
    }

    fn all(&self) -> Vec<Arc<SurfaceProxy>> {
        self.surfaces().values().cloned().collect()
    }

    fn set_connected(&self, connected: bool) {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner) = connected;
    }

    // ── Status animation ──────────────────────────────────────────────────────

    fn start_status_ticker(self: &Arc<Self>) {
        let mut ticker = self.ticker();
        if ticker.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let registry = Arc::downgrade(self);
        let period = self.timings.tick;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut step = 0usize;
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if registry.is_connected() {
                    break;
                }
                let status = connecting_status(step);
                for proxy in registry.all() {
                    proxy.show_status(&status);
                }
                step = step.wrapping_add(1);
            }
        }));
    }

    fn stop_status_ticker(&self) {
        if let Some(ticker) = self.ticker().take() {
            ticker.abort();
        }
    }

    fn ticker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.status_ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn surfaces(&self) -> MutexGuard<'_, HashMap<String, Arc<SurfaceProxy>>> {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
