//! Shared fixtures for the end-to-end watchdog scenarios
//!
//! A [`Harness`] wires a [`Controller`] to a [`MemoryAudioHost`] over a real
//! notification queue, so every side effect a scenario triggers is delivered
//! back through the controller exactly as a sound server would deliver it.

use std::sync::Arc;
use std::time::Duration;
use volguard_core::domain::audio::{notification_channel, NotificationReceiver, Result, Scope};
use volguard_core::domain::{Config, Controller, Role};
use volguard_infra::audio::{MemoryAudioHost, VolumeWrite};

/// Target "Speakers", default 3.5%, dangerous 8%, master output
pub fn speakers_config() -> Config {
    match Config::new("Speakers", 0.035, 0.08, 0, Scope::Output) {
        Ok(config) => config,
        Err(e) => panic!("fixture config rejected: {e}"),
    }
}

pub struct Harness {
    pub host: Arc<MemoryAudioHost>,
    pub controller: Controller,
    events: NotificationReceiver,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let (tx, events) = notification_channel();
        let host = Arc::new(MemoryAudioHost::new(tx));
        let controller = Controller::new(host.clone(), config);
        Self {
            host,
            controller,
            events,
        }
    }

    /// Register the device list watch and run the first pass
    pub fn start(&mut self) -> Result<()> {
        self.controller.start()?;
        self.settle();
        Ok(())
    }

    /// Handle every queued notification, including ones handling produces
    pub fn settle(&mut self) -> usize {
        self.controller.process_pending(&mut self.events)
    }

    /// Drive the real event loop for `duration`, then shut down
    pub async fn run_for(&mut self, duration: Duration) {
        self.controller
            .run(&mut self.events, tokio::time::sleep(duration))
            .await;
    }

    pub fn active_roles(&self) -> Vec<Role> {
        self.controller.reconciler().slots().active_roles()
    }

    /// Name of the device bound to `role`, if any
    pub fn bound_name(&self, role: Role) -> Option<String> {
        self.controller
            .reconciler()
            .slots()
            .get(role)
            .device()
            .map(|d| d.name.clone())
    }

    pub fn writes(&self) -> Vec<VolumeWrite> {
        self.host.volume_writes()
    }
}
