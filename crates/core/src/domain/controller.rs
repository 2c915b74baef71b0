//! Top-level event loop
//!
//! The [`Controller`] owns the device-list registration (the topology watch)
//! and the [`Reconciler`]. All notifications are consumed here, one at a
//! time, so slot state is only ever touched from this single context.

use crate::domain::audio::{
    AudioEvent, AudioSubsystem, EventKind, Notification, NotificationReceiver, Result,
};
use crate::domain::config::Config;
use crate::domain::reconciler::Reconciler;
use crate::domain::subscription::Subscription;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Controller {
    reconciler: Reconciler,
    topology: Subscription,
}

impl Controller {
    pub fn new(audio: Arc<dyn AudioSubsystem>, config: Config) -> Self {
        Self {
            reconciler: Reconciler::new(audio, config),
            topology: Subscription::new(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn is_started(&self) -> bool {
        self.topology.is_active()
    }

    /// Register for device-list changes, running the first pass synchronously
    pub fn start(&mut self) -> Result<()> {
        let audio = Arc::clone(self.reconciler.audio());
        let reconciler = &mut self.reconciler;
        let started = self.topology.start(
            None,
            || reconciler.reconcile(),
            || audio.subscribe(EventKind::DeviceListChanged, None),
        )?;

        if started {
            info!("Watching device list");
        }
        Ok(())
    }

    /// Dispatch one notification
    pub fn handle(&mut self, notification: Notification) {
        if self.topology.token() == Some(notification.token) {
            match notification.event {
                AudioEvent::DeviceListChanged => {
                    debug!("Device list changed");
                    self.reconciler.reconcile();
                }
                event => debug!(?event, "Ignoring unexpected event on device list watch"),
            }
            return;
        }

        if !self.reconciler.handle(&notification) {
            debug!(token = %notification.token, "Dropping notification for inactive subscription");
        }
    }

    /// Handle everything already queued without waiting; returns the count
    pub fn process_pending(&mut self, events: &mut NotificationReceiver) -> usize {
        let mut handled = 0;
        while let Ok(notification) = events.try_recv() {
            self.handle(notification);
            handled += 1;
        }
        handled
    }

    /// Consume notifications until `shutdown` resolves or every sender is gone
    ///
    /// All registrations are released before returning.
    pub async fn run<F>(&mut self, events: &mut NotificationReceiver, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                next = events.recv() => match next {
                    Some(notification) => self.handle(notification),
                    None => {
                        warn!("Notification channel closed");
                        break;
                    }
                },
            }
        }

        self.shutdown();
    }

    /// Release the topology watch and every role slot
    pub fn shutdown(&mut self) {
        let audio = Arc::clone(self.reconciler.audio());
        match self.topology.stop(|token| audio.unsubscribe(token)) {
            Ok(true) => info!("Stopped watching device list"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to unregister device list watch"),
        }
        self.reconciler.shutdown();
    }
}
