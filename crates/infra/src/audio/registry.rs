//! Notification registration table shared by the backends
//!
//! Backends turn raw sound-server events into [`AudioEvent`]s and hand them to
//! [`Registry::dispatch`], which addresses one [`Notification`] to every live
//! registration that asked for that kind of event (and, when scoped, for that
//! device).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};
use volguard_core::domain::audio::{
    AudioError, AudioEvent, DeviceId, EventKind, Notification, NotificationSender, Result,
    SubscriptionToken,
};

#[derive(Debug, Clone)]
struct Registration {
    kind: EventKind,
    device: Option<DeviceId>,
}

impl Registration {
    fn matches(&self, event: &AudioEvent) -> bool {
        self.kind == event.kind()
            && match &self.device {
                Some(device) => event.device() == Some(device),
                None => true,
            }
    }
}

#[derive(Debug, Default)]
struct Table {
    next_token: u64,
    entries: HashMap<SubscriptionToken, Registration>,
}

/// Live registrations plus the queue their notifications go to
pub struct Registry {
    table: Mutex<Table>,
    sender: NotificationSender,
}

impl Registry {
    pub fn new(sender: NotificationSender) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            sender,
        }
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, kind: EventKind, device: Option<&DeviceId>) -> SubscriptionToken {
        let mut table = self.table();
        table.next_token += 1;
        let token = SubscriptionToken::new(table.next_token);
        table.entries.insert(
            token,
            Registration {
                kind,
                device: device.cloned(),
            },
        );
        debug!(%token, ?kind, device = ?device.map(DeviceId::as_str), "Registered");
        token
    }

    pub fn unregister(&self, token: SubscriptionToken) -> Result<()> {
        match self.table().entries.remove(&token) {
            Some(_) => {
                debug!(%token, "Unregistered");
                Ok(())
            }
            None => Err(AudioError::SubscriptionNotFound(token)),
        }
    }

    pub fn len(&self) -> usize {
        self.table().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any registration would receive an event of `kind`
    pub fn wants(&self, kind: EventKind) -> bool {
        self.table().entries.values().any(|r| r.kind == kind)
    }

    /// Queue `event` for every matching registration; returns how many
    pub fn dispatch(&self, event: AudioEvent) -> usize {
        let mut tokens: Vec<SubscriptionToken> = self
            .table()
            .entries
            .iter()
            .filter(|(_, registration)| registration.matches(&event))
            .map(|(token, _)| *token)
            .collect();
        tokens.sort_by_key(SubscriptionToken::raw);

        let mut delivered = 0;
        for token in tokens {
            let notification = Notification {
                token,
                event: event.clone(),
            };
            if self.sender.send(notification).is_err() {
                debug!("Notification receiver dropped");
                break;
            }
            delivered += 1;
        }

        trace!(?event, delivered, "Dispatched");
        delivered
    }
}
