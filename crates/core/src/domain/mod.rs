//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod controller;
pub mod reconciler;
pub mod subscription;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

pub use audio::{
    notification_channel, AudioError, AudioEvent, AudioSubsystem, DeviceId, DeviceInfo, EventKind,
    Notification, NotificationReceiver, NotificationSender, Scope, SubscriptionToken,
};
pub use config::{Config, ConfigError, DEFAULT_PROXY_MARKER};
pub use controller::Controller;
pub use reconciler::{Reconciler, Role, RoleSlots, TopologySnapshot};
pub use subscription::Subscription;
pub use watchdog::{Observation, VolumeWatchdog};
