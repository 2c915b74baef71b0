//! Audio control-surface abstractions and domain models
//!
//! This module defines the platform-agnostic view of the audio subsystem the
//! watchdog depends on: device enumeration, volume get/set, and notification
//! registration. Implementations for specific sound servers live in the
//! `infra` crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The sound server or its control tool failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Output from the sound server could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Device does not expose the requested channel/scope volume control
    #[error("Unsupported control: channel {channel}, scope {scope}")]
    UnsupportedControl { channel: u32, scope: Scope },

    /// Token does not refer to a live registration
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionToken),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Stable identifier for an audio device
///
/// Survives renames; the display name lives in [`DeviceInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity plus current display name of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: DeviceId::new(id),
            name: name.into(),
        }
    }
}

/// Channel grouping used by the volume control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Output,
    Global,
    Input,
    Main,
    Playthrough,
    Wildcard,
}

impl Scope {
    pub const ALL: [Scope; 6] = [
        Scope::Output,
        Scope::Global,
        Scope::Input,
        Scope::Main,
        Scope::Playthrough,
        Scope::Wildcard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Output => "output",
            Scope::Global => "global",
            Scope::Input => "input",
            Scope::Main => "main",
            Scope::Playthrough => "playthrough",
            Scope::Wildcard => "wildcard",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a scope name is not one of the fixed set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scope '{0}' (expected output|global|input|main|playthrough|wildcard)")]
pub struct ParseScopeError(pub String);

impl FromStr for Scope {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Scope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| ParseScopeError(s.to_string()))
    }
}

/// Opaque handle for one notification registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kinds of notification a caller can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DeviceListChanged,
    DeviceVolumeChanged,
    DeviceNameChanged,
    DefaultOutputDeviceChanged,
}

/// Payload of a delivered notification
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    DeviceListChanged,
    VolumeChanged {
        device: DeviceId,
        channel: u32,
        scope: Scope,
    },
    /// Carries the renamed device so handlers need not re-enumerate
    NameChanged { device: DeviceInfo },
    DefaultOutputChanged,
}

impl AudioEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AudioEvent::DeviceListChanged => EventKind::DeviceListChanged,
            AudioEvent::VolumeChanged { .. } => EventKind::DeviceVolumeChanged,
            AudioEvent::NameChanged { .. } => EventKind::DeviceNameChanged,
            AudioEvent::DefaultOutputChanged => EventKind::DefaultOutputDeviceChanged,
        }
    }

    /// Device the event is scoped to, if any
    pub fn device(&self) -> Option<&DeviceId> {
        match self {
            AudioEvent::VolumeChanged { device, .. } => Some(device),
            AudioEvent::NameChanged { device } => Some(&device.id),
            AudioEvent::DeviceListChanged | AudioEvent::DefaultOutputChanged => None,
        }
    }
}

/// An event addressed to the registration that asked for it
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub token: SubscriptionToken,
    pub event: AudioEvent,
}

/// Sending half handed to backends; the controller owns the receiver
pub type NotificationSender = mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Create the queue that carries notifications into the controller
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

/// Trait for platform-agnostic volume control and change notification
///
/// Implementations deliver notifications for live registrations through the
/// [`NotificationSender`] they were built with. Delivery never re-enters the
/// caller: events are queued and consumed by the controller loop.
pub trait AudioSubsystem: Send + Sync {
    /// List all currently known devices, in enumeration order
    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// The device the OS currently routes output to
    fn default_output_device(&self) -> Result<Option<DeviceInfo>>;

    /// Read a volume in `[0, 1]`; `None` when the control is unreadable
    fn volume(&self, device: &DeviceId, channel: u32, scope: Scope) -> Option<f32>;

    /// Write a volume in `[0, 1]`
    fn set_volume(&self, device: &DeviceId, channel: u32, scope: Scope, volume: f32) -> Result<()>;

    /// Register for notifications, optionally scoped to one device
    fn subscribe(&self, kind: EventKind, device: Option<&DeviceId>) -> Result<SubscriptionToken>;

    /// Remove a registration
    fn unsubscribe(&self, token: SubscriptionToken) -> Result<()>;
}

/// Format a `[0, 1]` volume as a percentage for log lines
pub fn percent(volume: f32) -> f32 {
    volume * 100.0
}
