//! Level-triggered reconciliation of subscription role slots
//!
//! Every pass derives the complete desired state of the four role slots from
//! one fresh [`TopologySnapshot`] and starts or stops subscriptions to match.
//! Nothing is diffed against earlier passes, so a missed, duplicated or
//! reordered OS notification is corrected by the next pass.
//!
//! Slots are keyed by device identity: a slot that is active on a different
//! device than the one a pass selects is stopped and restarted on the new one.

use crate::domain::audio::{
    AudioEvent, AudioSubsystem, DeviceInfo, EventKind, Notification, Result, Scope,
    SubscriptionToken,
};
use crate::domain::config::Config;
use crate::domain::subscription::Subscription;
use crate::domain::watchdog::{Observation, VolumeWatchdog};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Named position a subscription can occupy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Volume watchdog on the exact-name target device
    TargetVolume,
    /// Volume watchdog on the proxy while it carries the target
    ProxyVolume,
    /// Rename watch on the known proxy
    ProxyName,
    /// Default-output watch while no proxy is known
    DefaultOutput,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::TargetVolume,
        Role::ProxyVolume,
        Role::ProxyName,
        Role::DefaultOutput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::TargetVolume => "target-volume",
            Role::ProxyVolume => "proxy-volume",
            Role::ProxyName => "proxy-name",
            Role::DefaultOutput => "default-output",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four role slots, each holding zero or one live registration
#[derive(Debug, Default)]
pub struct RoleSlots {
    target_volume: Subscription,
    proxy_volume: Subscription,
    proxy_name: Subscription,
    default_output: Subscription,
}

impl RoleSlots {
    pub fn get(&self, role: Role) -> &Subscription {
        match role {
            Role::TargetVolume => &self.target_volume,
            Role::ProxyVolume => &self.proxy_volume,
            Role::ProxyName => &self.proxy_name,
            Role::DefaultOutput => &self.default_output,
        }
    }

    fn get_mut(&mut self, role: Role) -> &mut Subscription {
        match role {
            Role::TargetVolume => &mut self.target_volume,
            Role::ProxyVolume => &mut self.proxy_volume,
            Role::ProxyName => &mut self.proxy_name,
            Role::DefaultOutput => &mut self.default_output,
        }
    }

    /// Role whose live registration owns `token`
    pub fn role_of(&self, token: SubscriptionToken) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| self.get(*role).token() == Some(token))
    }

    pub fn active_roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.get(*role).is_active())
            .collect()
    }
}

/// Ordered device list fetched at the start of a pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologySnapshot {
    devices: Vec<DeviceInfo>,
}

impl TopologySnapshot {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// First device whose name equals `name` exactly
    pub fn find_target(&self, name: &str) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// First device whose name contains `marker`
    pub fn find_proxy(&self, marker: &str) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.name.contains(marker))
    }
}

/// Owns the role slots and drives every subscription
pub struct Reconciler {
    audio: Arc<dyn AudioSubsystem>,
    config: Config,
    slots: RoleSlots,
}

impl Reconciler {
    pub fn new(audio: Arc<dyn AudioSubsystem>, config: Config) -> Self {
        Self {
            audio,
            config,
            slots: RoleSlots::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn slots(&self) -> &RoleSlots {
        &self.slots
    }

    pub fn audio(&self) -> &Arc<dyn AudioSubsystem> {
        &self.audio
    }

    /// Fetch a fresh snapshot
    pub fn snapshot(&self) -> Result<TopologySnapshot> {
        self.audio.devices().map(TopologySnapshot::new)
    }

    /// One full pass against a single fresh snapshot
    ///
    /// A failed enumeration skips the pass and leaves every slot as it was.
    #[instrument(skip(self))]
    pub fn reconcile(&mut self) {
        match self.snapshot() {
            Ok(snapshot) => self.reconcile_snapshot(&snapshot),
            Err(e) => warn!(error = %e, "Device enumeration failed, skipping reconciliation pass"),
        }
    }

    /// Run both procedures against `snapshot`
    pub fn reconcile_snapshot(&mut self, snapshot: &TopologySnapshot) {
        debug!(devices = snapshot.devices().len(), "Reconciling");
        self.target_device_procedure(snapshot);
        let proxy = snapshot.find_proxy(&self.config.proxy_marker).cloned();
        self.proxy_device_procedure(proxy);
    }

    /// Watch the device named exactly like the target, or stop watching
    pub fn target_device_procedure(&mut self, snapshot: &TopologySnapshot) {
        match snapshot.find_target(&self.config.target_device_name).cloned() {
            Some(device) => self.ensure_watchdog(Role::TargetVolume, &device),
            None => {
                if self.stop(Role::TargetVolume) {
                    info!(
                        device = %self.config.target_device_name,
                        "Target device gone, removed volume watchdog"
                    );
                }
            }
        }
    }

    /// Bring the proxy-related slots in line with `proxy`
    ///
    /// `proxy` is either the device discovered in a snapshot or one handed in
    /// explicitly by a rename or default-output notification.
    pub fn proxy_device_procedure(&mut self, proxy: Option<DeviceInfo>) {
        let Some(proxy) = proxy else {
            self.start_default_output_watch();
            if self.stop(Role::ProxyName) {
                info!("Proxy device gone, removed rename watch");
            }
            // Nothing left for a proxy watchdog to guard
            if self.stop(Role::ProxyVolume) {
                info!("Proxy device gone, removed volume watchdog");
            }
            return;
        };

        debug!(device = %proxy.name, "Proxy device found");

        if self.stop(Role::DefaultOutput) {
            info!(device = %proxy.name, "Proxy device known, removed default output watch");
        }
        self.start_proxy_name_watch(&proxy);

        if proxy.name.contains(&self.config.target_device_name) {
            self.ensure_watchdog(Role::ProxyVolume, &proxy);
        } else if self.stop(Role::ProxyVolume) {
            info!(device = %proxy.name, "Proxy no longer carries the target, removed volume watchdog");
        }
    }

    /// Route a notification to the role whose registration it belongs to
    ///
    /// Returns `false` when no slot owns the token.
    pub fn handle(&mut self, notification: &Notification) -> bool {
        let Some(role) = self.slots.role_of(notification.token) else {
            return false;
        };

        match (role, &notification.event) {
            (Role::TargetVolume | Role::ProxyVolume, AudioEvent::VolumeChanged { channel, scope, .. }) => {
                if let Some(device) = self.slots.get(role).device().cloned() {
                    self.observe_volume(&device, *channel, *scope);
                }
            }
            (Role::ProxyName, AudioEvent::NameChanged { device }) => {
                info!(device = %device.name, "Proxy device renamed");
                self.proxy_device_procedure(Some(device.clone()));
            }
            (Role::DefaultOutput, AudioEvent::DefaultOutputChanged) => {
                self.on_default_output_changed();
            }
            (role, event) => {
                debug!(%role, ?event, "Ignoring event not meant for this role");
            }
        }
        true
    }

    /// Deactivate every slot
    pub fn shutdown(&mut self) {
        for role in Role::ALL {
            if self.stop(role) {
                info!(%role, "Subscription removed");
            }
        }
    }

    fn observe_volume(&self, device: &DeviceInfo, channel: u32, scope: Scope) -> Observation {
        VolumeWatchdog::new(self.audio.as_ref(), &self.config).on_volume_changed(device, channel, scope)
    }

    fn on_default_output_changed(&mut self) {
        match self.audio.default_output_device() {
            Ok(Some(device)) => {
                info!(device = %device.name, "Default output changed");
                if device.name.contains(&self.config.proxy_marker) {
                    self.proxy_device_procedure(Some(device));
                }
            }
            Ok(None) => debug!("Default output changed to no device"),
            Err(e) => warn!(error = %e, "Failed to read default output device"),
        }
    }

    /// Keep a volume watchdog in `role` bound to `device`
    fn ensure_watchdog(&mut self, role: Role, device: &DeviceInfo) {
        self.rebind_if_moved(role, device);

        let watchdog = VolumeWatchdog::new(self.audio.as_ref(), &self.config);
        let audio = &self.audio;
        let started = self.slots.get_mut(role).start(
            Some(device.clone()),
            || watchdog.arm(device),
            || audio.subscribe(EventKind::DeviceVolumeChanged, Some(&device.id)),
        );

        match started {
            Ok(true) => info!(%role, device = %device.name, "Started volume watchdog"),
            Ok(false) => debug!(%role, device = %device.name, "Volume watchdog already active"),
            Err(e) => warn!(%role, device = %device.name, error = %e, "Failed to start volume watchdog"),
        }
    }

    fn start_proxy_name_watch(&mut self, proxy: &DeviceInfo) {
        self.rebind_if_moved(Role::ProxyName, proxy);

        let audio = &self.audio;
        let started = self.slots.get_mut(Role::ProxyName).start(
            Some(proxy.clone()),
            || {},
            || audio.subscribe(EventKind::DeviceNameChanged, Some(&proxy.id)),
        );

        match started {
            Ok(true) => info!(device = %proxy.name, "Started proxy rename watch"),
            Ok(false) => {}
            Err(e) => warn!(device = %proxy.name, error = %e, "Failed to start proxy rename watch"),
        }
    }

    fn start_default_output_watch(&mut self) {
        let audio = &self.audio;
        let started = self.slots.get_mut(Role::DefaultOutput).start(
            None,
            || {},
            || audio.subscribe(EventKind::DefaultOutputDeviceChanged, None),
        );

        match started {
            Ok(true) => info!("No proxy device known, started default output watch"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to start default output watch"),
        }
    }

    /// Stop `role` if it is active on another device; refresh the name if not
    fn rebind_if_moved(&mut self, role: Role, device: &DeviceInfo) {
        let slot = self.slots.get_mut(role);
        if !slot.is_active() {
            return;
        }

        if slot.is_bound_to(&device.id) {
            slot.refresh_device(device);
            return;
        }

        let previous = slot
            .device()
            .map(|d| d.name.clone())
            .unwrap_or_default();
        info!(%role, from = %previous, to = %device.name, "Device identity changed, rebinding");
        self.stop(role);
    }

    /// Stop `role`; true if a registration was removed
    fn stop(&mut self, role: Role) -> bool {
        let audio = &self.audio;
        match self.slots.get_mut(role).stop(|token| audio.unsubscribe(token)) {
            Ok(stopped) => stopped,
            Err(e) => {
                warn!(%role, error = %e, "Failed to unregister, dropping token");
                true
            }
        }
    }
}
