//! In-memory audio host
//!
//! Simulates a sound server: devices with per-(channel, scope) volume
//! controls, a default output, and notification delivery that behaves like
//! the OS does. Every write that changes a volume, including the watchdog's
//! own corrective writes, fires a volume-change notification.

use super::registry::Registry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use volguard_core::domain::audio::{
    AudioError, AudioEvent, AudioSubsystem, DeviceId, DeviceInfo, EventKind, NotificationSender,
    Result, Scope, SubscriptionToken,
};

/// One recorded `set_volume` call
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeWrite {
    pub device: DeviceId,
    pub channel: u32,
    pub scope: Scope,
    pub volume: f32,
}

#[derive(Debug, Clone)]
struct MemoryDevice {
    info: DeviceInfo,
    controls: HashMap<(u32, Scope), f32>,
}

#[derive(Debug, Default)]
struct HostState {
    devices: Vec<MemoryDevice>,
    default_output: Option<DeviceId>,
    writes: Vec<VolumeWrite>,
    subscribes: usize,
    unsubscribes: usize,
}

impl HostState {
    fn device_mut(&mut self, id: &DeviceId) -> Result<&mut MemoryDevice> {
        self.devices
            .iter_mut()
            .find(|d| &d.info.id == id)
            .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))
    }
}

pub struct MemoryAudioHost {
    state: Mutex<HostState>,
    registry: Registry,
}

impl MemoryAudioHost {
    pub fn new(sender: NotificationSender) -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            registry: Registry::new(sender),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug in a device exposing a master output control at full volume
    pub fn add_device(&self, id: &str, name: &str) -> DeviceInfo {
        self.add_device_with_controls(id, name, &[(0, Scope::Output, 1.0)])
    }

    /// Plug in a device exposing exactly `controls`
    pub fn add_device_with_controls(
        &self,
        id: &str,
        name: &str,
        controls: &[(u32, Scope, f32)],
    ) -> DeviceInfo {
        let info = DeviceInfo::new(id, name);
        let device = MemoryDevice {
            info: info.clone(),
            controls: controls
                .iter()
                .map(|&(channel, scope, volume)| ((channel, scope), volume))
                .collect(),
        };
        self.state().devices.push(device);
        debug!(device = %info.name, "Device added");
        self.registry.dispatch(AudioEvent::DeviceListChanged);
        info
    }

    pub fn remove_device(&self, id: &str) {
        let removed = {
            let mut state = self.state();
            let before = state.devices.len();
            state.devices.retain(|d| d.info.id.as_str() != id);
            if state.default_output.as_ref().is_some_and(|d| d.as_str() == id) {
                state.default_output = None;
            }
            before != state.devices.len()
        };

        if removed {
            debug!(device = id, "Device removed");
            self.registry.dispatch(AudioEvent::DeviceListChanged);
        }
    }

    pub fn rename_device(&self, id: &str, name: &str) -> Result<DeviceInfo> {
        let info = {
            let mut state = self.state();
            let device = state.device_mut(&DeviceId::new(id))?;
            device.info.name = name.to_string();
            device.info.clone()
        };
        self.registry.dispatch(AudioEvent::NameChanged {
            device: info.clone(),
        });
        Ok(info)
    }

    /// Route output to `id`, or to nothing
    pub fn set_default_output(&self, id: Option<&str>) -> Result<()> {
        {
            let mut state = self.state();
            let next = match id {
                Some(id) => Some(state.device_mut(&DeviceId::new(id))?.info.id.clone()),
                None => None,
            };
            if state.default_output == next {
                return Ok(());
            }
            state.default_output = next;
        }
        self.registry.dispatch(AudioEvent::DefaultOutputChanged);
        Ok(())
    }

    /// Simulate someone else moving a volume control
    pub fn change_volume(&self, id: &str, channel: u32, scope: Scope, volume: f32) -> Result<()> {
        self.write_control(&DeviceId::new(id), channel, scope, volume)
    }

    /// Every `set_volume` call made through the [`AudioSubsystem`] interface
    pub fn volume_writes(&self) -> Vec<VolumeWrite> {
        self.state().writes.clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.state().subscribes
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.state().unsubscribes
    }

    pub fn live_registrations(&self) -> usize {
        self.registry.len()
    }

    fn write_control(&self, id: &DeviceId, channel: u32, scope: Scope, volume: f32) -> Result<()> {
        let changed = {
            let mut state = self.state();
            let device = state.device_mut(id)?;
            let control = device
                .controls
                .get_mut(&(channel, scope))
                .ok_or(AudioError::UnsupportedControl { channel, scope })?;
            let changed = *control != volume;
            *control = volume;
            changed
        };

        if changed {
            self.registry.dispatch(AudioEvent::VolumeChanged {
                device: id.clone(),
                channel,
                scope,
            });
        }
        Ok(())
    }
}

impl AudioSubsystem for MemoryAudioHost {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.state().devices.iter().map(|d| d.info.clone()).collect())
    }

    fn default_output_device(&self) -> Result<Option<DeviceInfo>> {
        let state = self.state();
        Ok(state.default_output.as_ref().and_then(|id| {
            state
                .devices
                .iter()
                .find(|d| &d.info.id == id)
                .map(|d| d.info.clone())
        }))
    }

    fn volume(&self, device: &DeviceId, channel: u32, scope: Scope) -> Option<f32> {
        self.state()
            .devices
            .iter()
            .find(|d| &d.info.id == device)
            .and_then(|d| d.controls.get(&(channel, scope)).copied())
    }

    fn set_volume(&self, device: &DeviceId, channel: u32, scope: Scope, volume: f32) -> Result<()> {
        self.state().writes.push(VolumeWrite {
            device: device.clone(),
            channel,
            scope,
            volume,
        });
        self.write_control(device, channel, scope, volume)
    }

    fn subscribe(&self, kind: EventKind, device: Option<&DeviceId>) -> Result<SubscriptionToken> {
        self.state().subscribes += 1;
        Ok(self.registry.register(kind, device))
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> Result<()> {
        self.state().unsubscribes += 1;
        self.registry.unregister(token)
    }
}
