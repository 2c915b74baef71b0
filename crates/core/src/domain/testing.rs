//! Recording audio subsystem for unit tests

use crate::domain::audio::{
    AudioError, AudioSubsystem, DeviceId, DeviceInfo, EventKind, Result, Scope, SubscriptionToken,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub type SetCall = (DeviceId, u32, Scope, f32);

#[derive(Default)]
struct State {
    devices: Vec<DeviceInfo>,
    default_output: Option<DeviceInfo>,
    volumes: HashMap<(DeviceId, u32, Scope), f32>,
    live: HashMap<SubscriptionToken, (EventKind, Option<DeviceId>)>,
    next_token: u64,
    set_calls: Vec<SetCall>,
    subscribes: usize,
    unsubscribes: usize,
    fail_enumeration: bool,
    fail_writes: bool,
}

/// In-process fake that records every side effect
#[derive(Default)]
pub struct FakeAudio {
    state: Mutex<State>,
}

impl FakeAudio {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_device(&self, id: &str, name: &str) -> DeviceInfo {
        let info = DeviceInfo::new(id, name);
        self.state().devices.push(info.clone());
        info
    }

    pub fn remove_device(&self, id: &str) {
        self.state().devices.retain(|d| d.id.as_str() != id);
    }

    pub fn rename_device(&self, id: &str, name: &str) -> DeviceInfo {
        let mut state = self.state();
        let device = state
            .devices
            .iter_mut()
            .find(|d| d.id.as_str() == id)
            .unwrap();
        device.name = name.to_string();
        device.clone()
    }

    pub fn set_default_output(&self, device: Option<DeviceInfo>) {
        self.state().default_output = device;
    }

    pub fn put_volume(&self, id: &DeviceId, channel: u32, scope: Scope, volume: f32) {
        self.state().volumes.insert((id.clone(), channel, scope), volume);
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.state().fail_enumeration = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    pub fn set_calls(&self) -> Vec<SetCall> {
        self.state().set_calls.clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.state().subscribes
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.state().unsubscribes
    }

    pub fn live_registrations(&self) -> usize {
        self.state().live.len()
    }

    /// Live registrations of `kind`, with the device each is scoped to
    pub fn registrations_of(&self, kind: EventKind) -> Vec<Option<DeviceId>> {
        self.state()
            .live
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, device)| device.clone())
            .collect()
    }
}

impl AudioSubsystem for FakeAudio {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let state = self.state();
        if state.fail_enumeration {
            return Err(AudioError::Backend("enumeration failed".to_string()));
        }
        Ok(state.devices.clone())
    }

    fn default_output_device(&self) -> Result<Option<DeviceInfo>> {
        Ok(self.state().default_output.clone())
    }

    fn volume(&self, device: &DeviceId, channel: u32, scope: Scope) -> Option<f32> {
        self.state()
            .volumes
            .get(&(device.clone(), channel, scope))
            .copied()
    }

    fn set_volume(&self, device: &DeviceId, channel: u32, scope: Scope, volume: f32) -> Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(AudioError::UnsupportedControl { channel, scope });
        }
        state.set_calls.push((device.clone(), channel, scope, volume));
        state.volumes.insert((device.clone(), channel, scope), volume);
        Ok(())
    }

    fn subscribe(&self, kind: EventKind, device: Option<&DeviceId>) -> Result<SubscriptionToken> {
        let mut state = self.state();
        state.next_token += 1;
        state.subscribes += 1;
        let token = SubscriptionToken::new(state.next_token);
        state.live.insert(token, (kind, device.cloned()));
        Ok(token)
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> Result<()> {
        let mut state = self.state();
        state.unsubscribes += 1;
        state
            .live
            .remove(&token)
            .map(|_| ())
            .ok_or(AudioError::SubscriptionNotFound(token))
    }
}
