//! Lifecycle wrapper around one notification registration
//!
//! A [`Subscription`] is either inactive or holds exactly one live token.
//! `start` on an active subscription and `stop` on an inactive one are
//! no-ops, so repeated reconciliation never leaks or duplicates
//! registrations.

use crate::domain::audio::{DeviceId, DeviceInfo, Result, SubscriptionToken};

#[derive(Debug, Clone, PartialEq)]
enum State {
    Inactive,
    Active {
        token: SubscriptionToken,
        device: Option<DeviceInfo>,
    },
}

/// One idempotent registration slot
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    state: State,
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    pub fn new() -> Self {
        Self {
            state: State::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active { .. })
    }

    pub fn token(&self) -> Option<SubscriptionToken> {
        match &self.state {
            State::Active { token, .. } => Some(*token),
            State::Inactive => None,
        }
    }

    /// Device this registration is bound to, if active and device-scoped
    pub fn device(&self) -> Option<&DeviceInfo> {
        match &self.state {
            State::Active { device, .. } => device.as_ref(),
            State::Inactive => None,
        }
    }

    /// Whether this is active and bound to the device with `id`
    pub fn is_bound_to(&self, id: &DeviceId) -> bool {
        self.device().is_some_and(|device| &device.id == id)
    }

    /// Activate unless already active
    ///
    /// Runs `activate` then `register`. Returns `Ok(true)` when a new
    /// registration was made, `Ok(false)` when already active. A failed
    /// `register` leaves the subscription inactive.
    pub fn start<E, R>(&mut self, device: Option<DeviceInfo>, activate: E, register: R) -> Result<bool>
    where
        E: FnOnce(),
        R: FnOnce() -> Result<SubscriptionToken>,
    {
        if self.is_active() {
            return Ok(false);
        }

        activate();
        let token = register()?;
        self.state = State::Active { token, device };
        Ok(true)
    }

    /// Deactivate unless already inactive
    ///
    /// The subscription is inactive afterwards even if `unregister` fails;
    /// notifications still queued for the old token are treated as stale.
    pub fn stop<U>(&mut self, unregister: U) -> Result<bool>
    where
        U: FnOnce(SubscriptionToken) -> Result<()>,
    {
        match std::mem::replace(&mut self.state, State::Inactive) {
            State::Inactive => Ok(false),
            State::Active { token, .. } => unregister(token).map(|()| true),
        }
    }

    /// Update the cached display name of the bound device
    pub fn refresh_device(&mut self, info: &DeviceInfo) {
        if let State::Active {
            device: Some(device),
            ..
        } = &mut self.state
        {
            if device.id == info.id {
                device.name.clone_from(&info.name);
            }
        }
    }
}
