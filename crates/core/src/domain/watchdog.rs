//! Threshold watchdog: clamp-on-read-and-correct
//!
//! On activation the watchdog writes the default volume to the configured
//! channel/scope. On every volume-change notification it re-reads the
//! reported channel/scope and writes the default volume back if the reading
//! is above the danger threshold.

use crate::domain::audio::{percent, AudioSubsystem, DeviceInfo, Scope};
use crate::domain::config::Config;
use tracing::{debug, info, warn};

/// What the watchdog did with one notification
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Volume could not be read; event ignored
    Unreadable,
    /// Volume at or below the threshold; nothing written
    Safe { volume: f32 },
    /// Volume above the threshold; default volume written back
    Clamped { from: f32, to: f32 },
    /// Volume above the threshold but the corrective write failed
    ClampFailed { from: f32 },
}

/// Volume clamp policy bound to one audio subsystem
pub struct VolumeWatchdog<'a> {
    audio: &'a dyn AudioSubsystem,
    config: &'a Config,
}

impl<'a> VolumeWatchdog<'a> {
    pub fn new(audio: &'a dyn AudioSubsystem, config: &'a Config) -> Self {
        Self { audio, config }
    }

    /// Activation effect: establish a safe baseline on the configured control
    pub fn arm(&self, device: &DeviceInfo) {
        info!(
            device = %device.name,
            volume_pct = percent(self.config.default_volume),
            channel = self.config.channel,
            scope = %self.config.scope,
            "Setting default volume"
        );

        if let Err(e) = self.audio.set_volume(
            &device.id,
            self.config.channel,
            self.config.scope,
            self.config.default_volume,
        ) {
            warn!(device = %device.name, error = %e, "Failed to set default volume");
        }
    }

    /// React to a volume change on `(channel, scope)` of `device`
    pub fn on_volume_changed(&self, device: &DeviceInfo, channel: u32, scope: Scope) -> Observation {
        let Some(volume) = self.audio.volume(&device.id, channel, scope) else {
            debug!(device = %device.name, channel, scope = %scope, "Volume unreadable, ignoring");
            return Observation::Unreadable;
        };

        info!(
            device = %device.name,
            volume_pct = percent(volume),
            "Volume was altered"
        );

        if !self.config.is_dangerous(volume) {
            return Observation::Safe { volume };
        }

        let to = self.config.default_volume;
        match self.audio.set_volume(&device.id, channel, scope, to) {
            Ok(()) => {
                warn!(
                    device = %device.name,
                    from_pct = percent(volume),
                    to_pct = percent(to),
                    channel,
                    scope = %scope,
                    "Volume reduced from DANGEROUS level"
                );
                Observation::Clamped { from: volume, to }
            }
            Err(e) => {
                warn!(
                    device = %device.name,
                    volume_pct = percent(volume),
                    error = %e,
                    "Failed to reduce DANGEROUS volume"
                );
                Observation::ClampFailed { from: volume }
            }
        }
    }
}
