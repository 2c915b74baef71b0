//! PulseAudio/PipeWire backend driven through `pactl`
//!
//! Devices are sinks: the stable id is the sink name, the display name is the
//! sink description. Volumes are linear fractions of `PA_VOLUME_NORM`.
//! Channel 0 is the master control (the loudest channel); channel `n` is the
//! n-th entry of the sink's channel map. Sinks expose no input scope.

use super::pulse_events::Monitor;
use super::registry::Registry;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info};
use volguard_core::domain::audio::{
    AudioError, AudioSubsystem, DeviceId, DeviceInfo, EventKind, NotificationSender, Result, Scope,
    SubscriptionToken,
};

/// Raw volume value for 100%
pub const PA_VOLUME_NORM: u32 = 0x10000;

/// Sink as reported by `pactl --format=json list sinks`
#[derive(Debug, Clone, PartialEq)]
pub struct SinkInfo {
    pub index: u32,
    pub name: String,
    pub description: String,
    /// Per-channel volumes in channel-map order
    pub channels: Vec<f32>,
}

impl SinkInfo {
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::new(self.name.clone(), self.description.clone())
    }

    /// Volume of `channel` (0 = master) in `scope`
    pub fn volume(&self, channel: u32, scope: Scope) -> Option<f32> {
        if scope == Scope::Input {
            return None;
        }
        match channel {
            0 => self.channels.iter().copied().reduce(f32::max),
            n => self.channels.get(n as usize - 1).copied(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PactlSink {
    index: u32,
    name: String,
    description: String,
    channel_map: String,
    volume: HashMap<String, PactlChannelVolume>,
}

#[derive(Debug, Deserialize)]
struct PactlChannelVolume {
    value: u32,
}

impl TryFrom<PactlSink> for SinkInfo {
    type Error = AudioError;

    fn try_from(sink: PactlSink) -> Result<Self> {
        let channels = sink
            .channel_map
            .split(',')
            .filter(|position| !position.is_empty())
            .map(|position| {
                sink.volume
                    .get(position)
                    .map(|v| to_fraction(v.value))
                    .ok_or_else(|| {
                        AudioError::Parse(format!(
                            "sink {} has no volume for channel '{}'",
                            sink.name, position
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            index: sink.index,
            name: sink.name,
            description: sink.description,
            channels,
        })
    }
}

pub fn to_fraction(raw: u32) -> f32 {
    raw as f32 / PA_VOLUME_NORM as f32
}

/// Raw value for `volume`, rounded down so the sink never ends up louder
/// than requested
pub fn to_raw(volume: f32) -> u32 {
    (volume.clamp(0.0, 1.0) * PA_VOLUME_NORM as f32).floor() as u32
}

/// Parse the JSON sink listing
pub fn parse_sinks(json: &str) -> Result<Vec<SinkInfo>> {
    let sinks: Vec<PactlSink> =
        serde_json::from_str(json).map_err(|e| AudioError::Parse(e.to_string()))?;
    sinks.into_iter().map(SinkInfo::try_from).collect()
}

/// Arguments for `pactl set-sink-volume` writing `volume` to `channel`
pub fn set_volume_args(sink: &SinkInfo, channel: u32, volume: f32) -> Result<Vec<String>> {
    let mut args = vec!["set-sink-volume".to_string(), sink.name.clone()];

    if channel == 0 {
        args.push(to_raw(volume).to_string());
        return Ok(args);
    }

    let index = channel as usize - 1;
    if index >= sink.channels.len() {
        return Err(AudioError::UnsupportedControl {
            channel,
            scope: Scope::Output,
        });
    }
    args.extend(sink.channels.iter().enumerate().map(|(i, current)| {
        let value = if i == index { volume } else { *current };
        to_raw(value).to_string()
    }));
    Ok(args)
}

/// Thin wrapper over the `pactl` executable
#[derive(Debug, Clone)]
pub struct Pactl {
    program: String,
    leading_args: Vec<String>,
}

impl Default for Pactl {
    fn default() -> Self {
        Self::new("pactl")
    }
}

impl Pactl {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Argument passed before every subcommand, e.g. a script path when
    /// `program` is an interpreter
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command for `pactl` with the leading arguments already applied
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args);
        command
    }

    pub fn run<S: AsRef<std::ffi::OsStr>>(&self, args: &[S]) -> Result<String> {
        let output = self
            .command()
            .args(args)
            .output()
            .map_err(|e| AudioError::Backend(format!("Failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(AudioError::Backend(format!(
                "{} failed with status {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn sinks(&self) -> Result<Vec<SinkInfo>> {
        parse_sinks(&self.run(&["--format=json", "list", "sinks"])?)
    }

    pub fn sink(&self, name: &str) -> Result<SinkInfo> {
        self.sinks()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
    }

    pub fn default_sink_name(&self) -> Result<Option<String>> {
        let name = self.run(&["get-default-sink"])?.trim().to_string();
        Ok((!name.is_empty()).then_some(name))
    }
}

pub struct PulseAudioSubsystem {
    pactl: Pactl,
    registry: Arc<Registry>,
    _monitor: Monitor,
}

impl PulseAudioSubsystem {
    /// Connect with the `pactl` found on `PATH`
    pub fn connect(sender: NotificationSender) -> Result<Self> {
        Self::with_pactl(Pactl::default(), sender)
    }

    /// Connect using a specific `pactl` executable
    pub fn with_pactl(pactl: Pactl, sender: NotificationSender) -> Result<Self> {
        let sinks = pactl.sinks()?;
        let default_sink = pactl.default_sink_name()?;
        info!(
            sinks = sinks.len(),
            default = default_sink.as_deref().unwrap_or("none"),
            "Connected to sound server"
        );

        let registry = Arc::new(Registry::new(sender));
        let monitor = Monitor::spawn(pactl.clone(), Arc::clone(&registry), sinks, default_sink)?;

        Ok(Self {
            pactl,
            registry,
            _monitor: monitor,
        })
    }
}

impl AudioSubsystem for PulseAudioSubsystem {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.pactl.sinks()?.iter().map(SinkInfo::device_info).collect())
    }

    fn default_output_device(&self) -> Result<Option<DeviceInfo>> {
        let Some(name) = self.pactl.default_sink_name()? else {
            return Ok(None);
        };
        match self.pactl.sink(&name) {
            Ok(sink) => Ok(Some(sink.device_info())),
            Err(AudioError::DeviceNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn volume(&self, device: &DeviceId, channel: u32, scope: Scope) -> Option<f32> {
        match self.pactl.sink(device.as_str()) {
            Ok(sink) => sink.volume(channel, scope),
            Err(e) => {
                debug!(device = %device, error = %e, "Volume read failed");
                None
            }
        }
    }

    fn set_volume(&self, device: &DeviceId, channel: u32, scope: Scope, volume: f32) -> Result<()> {
        if scope == Scope::Input {
            return Err(AudioError::UnsupportedControl { channel, scope });
        }
        let sink = self.pactl.sink(device.as_str())?;
        let args = set_volume_args(&sink, channel, volume)?;
        self.pactl.run(&args)?;
        Ok(())
    }

    fn subscribe(&self, kind: EventKind, device: Option<&DeviceId>) -> Result<SubscriptionToken> {
        Ok(self.registry.register(kind, device))
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> Result<()> {
        self.registry.unregister(token)
    }
}
